//! Mapping engine: turns one instance into one node record.
//!
//! Rule categories are applied as fixed phases so the result never depends on
//! the order rules are stored in:
//!
//! 1. `attributes.selector=tags/*` copies every instance tag as an attribute
//! 2. `tags.selector` (tag-merge mode, default `tags.default`) seeds the tag set
//! 3. `tag.<name>.selector=<selector>[=<value>]` adds `<name>` when it matches
//! 4. `<attr>.default` without a selector sets the literal default
//! 5. `<attr>.selector` (default `<attr>.default`) sets the attribute
//! 6. the node name is `nodename`, else `hostname`, else the instance id
//! 7. a non-default `sshport` is appended to the hostname

use crate::model::{EnrichedInstance, NodeRecord, NodeSet};
use crate::ruleset::MappingRuleset;
use crate::selector::{apply_selector, resolve, SelectorError, SelectorMode};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{error, warn};

pub const NODENAME: &str = "nodename";
pub const HOSTNAME: &str = "hostname";
pub const SSHPORT: &str = "sshport";
const DEFAULT_SSH_PORT: &str = "22";
const ALL_TAGS: &str = "tags/*";

#[derive(Debug, Error)]
#[error("failed to map instance {instance_id}: {source}")]
pub struct MappingError {
    pub instance_id: String,
    #[source]
    pub source: SelectorError,
}

pub fn map_instance(inst: &EnrichedInstance, ruleset: &MappingRuleset) -> Result<NodeRecord, MappingError> {
    map_phases(inst, ruleset).map_err(|source| MappingError {
        instance_id: inst.id().to_string(),
        source,
    })
}

/// Maps every instance, dropping (and logging) the ones that fail.
pub fn map_instances<'a, I>(instances: I, ruleset: &MappingRuleset) -> NodeSet
where
    I: IntoIterator<Item = &'a EnrichedInstance>,
{
    let mut nodes = NodeSet::new();
    for inst in instances {
        match map_instance(inst, ruleset) {
            Ok(node) => {
                if let Some(previous) = nodes.put_node(node) {
                    warn!(node = %previous.name, instance_id = inst.id(), "duplicate node name, keeping the last instance");
                }
            }
            Err(e) => error!(instance_id = inst.id(), "{e}"),
        }
    }
    nodes
}

fn map_phases(inst: &EnrichedInstance, ruleset: &MappingRuleset) -> Result<NodeRecord, SelectorError> {
    let mut attributes: BTreeMap<String, String> = BTreeMap::new();
    let mut tags: BTreeSet<String> = BTreeSet::new();

    if ruleset.get("attributes.selector") == Some(ALL_TAGS) {
        for (key, value) in &inst.instance.tags {
            attributes.insert(key.clone(), value.clone());
        }
    }

    if let Some(selector) = ruleset.selector_for("tags") {
        let merged = apply_selector(inst, selector, ruleset.default_for("tags"), SelectorMode::TagMerge)?;
        if let Some(merged) = merged {
            tags.extend(
                merged
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
            );
        }
    }

    // Conditional rules all read the same starting set and only add to it.
    let mut conditional: BTreeSet<String> = BTreeSet::new();
    for (name, rule) in ruleset.tag_rules() {
        let (selector, expected) = match rule.split_once('=') {
            Some((selector, expected)) => (selector, Some(expected)),
            None => (rule, None),
        };
        let Some(value) = resolve(inst, selector, None)? else { continue };
        if expected.is_some_and(|expected| expected != value) {
            continue;
        }
        conditional.insert(name.to_string());
    }
    tags.extend(conditional);

    for (attr, default) in ruleset.attribute_defaults() {
        let has_selector = ruleset.selector_for(attr).is_some_and(|s| !s.is_empty());
        if !has_selector {
            attributes.insert(attr.to_string(), default.to_string());
        }
    }

    for (attr, selector) in ruleset.attribute_selectors() {
        if attr == "tags" {
            continue;
        }
        if let Some(value) = resolve(inst, selector, ruleset.default_for(attr))? {
            attributes.insert(attr.to_string(), value);
        }
    }

    let mut hostname = attributes.get(HOSTNAME).filter(|h| !h.is_empty()).cloned();
    let name = attributes
        .get(NODENAME)
        .filter(|n| !n.is_empty())
        .cloned()
        .or_else(|| hostname.clone())
        .unwrap_or_else(|| inst.id().to_string());
    attributes.insert(NODENAME.to_string(), name.clone());

    let port = attributes
        .get(SSHPORT)
        .filter(|p| !p.is_empty() && p.as_str() != DEFAULT_SSH_PORT)
        .cloned();
    if let (Some(port), Some(host)) = (port, hostname.as_mut()) {
        host.push(':');
        host.push_str(&port);
        attributes.insert(HOSTNAME.to_string(), host.clone());
    }

    Ok(NodeRecord {
        name,
        hostname,
        tags,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Instance, InstanceState};

    fn instance(id: &str, state: &str, tags: &[(&str, &str)]) -> EnrichedInstance {
        EnrichedInstance::from(Instance {
            instance_id: id.into(),
            public_dns_name: Some(format!("{id}.compute.example")),
            private_ip_address: Some("10.0.0.9".into()),
            architecture: Some("x86_64".into()),
            state: Some(InstanceState { name: state.into(), code: 16 }),
            tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            ..Default::default()
        })
    }

    fn rules(text: &str) -> MappingRuleset {
        MappingRuleset::from_properties(text)
    }

    #[test]
    fn test_default_mapping_on_tagged_instance() {
        let inst = instance("i-1", "running", &[("Name", "web-1"), ("Rundeck-Tags", "app, blue")]);
        let node = map_instance(&inst, MappingRuleset::default_mapping()).unwrap();

        assert_eq!(node.name, "web-1");
        assert_eq!(node.hostname.as_deref(), Some("i-1.compute.example"));
        assert!(node.has_tag("app"));
        assert!(node.has_tag("blue"));
        assert!(node.has_tag("running"));
        assert!(!node.has_tag("stopped"));
        assert!(!node.has_tag("ec2"));
        assert_eq!(node.attribute("sshport"), Some("22"));
        assert_eq!(node.attribute("osFamily"), Some("unix"));
        assert_eq!(node.attribute("osArch"), Some("x86_64"));
        assert_eq!(node.attribute("username"), Some("ec2-user"));
        assert_eq!(node.attribute("description"), Some("EC2 node instance"));
        assert_eq!(node.attribute("state"), Some("running"));
        assert_eq!(node.attribute("region"), None);
    }

    #[test]
    fn test_tags_default_when_selector_misses() {
        let inst = instance("i-1", "stopped", &[]);
        let node = map_instance(&inst, MappingRuleset::default_mapping()).unwrap();
        assert_eq!(node.tags, BTreeSet::from(["ec2".to_string(), "stopped".to_string()]));
    }

    #[test]
    fn test_conditional_tag_requires_exact_value() {
        let ruleset = rules("tag.running.selector=state.name=running\n");
        let node = map_instance(&instance("i-1", "running", &[]), &ruleset).unwrap();
        assert!(node.has_tag("running"));
        let node = map_instance(&instance("i-1", "running-ish", &[]), &ruleset).unwrap();
        assert!(!node.has_tag("running"));
    }

    #[test]
    fn test_conditional_tag_without_value_needs_resolution_only() {
        let ruleset = rules("tag.owned.selector=tags/owner\n");
        assert!(map_instance(&instance("i-1", "running", &[("owner", "ops")]), &ruleset).unwrap().has_tag("owned"));
        assert!(!map_instance(&instance("i-1", "running", &[]), &ruleset).unwrap().has_tag("owned"));
    }

    #[test]
    fn test_conditional_tag_value_may_contain_equals() {
        let ruleset = rules("tag.special.selector=tags/expr=a=b\n");
        let node = map_instance(&instance("i-1", "running", &[("expr", "a=b")]), &ruleset).unwrap();
        assert!(node.has_tag("special"));
    }

    #[test]
    fn test_sshport_suffix() {
        let ruleset = MappingRuleset::default_mapping();
        let node = map_instance(&instance("i-1", "running", &[("ssh_config_Port", "2222")]), ruleset).unwrap();
        assert_eq!(node.hostname.as_deref(), Some("i-1.compute.example:2222"));
        assert_eq!(node.attribute("hostname"), Some("i-1.compute.example:2222"));

        let node = map_instance(&instance("i-1", "running", &[("ssh_config_Port", "22")]), ruleset).unwrap();
        assert_eq!(node.hostname.as_deref(), Some("i-1.compute.example"));
    }

    #[test]
    fn test_name_falls_back_to_hostname_then_id() {
        let ruleset = rules("hostname.selector=publicDnsName\n");
        let node = map_instance(&instance("i-5", "running", &[]), &ruleset).unwrap();
        assert_eq!(node.name, "i-5.compute.example");

        let ruleset = rules("nodename.selector=tags/Name\nhostname.selector=tags/Host\n");
        let node = map_instance(&instance("i-999", "running", &[]), &ruleset).unwrap();
        assert_eq!(node.name, "i-999");
        assert_eq!(node.hostname, None);
    }

    #[test]
    fn test_name_uses_unsuffixed_hostname() {
        let ruleset = rules("hostname.selector=publicDnsName\nsshport.selector=tags/port\n");
        let node = map_instance(&instance("i-5", "running", &[("port", "2200")]), &ruleset).unwrap();
        assert_eq!(node.name, "i-5.compute.example");
        assert_eq!(node.hostname.as_deref(), Some("i-5.compute.example:2200"));
    }

    #[test]
    fn test_blanket_tag_attributes_and_selector_overwrite() {
        let ruleset = rules("attributes.selector=tags/*\nteam.selector='core'\n");
        let inst = instance("i-1", "running", &[("team", "edge"), ("cost", "42")]);
        let node = map_instance(&inst, &ruleset).unwrap();
        assert_eq!(node.attribute("cost"), Some("42"));
        assert_eq!(node.attribute("team"), Some("core"));
        assert_eq!(node.attribute("attributes"), None);
    }

    #[test]
    fn test_default_with_empty_selector_applies() {
        let ruleset = rules("username.selector=\nusername.default=admin\n");
        let node = map_instance(&instance("i-1", "running", &[]), &ruleset).unwrap();
        assert_eq!(node.attribute("username"), Some("admin"));
    }

    #[test]
    fn test_tag_merge_rule() {
        let ruleset = rules("tags.selector=tags/role|tags/env\n");
        let node = map_instance(&instance("i-1", "running", &[("role", "x"), ("env", "y")]), &ruleset).unwrap();
        assert_eq!(node.tags, BTreeSet::from(["x".to_string(), "y".to_string()]));
    }

    #[test]
    fn test_blank_tag_entries_are_dropped() {
        let inst = instance("i-1", "running", &[("Rundeck-Tags", "app, ,blue,")]);
        let node = map_instance(&inst, MappingRuleset::default_mapping()).unwrap();
        assert_eq!(
            node.tags,
            BTreeSet::from(["app".to_string(), "blue".to_string(), "running".to_string()])
        );
    }

    #[test]
    fn test_mapping_is_idempotent() {
        let inst = instance("i-1", "running", &[("Name", "a"), ("Rundeck-Tags", "t1,t2")]);
        let ruleset = MappingRuleset::default_mapping();
        let first = map_instance(&inst, ruleset).unwrap();
        let second = map_instance(&inst, ruleset).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[test]
    fn test_unknown_field_drops_only_that_instance() {
        let ruleset = rules("nodename.selector=tags/Name,noSuchField\n");
        let named = instance("i-1", "running", &[("Name", "ok")]);
        let unnamed = instance("i-2", "running", &[]);

        let err = map_instance(&unnamed, &ruleset).unwrap_err();
        assert_eq!(err.instance_id, "i-2");

        let nodes = map_instances([&named, &unnamed], &ruleset);
        assert_eq!(nodes.len(), 1);
        assert!(nodes.get("ok").is_some());
    }
}
