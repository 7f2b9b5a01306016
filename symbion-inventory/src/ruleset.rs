//! Mapping ruleset: the flat `key=rule` table driving the mapping engine.

use crate::config::ConfigError;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

const SELECTOR_SUFFIX: &str = ".selector";
const DEFAULT_SUFFIX: &str = ".default";
const TAG_RULE_PREFIX: &str = "tag.";

/// Built-in mapping used when no other mapping is configured.
pub const DEFAULT_MAPPING: &str = "\
nodename.selector=tags/Name,instanceId
hostname.selector=publicDnsName,privateIpAddress
sshport.default=22
sshport.selector=tags/ssh_config_Port
description.default=EC2 node instance
osArch.selector=architecture
osFamily.selector=platform
osFamily.default=unix
osName.selector=platform
osName.default=Linux
username.selector=tags/Rundeck-User
username.default=ec2-user
editUrl.default=https://console.aws.amazon.com/ec2/home#Instances:search=${node.instanceId}
privateIpAddress.selector=privateIpAddress
privateDnsName.selector=privateDnsName
tags.selector=tags/Rundeck-Tags
instanceId.selector=instanceId
tag.running.selector=state.name=running
tag.stopped.selector=state.name=stopped
tag.stopping.selector=state.name=stopping
tag.shutting-down.selector=state.name=shutting-down
tag.terminated.selector=state.name=terminated
tag.pending.selector=state.name=pending
state.selector=state.name
region.selector=region
tags.default=ec2
";

static DEFAULT_RULESET: OnceLock<MappingRuleset> = OnceLock::new();

/// Rules keyed by rule name. Read-only once a source is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingRuleset {
    rules: BTreeMap<String, String>,
}

impl MappingRuleset {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in default ruleset, parsed once.
    pub fn default_mapping() -> &'static MappingRuleset {
        DEFAULT_RULESET.get_or_init(|| Self::from_properties(DEFAULT_MAPPING))
    }

    /// Parses properties-style text (`key=value` lines, `#`/`!` comments).
    pub fn from_properties(text: &str) -> Self {
        let mut ruleset = Self::new();
        for (key, value) in parse_properties(text) {
            ruleset.insert(key, value);
        }
        ruleset
    }

    /// Builds the ruleset of a source.
    ///
    /// Order: built-in default (when `use_default`), then the mapping file,
    /// then the inline `key=value;key=value` overrides. An empty result falls
    /// back to the built-in default.
    pub fn load(
        use_default: bool,
        mapping_file: Option<&Path>,
        inline: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut ruleset = Self::new();
        if use_default {
            ruleset.overlay(Self::default_mapping());
        }
        if let Some(path) = mapping_file {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::MappingFileRead {
                path: path.to_path_buf(),
                source,
            })?;
            let file_rules = Self::from_properties(&text);
            info!(path = %path.display(), rules = file_rules.len(), "loaded mapping file");
            ruleset.overlay(&file_rules);
        }
        if let Some(inline) = inline {
            ruleset.overlay(&Self::from_inline(inline));
        }
        if ruleset.is_empty() {
            debug!("mapping is empty, using the built-in default");
            ruleset.overlay(Self::default_mapping());
        }
        Ok(ruleset)
    }

    /// Parses `key=value;key=value` overrides. Entries without `=` are ignored.
    pub fn from_inline(inline: &str) -> Self {
        let mut ruleset = Self::new();
        for entry in inline.split(';') {
            if let Some((key, value)) = entry.split_once('=') {
                let key = key.trim();
                if !key.is_empty() {
                    ruleset.insert(key, value);
                }
            }
        }
        ruleset
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.rules.insert(key.into(), value.into());
    }

    pub fn overlay(&mut self, other: &MappingRuleset) {
        for (k, v) in &other.rules {
            self.rules.insert(k.clone(), v.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.rules.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when some selector rule names `field` as one of its parts.
    pub fn references(&self, field: &str) -> bool {
        self.iter()
            .filter(|(k, _)| k.ends_with(SELECTOR_SUFFIX))
            .map(|(k, v)| {
                // conditional tag rules carry an expected value after '='
                if k.starts_with(TAG_RULE_PREFIX) {
                    v.split_once('=').map_or(v, |(selector, _)| selector)
                } else {
                    v
                }
            })
            .any(|selector| selector.split([',', '+', '|']).any(|part| part.trim() == field))
    }

    /// `<attr>.selector` rules, `<attr>` being free of dots.
    pub fn attribute_selectors(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter()
            .filter_map(|(k, v)| simple_attribute(k, SELECTOR_SUFFIX).map(|attr| (attr, v)))
    }

    /// `<attr>.default` rules, `<attr>` being free of dots.
    pub fn attribute_defaults(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter()
            .filter_map(|(k, v)| simple_attribute(k, DEFAULT_SUFFIX).map(|attr| (attr, v)))
    }

    /// `tag.<name>.selector` rules as `(name, rule)`.
    pub fn tag_rules(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter_map(|(k, v)| {
            k.strip_prefix(TAG_RULE_PREFIX)
                .and_then(|rest| rest.strip_suffix(SELECTOR_SUFFIX))
                .filter(|name| !name.is_empty())
                .map(|name| (name, v))
        })
    }

    pub fn selector_for(&self, attr: &str) -> Option<&str> {
        self.get(&format!("{attr}{SELECTOR_SUFFIX}"))
    }

    pub fn default_for(&self, attr: &str) -> Option<&str> {
        self.get(&format!("{attr}{DEFAULT_SUFFIX}"))
    }
}

fn simple_attribute<'a>(key: &'a str, suffix: &str) -> Option<&'a str> {
    key.strip_suffix(suffix)
        .filter(|attr| !attr.is_empty() && !attr.contains('.'))
}

/// Line-oriented `key=value` parsing. The key is trimmed, the value loses its
/// leading whitespace only, and a line without `=` yields an empty value.
pub fn parse_properties(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim_start)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=').unwrap_or((line, ""));
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim_start().to_string()))
        })
        .collect()
}
