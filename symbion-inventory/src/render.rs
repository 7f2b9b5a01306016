//! Node-definition documents for the orchestration side.

use crate::mapping::{HOSTNAME, NODENAME};
use crate::model::{NodeRecord, NodeSet};
use std::collections::BTreeMap;

pub type ResourceDocument = BTreeMap<String, BTreeMap<String, String>>;

const TAGS: &str = "tags";

/// Flattens a node into its definition entry: every attribute, plus the
/// name, hostname and the comma-joined tag list.
pub fn resource_entry(node: &NodeRecord) -> BTreeMap<String, String> {
    let mut entry = node.attributes.clone();
    entry.insert(NODENAME.to_string(), node.name.clone());
    if let Some(hostname) = &node.hostname {
        entry.insert(HOSTNAME.to_string(), hostname.clone());
    }
    let tags: Vec<&str> = node.tags.iter().map(String::as_str).collect();
    entry.insert(TAGS.to_string(), tags.join(","));
    entry
}

pub fn resource_document(nodes: &NodeSet) -> ResourceDocument {
    nodes
        .iter()
        .map(|node| (node.name.clone(), resource_entry(node)))
        .collect()
}

pub fn to_json(nodes: &NodeSet) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&resource_document(nodes))
}

pub fn to_yaml(nodes: &NodeSet) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&resource_document(nodes))
}
