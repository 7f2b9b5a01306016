//! Instance records as returned by the inventory API, and the node records
//! produced from them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Raw instance description as listed by the inventory API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Instance {
    pub instance_id: String,
    pub image_id: Option<String>,
    pub instance_type: Option<String>,
    pub architecture: Option<String>,
    pub platform: Option<String>,
    pub kernel_id: Option<String>,
    pub key_name: Option<String>,
    pub launch_time: Option<String>,
    pub public_dns_name: Option<String>,
    pub public_ip_address: Option<String>,
    pub private_dns_name: Option<String>,
    pub private_ip_address: Option<String>,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
    pub hypervisor: Option<String>,
    pub virtualization_type: Option<String>,
    pub root_device_name: Option<String>,
    pub root_device_type: Option<String>,
    pub state: Option<InstanceState>,
    pub placement: Option<Placement>,
    pub monitoring: Option<Monitoring>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceState {
    pub name: String,
    pub code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Placement {
    pub availability_zone: Option<String>,
    pub tenancy: Option<String>,
    pub group_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Monitoring {
    pub state: String,
}

impl Instance {
    pub fn availability_zone(&self) -> Option<&str> {
        self.placement
            .as_ref()
            .and_then(|p| p.availability_zone.as_deref())
    }
}

/// An instance plus the lookups attached after the primary fetch.
///
/// Enrichment fields are only populated when the mapping ruleset refers to
/// them; otherwise they stay `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedInstance {
    pub instance: Instance,
    pub image_name: Option<String>,
    pub region: Option<String>,
}

impl EnrichedInstance {
    pub fn id(&self) -> &str {
        &self.instance.instance_id
    }

    pub fn with_image_name(mut self, image_name: impl Into<String>) -> Self {
        self.image_name = Some(image_name.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

impl From<Instance> for EnrichedInstance {
    fn from(instance: Instance) -> Self {
        Self {
            instance,
            image_name: None,
            region: None,
        }
    }
}

/// One mapped instance, as handed to the orchestration side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRecord {
    pub name: String,
    pub hostname: Option<String>,
    pub tags: BTreeSet<String>,
    pub attributes: BTreeMap<String, String>,
}

impl NodeRecord {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// All nodes produced by one query cycle, keyed by node name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeSet {
    nodes: BTreeMap<String, NodeRecord>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, replacing any node already registered under the same name.
    /// Returns the replaced node.
    pub fn put_node(&mut self, node: NodeRecord) -> Option<NodeRecord> {
        self.nodes.insert(node.name.clone(), node)
    }

    pub fn get(&self, name: &str) -> Option<&NodeRecord> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }
}
