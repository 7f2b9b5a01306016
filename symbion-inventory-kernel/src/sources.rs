/**
 * REGISTRE DES SOURCES - Une NodeSource par entrée de kernel.yaml
 *
 * RÔLE :
 * Construit chaque source sur le connecteur snapshot partagé. Une source dont
 * la config est invalide est rejetée (loggée) sans bloquer les autres.
 */

use crate::config::KernelConfig;
use std::collections::BTreeMap;
use std::sync::Arc;
use symbion_inventory::inventory::InventoryConnector;
use symbion_inventory::refresh::NodeSource;
use symbion_inventory::snapshot::SnapshotConnector;
use tracing::{error, info};

#[derive(Debug, Clone, serde::Serialize)]
pub struct RejectedSource {
    pub name: String,
    pub reason: String,
}

#[derive(Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<NodeSource>>,
    rejected: Vec<RejectedSource>,
}

impl SourceRegistry {
    pub fn from_config(cfg: &KernelConfig) -> Self {
        let connector: Arc<dyn InventoryConnector> = Arc::new(SnapshotConnector::new(&cfg.snapshot_dir));
        Self::with_connector(cfg, connector)
    }

    pub fn with_connector(cfg: &KernelConfig, connector: Arc<dyn InventoryConnector>) -> Self {
        let mut registry = Self::default();
        for (name, source_cfg) in &cfg.sources {
            match NodeSource::from_config(name.clone(), source_cfg, Arc::clone(&connector)) {
                Ok(source) => {
                    info!(source = %name, rules = source.ruleset().len(), "source ready");
                    registry.sources.insert(name.clone(), Arc::new(source));
                }
                Err(e) => {
                    error!(source = %name, "source rejected: {e}");
                    registry.rejected.push(RejectedSource {
                        name: name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<Arc<NodeSource>> {
        self.sources.get(name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<NodeSource>> {
        self.sources.values()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn rejected(&self) -> &[RejectedSource] {
        &self.rejected
    }
}
