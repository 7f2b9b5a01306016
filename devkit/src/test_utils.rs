/*!
Test Harness pour les sources d'inventaire

Facilite l'écriture de tests avec:
- Init du logging (env_logger capte les événements tracing)
- Un `MockInventory` partagé et des sources construites dessus
- Attente des refresh en arrière-plan sous horloge tokio en pause
*/

use crate::mock_inventory::MockInventory;
use anyhow::Result;
use std::sync::Arc;
use symbion_inventory::config::SourceConfig;
use symbion_inventory::refresh::NodeSource;

/// Nombre max de yields avant d'abandonner l'attente d'un refresh
const MAX_YIELDS: usize = 10_000;

/// Harness de test pour sources d'inventaire
pub struct TestHarness {
    pub inventory: MockInventory,
}

impl TestHarness {
    /// Crée un nouveau harness de test
    pub fn new() -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        Self {
            inventory: MockInventory::new(),
        }
    }

    /// Config de base : mapping par défaut, refresh 30s, asynchrone
    pub fn config(&self) -> SourceConfig {
        SourceConfig::default()
    }

    /// Construit une source branchée sur le mock
    pub fn source(&self, config: &SourceConfig) -> Result<NodeSource> {
        let source = NodeSource::from_config("test", config, Arc::new(self.inventory.clone()))?;
        log::info!("🧪 Source built: refresh={}s async={}", config.refresh_interval, source.policy().asynchronous);
        Ok(source)
    }

    /// Laisse tourner les tâches tokio jusqu'à ce que le refresh en cours se termine
    pub async fn wait_for_refresh(&self, source: &NodeSource) -> Result<()> {
        for _ in 0..MAX_YIELDS {
            if !source.status().refresh_in_flight {
                return Ok(());
            }
            tokio::task::yield_now().await;
        }
        anyhow::bail!("refresh still in flight after {} yields", MAX_YIELDS);
    }

    /// Laisse tourner les tâches tokio jusqu'à ce qu'un `list_instances` soit reçu
    pub async fn wait_for_list_calls(&self, expected: usize) -> Result<()> {
        for _ in 0..MAX_YIELDS {
            if self.inventory.list_starts() >= expected {
                return Ok(());
            }
            tokio::task::yield_now().await;
        }
        anyhow::bail!(
            "expected {} list calls, saw {}",
            expected,
            self.inventory.list_starts()
        );
    }

    /// Reset le harness pour un nouveau test
    pub fn reset(&mut self) {
        self.inventory = MockInventory::new();
        log::info!("🧹 Test harness reset");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
