/*!
# Symbion Inventory DevKit - Mocks et utilitaires de test

Bibliothèque facilitant le test des sources d'inventaire avec:
- Mock de l'API d'inventaire (pages, pannes, pause)
- Builders d'instances et de snapshots
- Harness de test pour les sources
*/

pub mod fixtures;
pub mod mock_inventory;
pub mod test_utils;

pub use fixtures::{InstanceBuilder, SnapshotBuilder};
pub use mock_inventory::{InventoryCall, MockInventory};
pub use test_utils::TestHarness;
