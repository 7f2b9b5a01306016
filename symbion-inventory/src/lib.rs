/*!
# Symbion Inventory

Discovers compute instances from a remote inventory API and maps each one into
a node record through a declarative rule set.

- `selector` / `mapping`: the rule language and the per-instance mapping
- `query`: multi-region, paginated fetch with optional enrichment
- `refresh`: per-source cache with single-flight background refresh
- `snapshot`: file-backed connector used by the kernel
*/

pub mod config;
pub mod endpoints;
pub mod fields;
pub mod inventory;
pub mod mapping;
pub mod model;
pub mod query;
pub mod refresh;
pub mod render;
pub mod ruleset;
pub mod selector;
pub mod snapshot;

pub use config::{ConfigError, SourceConfig};
pub use inventory::{InventoryClient, InventoryConnector, InventoryError};
pub use mapping::{map_instance, map_instances, MappingError};
pub use model::{EnrichedInstance, Instance, NodeRecord, NodeSet};
pub use query::{FetchError, QueryExecutor, QueryOptions};
pub use refresh::{CacheState, NodeFetcher, NodeSource, RefreshError, RefreshPolicy, SourceStatus};
pub use ruleset::MappingRuleset;
pub use selector::{SelectorError, SelectorMode};
pub use snapshot::SnapshotConnector;
