//! Refresh orchestrator
//!
//! Each source keeps the last completed node set and at most one background
//! fetch. Every `get_nodes` call runs under the source lock: it first adopts
//! a finished background result, then decides between serving the cache,
//! fetching synchronously or starting a background fetch.
//!
//! `status` never takes the source lock. It reads a small record that is
//! updated whenever the cache changes.

use crate::config::{ConfigError, SourceConfig};
use crate::inventory::InventoryConnector;
use crate::mapping::map_instances;
use crate::model::NodeSet;
use crate::query::{FetchError, QueryExecutor, QueryOptions};
use crate::ruleset::MappingRuleset;
use parking_lot::Mutex as StatusLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A background fetch running longer than this is reported once as stalled.
pub const STALL_WARNING: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("initial fetch for source '{source_name}' failed: {source}")]
    InitialFetch {
        source_name: String,
        #[source]
        source: FetchError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Age under which the cache is fresh. `None` means always stale.
    pub window: Option<Duration>,
    pub asynchronous: bool,
}

impl RefreshPolicy {
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            window: config.refresh_window(),
            asynchronous: config.asynchronous_refresh(),
        }
    }

    fn is_fresh(&self, age: Duration) -> bool {
        self.window.is_some_and(|window| age < window)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Empty,
    Fresh,
    Stale,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub state: CacheState,
    pub refresh_in_flight: bool,
    pub node_count: usize,
    pub last_refresh: Option<OffsetDateTime>,
}

/// One full cycle: query every region, then map the instances.
pub struct NodeFetcher {
    executor: QueryExecutor,
    ruleset: Arc<MappingRuleset>,
}

impl NodeFetcher {
    pub fn new(executor: QueryExecutor, ruleset: Arc<MappingRuleset>) -> Self {
        Self { executor, ruleset }
    }

    pub fn ruleset(&self) -> &MappingRuleset {
        &self.ruleset
    }

    pub async fn fetch_nodes(&self) -> Result<NodeSet, FetchError> {
        let cycle = Uuid::new_v4();
        async {
            let instances = self.executor.fetch_instances().await?;
            let nodes = map_instances(&instances, &self.ruleset);
            info!(instances = instances.len(), nodes = nodes.len(), "nodes mapped");
            Ok::<_, FetchError>(nodes)
        }
        .instrument(info_span!("fetch_cycle", %cycle))
        .await
    }
}

struct Snapshot {
    nodes: Arc<NodeSet>,
    completed: Instant,
    completed_at: OffsetDateTime,
}

impl Snapshot {
    fn new(nodes: NodeSet) -> Self {
        Self {
            nodes: Arc::new(nodes),
            completed: Instant::now(),
            completed_at: OffsetDateTime::now_utc(),
        }
    }
}

struct InFlight {
    handle: JoinHandle<Result<Snapshot, FetchError>>,
    started: Instant,
    stall_reported: bool,
}

#[derive(Default)]
struct Cache {
    current: Option<Snapshot>,
    in_flight: Option<InFlight>,
}

/// What `status` reports, mirrored from the cache.
#[derive(Default)]
struct StatusRecord {
    completed: Option<Instant>,
    completed_at: Option<OffsetDateTime>,
    node_count: usize,
    background: Option<AbortHandle>,
}

pub struct NodeSource {
    name: String,
    fetcher: Arc<NodeFetcher>,
    policy: RefreshPolicy,
    cache: Mutex<Cache>,
    status: StatusLock<StatusRecord>,
}

impl NodeSource {
    pub fn new(name: impl Into<String>, fetcher: NodeFetcher, policy: RefreshPolicy) -> Self {
        Self {
            name: name.into(),
            fetcher: Arc::new(fetcher),
            policy,
            cache: Mutex::new(Cache::default()),
            status: StatusLock::new(StatusRecord::default()),
        }
    }

    /// Validates the configuration, loads the mapping and wires the query
    /// executor to `connector`.
    pub fn from_config(
        name: impl Into<String>,
        config: &SourceConfig,
        connector: Arc<dyn InventoryConnector>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let ruleset = MappingRuleset::load(
            config.use_default_mapping,
            config.mapping_file.as_deref(),
            config.mapping_params.as_deref(),
        )?;
        let options = QueryOptions::from_config(config, &ruleset);
        let executor = QueryExecutor::new(connector, options);
        let fetcher = NodeFetcher::new(executor, Arc::new(ruleset));
        Ok(Self::new(name, fetcher, RefreshPolicy::from_config(config)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    pub fn ruleset(&self) -> &MappingRuleset {
        self.fetcher.ruleset()
    }

    /// Current node set, refreshing it according to the policy.
    ///
    /// Only the very first fetch can fail the call; later failures keep the
    /// previous set.
    pub async fn get_nodes(&self) -> Result<Arc<NodeSet>, RefreshError> {
        let mut cache = self.cache.lock().await;
        self.adopt_finished(&mut cache).await;

        let now = Instant::now();
        let Some(current) = cache.current.as_ref() else {
            debug!(source = %self.name, "first fetch, loading synchronously");
            let snapshot = self.fetcher.fetch_nodes().await.map(Snapshot::new).map_err(|source| {
                RefreshError::InitialFetch {
                    source_name: self.name.clone(),
                    source,
                }
            })?;
            return Ok(self.install(&mut cache, snapshot));
        };

        if self.policy.is_fresh(now.duration_since(current.completed)) {
            return Ok(current.nodes.clone());
        }
        let stale = current.nodes.clone();

        if self.policy.asynchronous {
            match cache.in_flight.as_mut() {
                Some(in_flight) => self.check_stall(in_flight, now),
                None => cache.in_flight = Some(self.spawn_refresh(now)),
            }
            return Ok(stale);
        }

        match self.fetcher.fetch_nodes().await {
            Ok(nodes) => Ok(self.install(&mut cache, Snapshot::new(nodes))),
            Err(e) => {
                warn!(source = %self.name, "refresh failed, serving previous nodes: {e}");
                Ok(stale)
            }
        }
    }

    /// Cache state as of the last completed fetch. Does not wait for a
    /// fetch in progress.
    pub fn status(&self) -> SourceStatus {
        let record = self.status.lock();
        let state = match record.completed {
            None => CacheState::Empty,
            Some(completed) if self.policy.is_fresh(completed.elapsed()) => CacheState::Fresh,
            Some(_) => CacheState::Stale,
        };
        SourceStatus {
            name: self.name.clone(),
            state,
            refresh_in_flight: record.background.as_ref().is_some_and(|h| !h.is_finished()),
            node_count: record.node_count,
            last_refresh: record.completed_at,
        }
    }

    fn install(&self, cache: &mut Cache, snapshot: Snapshot) -> Arc<NodeSet> {
        let nodes = snapshot.nodes.clone();
        {
            let mut record = self.status.lock();
            record.completed = Some(snapshot.completed);
            record.completed_at = Some(snapshot.completed_at);
            record.node_count = nodes.len();
        }
        cache.current = Some(snapshot);
        nodes
    }

    async fn adopt_finished(&self, cache: &mut Cache) {
        if !cache.in_flight.as_ref().is_some_and(|f| f.handle.is_finished()) {
            return;
        }
        let Some(in_flight) = cache.in_flight.take() else { return };
        self.status.lock().background = None;
        match in_flight.handle.await {
            Ok(Ok(snapshot)) => {
                info!(source = %self.name, nodes = snapshot.nodes.len(), "background refresh adopted");
                self.install(cache, snapshot);
            }
            Ok(Err(e)) => warn!(source = %self.name, "background refresh failed, keeping previous nodes: {e}"),
            Err(e) => error!(source = %self.name, "background refresh task aborted: {e}"),
        }
    }

    fn spawn_refresh(&self, now: Instant) -> InFlight {
        debug!(source = %self.name, "starting background refresh");
        let fetcher = Arc::clone(&self.fetcher);
        let handle = tokio::spawn(async move { fetcher.fetch_nodes().await.map(Snapshot::new) });
        self.status.lock().background = Some(handle.abort_handle());
        InFlight {
            handle,
            started: now,
            stall_reported: false,
        }
    }

    fn check_stall(&self, in_flight: &mut InFlight, now: Instant) {
        let running = now.duration_since(in_flight.started);
        if !in_flight.stall_reported && running >= STALL_WARNING {
            warn!(source = %self.name, running_secs = running.as_secs(), "background refresh still running, serving stale nodes");
            in_flight.stall_reported = true;
        }
    }
}
