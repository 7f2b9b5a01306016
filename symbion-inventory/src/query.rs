//! Query executor
//!
//! One fetch cycle walks the targeted regions one after the other, follows
//! continuation tokens until each region is exhausted, deduplicates instances
//! by id and attaches the enrichment fields the mapping asks for.

use crate::config::SourceConfig;
use crate::endpoints::{endpoint_label, RegionTargets};
use crate::inventory::{Filter, InventoryClient, InventoryConnector, InventoryError, ListInstancesRequest};
use crate::model::{EnrichedInstance, Instance};
use crate::ruleset::MappingRuleset;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Pause between two regions of the same cycle.
pub const INTER_REGION_DELAY: Duration = Duration::from_millis(500);
/// Image name attached when the image lookup does not know an instance's image.
pub const IMAGE_NOT_FOUND: &str = "Not found";
pub const STATE_FILTER: &str = "instance-state-name";
const IMAGE_NAME_FIELD: &str = "imageName";
const REGION_FIELD: &str = "region";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("all {attempted} region(s) failed, last error: {last}")]
    AllRegionsFailed {
        attempted: usize,
        #[source]
        last: InventoryError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub targets: RegionTargets,
    pub filters: Vec<Filter>,
    pub page_size: Option<u32>,
    pub enrich_image_names: bool,
    pub enrich_regions: bool,
    pub region_delay: Duration,
}

impl QueryOptions {
    pub fn from_config(config: &SourceConfig, ruleset: &MappingRuleset) -> Self {
        Self {
            targets: RegionTargets::parse(config.endpoint.as_deref()),
            filters: build_filters(config.running_only, config.filter.as_deref()),
            page_size: Some(config.page_results),
            enrich_image_names: ruleset.references(IMAGE_NAME_FIELD),
            enrich_regions: ruleset.references(REGION_FIELD),
            region_delay: INTER_REGION_DELAY,
        }
    }
}

/// Filters for a list call: the implicit running-state filter, then every
/// `name=value[,value...]` entry of the `;`-separated parameter string.
///
/// Entries split on their first `=` only, so values may contain `=`.
pub fn build_filters(running_only: bool, params: Option<&str>) -> Vec<Filter> {
    let mut filters = Vec::new();
    if running_only {
        filters.push(Filter::new(STATE_FILTER, vec!["running".to_string()]));
    }
    for param in params.into_iter().flat_map(|p| p.split(';')) {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }
        match param.split_once('=') {
            Some((name, values)) if !name.trim().is_empty() && !values.trim().is_empty() => {
                let values = values.split(',').map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).collect();
                filters.push(Filter::new(name.trim(), values));
            }
            _ => warn!(filter = param, "ignoring malformed filter, expected name=value"),
        }
    }
    filters
}

pub struct QueryExecutor {
    connector: Arc<dyn InventoryConnector>,
    options: QueryOptions,
}

impl QueryExecutor {
    pub fn new(connector: Arc<dyn InventoryConnector>, options: QueryOptions) -> Self {
        Self { connector, options }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Runs one cycle over every targeted region.
    ///
    /// A failing region is logged and skipped; the cycle only fails when no
    /// region could be queried at all.
    pub async fn fetch_instances(&self) -> Result<Vec<EnrichedInstance>, FetchError> {
        let endpoints = self.options.targets.endpoints();
        let mut merged: BTreeMap<String, EnrichedInstance> = BTreeMap::new();
        let mut last_error = None;
        let mut failed = 0;

        for (index, endpoint) in endpoints.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.options.region_delay).await;
            }
            let region = endpoint_label(*endpoint);
            match self.fetch_region(*endpoint).await {
                Ok(instances) => {
                    debug!(region = %region, count = instances.len(), "region fetched");
                    for inst in instances {
                        merged.insert(inst.id().to_string(), inst);
                    }
                }
                Err(e) => {
                    warn!(region = %region, "region query failed: {e}");
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        if let Some(last) = last_error {
            if failed == endpoints.len() {
                return Err(FetchError::AllRegionsFailed {
                    attempted: failed,
                    last,
                });
            }
        }
        info!(instances = merged.len(), regions = endpoints.len(), failed, "fetch cycle complete");
        Ok(merged.into_values().collect())
    }

    async fn fetch_region(&self, endpoint: Option<&str>) -> Result<Vec<EnrichedInstance>, InventoryError> {
        let client = self.connector.connect(endpoint)?;
        let zones = if self.options.enrich_regions {
            zone_table(client.as_ref()).await
        } else {
            HashMap::new()
        };

        let instances = self.list_all(client.as_ref()).await?;
        let images = if self.options.enrich_image_names {
            Some(image_names(client.as_ref(), &instances).await)
        } else {
            None
        };

        Ok(instances
            .into_iter()
            .map(|inst| {
                let image_name = images.as_ref().and_then(|names| {
                    inst.image_id.as_ref().map(|id| {
                        names.get(id).cloned().unwrap_or_else(|| IMAGE_NOT_FOUND.to_string())
                    })
                });
                let region = if self.options.enrich_regions {
                    inst.availability_zone().and_then(|zone| zones.get(zone).cloned())
                } else {
                    None
                };
                EnrichedInstance {
                    instance: inst,
                    image_name,
                    region,
                }
            })
            .collect())
    }

    /// Follows continuation tokens, keeping one record per instance id.
    async fn list_all(&self, client: &dyn InventoryClient) -> Result<Vec<Instance>, InventoryError> {
        let mut request = ListInstancesRequest {
            filters: self.options.filters.clone(),
            max_results: self.options.page_size,
            next_token: None,
        };
        let mut instances: BTreeMap<String, Instance> = BTreeMap::new();
        let mut seen_tokens = HashSet::new();
        let mut pages = 0usize;
        loop {
            let page = client.list_instances(&request).await?;
            pages += 1;
            for inst in page.instances {
                instances.insert(inst.instance_id.clone(), inst);
            }
            match page.next_token.filter(|t| !t.is_empty()) {
                Some(token) if !seen_tokens.insert(token.clone()) => {
                    warn!(token = %token, "continuation token repeated, stopping pagination");
                    break;
                }
                Some(token) => request.next_token = Some(token),
                None => break,
            }
        }
        debug!(pages, instances = instances.len(), "pagination exhausted");
        Ok(instances.into_values().collect())
    }
}

async fn zone_table(client: &dyn InventoryClient) -> HashMap<String, String> {
    match client.describe_availability_zones().await {
        Ok(zones) => zones.into_iter().map(|z| (z.zone_name, z.region_name)).collect(),
        Err(e) => {
            warn!("availability zone lookup failed, region left unset: {e}");
            HashMap::new()
        }
    }
}

async fn image_names(client: &dyn InventoryClient, instances: &[Instance]) -> HashMap<String, String> {
    let ids: BTreeSet<String> = instances.iter().filter_map(|i| i.image_id.clone()).collect();
    if ids.is_empty() {
        return HashMap::new();
    }
    let ids: Vec<String> = ids.into_iter().collect();
    match client.describe_images(&ids).await {
        Ok(images) => images
            .into_iter()
            .filter_map(|img| img.name.map(|name| (img.image_id, name)))
            .collect(),
        Err(e) => {
            warn!(images = ids.len(), "image lookup failed, marking names as not found: {e}");
            HashMap::new()
        }
    }
}
