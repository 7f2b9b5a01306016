/*!
Mock de l'API d'inventaire pour tests sans endpoint réel

Permet de scripter les pages d'instances, zones et images par région, d'injecter
des pannes et de suspendre les appels `list_instances` pour observer le
comportement single-flight. Tous les appels sont enregistrés.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use symbion_inventory::endpoints::endpoint_label;
use symbion_inventory::inventory::{
    AvailabilityZone, Filter, ImageSummary, InstancePage, InventoryClient, InventoryConnector, InventoryError,
    ListInstancesRequest,
};
use symbion_inventory::model::Instance;
use tokio::sync::watch;

/// Appel reçu par le mock, dans l'ordre d'arrivée
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryCall {
    Connect { region: String },
    ListInstances {
        region: String,
        filters: Vec<Filter>,
        max_results: Option<u32>,
        next_token: Option<String>,
    },
    DescribeZones { region: String },
    DescribeImages { region: String, image_ids: Vec<String> },
}

impl InventoryCall {
    pub fn region(&self) -> &str {
        match self {
            InventoryCall::Connect { region }
            | InventoryCall::ListInstances { region, .. }
            | InventoryCall::DescribeZones { region }
            | InventoryCall::DescribeImages { region, .. } => region,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RegionScript {
    pages: Vec<Vec<Instance>>,
    zones: Vec<AvailabilityZone>,
    images: Vec<ImageSummary>,
    unreachable: Option<String>,
    images_fail: bool,
    zones_fail: bool,
}

struct Inner {
    regions: Mutex<HashMap<String, RegionScript>>,
    calls: Mutex<Vec<InventoryCall>>,
    list_failure: Mutex<Option<String>>,
    gate: watch::Sender<bool>,
}

/// Connecteur mock partagé (clonable, état commun)
#[derive(Clone)]
pub struct MockInventory {
    inner: Arc<Inner>,
}

impl MockInventory {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                regions: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                list_failure: Mutex::new(None),
                gate,
            }),
        }
    }

    /// Pages servies pour une région (label = hôte de l'endpoint ou "default")
    pub fn set_pages(&self, region: &str, pages: Vec<Vec<Instance>>) {
        self.inner.regions.lock().entry(region.to_string()).or_default().pages = pages;
    }

    /// Raccourci : une seule page
    pub fn set_instances(&self, region: &str, instances: Vec<Instance>) {
        self.set_pages(region, vec![instances]);
    }

    pub fn set_zones(&self, region: &str, zones: &[(&str, &str)]) {
        self.inner.regions.lock().entry(region.to_string()).or_default().zones = zones
            .iter()
            .map(|(zone, region)| AvailabilityZone {
                zone_name: zone.to_string(),
                region_name: region.to_string(),
            })
            .collect();
    }

    pub fn set_images(&self, region: &str, images: &[(&str, &str)]) {
        self.inner.regions.lock().entry(region.to_string()).or_default().images = images
            .iter()
            .map(|(id, name)| ImageSummary {
                image_id: id.to_string(),
                name: Some(name.to_string()),
            })
            .collect();
    }

    pub fn with_instances(self, region: &str, instances: Vec<Instance>) -> Self {
        self.set_instances(region, instances);
        self
    }

    pub fn with_pages(self, region: &str, pages: Vec<Vec<Instance>>) -> Self {
        self.set_pages(region, pages);
        self
    }

    /// La connexion à cette région échoue
    pub fn fail_region(&self, region: &str, message: &str) {
        self.inner.regions.lock().entry(region.to_string()).or_default().unreachable = Some(message.to_string());
    }

    pub fn fail_images(&self, region: &str) {
        self.inner.regions.lock().entry(region.to_string()).or_default().images_fail = true;
    }

    pub fn fail_zones(&self, region: &str) {
        self.inner.regions.lock().entry(region.to_string()).or_default().zones_fail = true;
    }

    /// Tous les `list_instances` échouent (toutes régions) jusqu'à `None`
    pub fn set_list_failure(&self, message: Option<&str>) {
        *self.inner.list_failure.lock() = message.map(str::to_string);
    }

    /// Suspend les `list_instances` jusqu'à `resume()`
    pub fn pause(&self) {
        self.inner.gate.send_replace(false);
        log::debug!("⏸️ [MOCK] list_instances paused");
    }

    pub fn resume(&self) {
        self.inner.gate.send_replace(true);
        log::debug!("▶️ [MOCK] list_instances resumed");
    }

    pub fn calls(&self) -> Vec<InventoryCall> {
        self.inner.calls.lock().clone()
    }

    /// Nombre de cycles de fetch observés (une liste sans token = début de pagination)
    pub fn list_starts(&self) -> usize {
        self.inner
            .calls
            .lock()
            .iter()
            .filter(|c| matches!(c, InventoryCall::ListInstances { next_token: None, .. }))
            .count()
    }

    pub fn list_calls(&self, region: &str) -> usize {
        self.count(|c| matches!(c, InventoryCall::ListInstances { .. }) && c.region() == region)
    }

    pub fn connects(&self) -> Vec<String> {
        self.inner
            .calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                InventoryCall::Connect { region } => Some(region.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn image_calls(&self) -> usize {
        self.count(|c| matches!(c, InventoryCall::DescribeImages { .. }))
    }

    pub fn zone_calls(&self) -> usize {
        self.count(|c| matches!(c, InventoryCall::DescribeZones { .. }))
    }

    pub fn count(&self, predicate: impl Fn(&InventoryCall) -> bool) -> usize {
        self.inner.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    pub fn clear_calls(&self) {
        self.inner.calls.lock().clear();
    }

    fn record(&self, call: InventoryCall) {
        log::debug!("📥 [MOCK] {:?}", call);
        self.inner.calls.lock().push(call);
    }

    fn script(&self, region: &str) -> RegionScript {
        self.inner.regions.lock().get(region).cloned().unwrap_or_default()
    }
}

impl Default for MockInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl InventoryConnector for MockInventory {
    fn connect(&self, endpoint: Option<&str>) -> Result<Box<dyn InventoryClient>, InventoryError> {
        let region = endpoint_label(endpoint);
        self.record(InventoryCall::Connect { region: region.clone() });
        if let Some(message) = self.script(&region).unreachable {
            return Err(InventoryError::Unreachable(message));
        }
        Ok(Box::new(MockClient {
            mock: self.clone(),
            region,
        }))
    }
}

struct MockClient {
    mock: MockInventory,
    region: String,
}

#[async_trait]
impl InventoryClient for MockClient {
    async fn list_instances(&self, request: &ListInstancesRequest) -> Result<InstancePage, InventoryError> {
        self.mock.record(InventoryCall::ListInstances {
            region: self.region.clone(),
            filters: request.filters.clone(),
            max_results: request.max_results,
            next_token: request.next_token.clone(),
        });

        let mut gate = self.mock.inner.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|e| InventoryError::Unreachable(e.to_string()))?;

        if let Some(message) = self.mock.inner.list_failure.lock().clone() {
            return Err(InventoryError::Throttled(message));
        }

        let pages = self.mock.script(&self.region).pages;
        let index = match request.next_token.as_deref() {
            None => 0,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| InventoryError::InvalidResponse(format!("unknown token {token}")))?,
        };
        let instances = pages.get(index).cloned().unwrap_or_default();
        let next_token = (index + 1 < pages.len()).then(|| format!("page-{}", index + 1));
        Ok(InstancePage { instances, next_token })
    }

    async fn describe_availability_zones(&self) -> Result<Vec<AvailabilityZone>, InventoryError> {
        self.mock.record(InventoryCall::DescribeZones {
            region: self.region.clone(),
        });
        let script = self.mock.script(&self.region);
        if script.zones_fail {
            return Err(InventoryError::Auth("zones denied".into()));
        }
        Ok(script.zones)
    }

    async fn describe_images(&self, image_ids: &[String]) -> Result<Vec<ImageSummary>, InventoryError> {
        self.mock.record(InventoryCall::DescribeImages {
            region: self.region.clone(),
            image_ids: image_ids.to_vec(),
        });
        let script = self.mock.script(&self.region);
        if script.images_fail {
            return Err(InventoryError::Auth("images denied".into()));
        }
        Ok(script
            .images
            .into_iter()
            .filter(|img| image_ids.contains(&img.image_id))
            .collect())
    }
}
