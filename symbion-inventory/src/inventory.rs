//! Seam to the remote inventory API.
//!
//! A connector opens one client per region endpoint; the client exposes the
//! three read calls the query executor needs. The transport behind them
//! (signing, retries, proxies) belongs to the implementation.

use crate::model::Instance;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server-side filter: an instance matches when its `name` attribute equals
/// any of `values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListInstancesRequest {
    pub filters: Vec<Filter>,
    pub max_results: Option<u32>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InstancePage {
    pub instances: Vec<Instance>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityZone {
    pub zone_name: String,
    pub region_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub image_id: String,
    pub name: Option<String>,
}

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("request throttled: {0}")]
    Throttled(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read calls against one region endpoint. All of them are idempotent.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    async fn list_instances(&self, request: &ListInstancesRequest) -> Result<InstancePage, InventoryError>;

    async fn describe_availability_zones(&self) -> Result<Vec<AvailabilityZone>, InventoryError>;

    async fn describe_images(&self, image_ids: &[String]) -> Result<Vec<ImageSummary>, InventoryError>;
}

/// Opens clients scoped to an endpoint; `None` is the default endpoint.
pub trait InventoryConnector: Send + Sync {
    fn connect(&self, endpoint: Option<&str>) -> Result<Box<dyn InventoryClient>, InventoryError>;
}
