//! File-backed inventory connector.
//!
//! Each region reads `<dir>/<label>.json` where `<label>` is the endpoint host
//! (or `default`). The file is re-read on every connect, so a running service
//! picks up new snapshots on its next refresh cycle.

use crate::endpoints::endpoint_label;
use crate::inventory::{
    AvailabilityZone, Filter, ImageSummary, InstancePage, InventoryClient, InventoryConnector, InventoryError,
    ListInstancesRequest,
};
use crate::model::Instance;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotFile {
    pub instances: Vec<Instance>,
    pub availability_zones: Vec<AvailabilityZone>,
    pub images: Vec<ImageSummary>,
}

#[derive(Debug, Clone)]
pub struct SnapshotConnector {
    dir: PathBuf,
}

impl SnapshotConnector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, endpoint: Option<&str>) -> PathBuf {
        self.dir.join(format!("{}.json", endpoint_label(endpoint)))
    }
}

impl InventoryConnector for SnapshotConnector {
    fn connect(&self, endpoint: Option<&str>) -> Result<Box<dyn InventoryClient>, InventoryError> {
        let path = self.path_for(endpoint);
        if !path.is_file() {
            return Err(InventoryError::Unreachable(format!("no snapshot at {}", path.display())));
        }
        let text = std::fs::read_to_string(&path)?;
        let file: SnapshotFile = serde_json::from_str(&text)?;
        debug!(path = %path.display(), instances = file.instances.len(), "snapshot loaded");
        Ok(Box::new(SnapshotClient { file }))
    }
}

pub struct SnapshotClient {
    file: SnapshotFile,
}

impl SnapshotClient {
    pub fn new(file: SnapshotFile) -> Self {
        Self { file }
    }
}

#[async_trait]
impl InventoryClient for SnapshotClient {
    async fn list_instances(&self, request: &ListInstancesRequest) -> Result<InstancePage, InventoryError> {
        let offset = match request.next_token.as_deref() {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| InventoryError::InvalidResponse(format!("bad continuation token '{token}'")))?,
            None => 0,
        };
        let matching: Vec<&Instance> = self
            .file
            .instances
            .iter()
            .filter(|inst| request.filters.iter().all(|f| filter_matches(f, inst)))
            .collect();

        let page_size = request.max_results.map_or(matching.len(), |m| m.max(1) as usize);
        let end = offset.saturating_add(page_size).min(matching.len());
        let instances = matching.get(offset..end).unwrap_or_default().iter().map(|i| (*i).clone()).collect();
        let next_token = (end < matching.len()).then(|| end.to_string());
        Ok(InstancePage { instances, next_token })
    }

    async fn describe_availability_zones(&self) -> Result<Vec<AvailabilityZone>, InventoryError> {
        Ok(self.file.availability_zones.clone())
    }

    async fn describe_images(&self, image_ids: &[String]) -> Result<Vec<ImageSummary>, InventoryError> {
        Ok(self
            .file
            .images
            .iter()
            .filter(|img| image_ids.contains(&img.image_id))
            .cloned()
            .collect())
    }
}

fn filter_matches(filter: &Filter, inst: &Instance) -> bool {
    let value = match filter.name.as_str() {
        "instance-state-name" => inst.state.as_ref().map(|s| s.name.as_str()),
        "instance-id" => Some(inst.instance_id.as_str()),
        "instance-type" => inst.instance_type.as_deref(),
        "availability-zone" => inst.availability_zone(),
        "image-id" => inst.image_id.as_deref(),
        name => match name.strip_prefix("tag:") {
            Some(key) => inst.tags.get(key).map(String::as_str),
            None => {
                warn!(filter = name, "unsupported filter ignored");
                return true;
            }
        },
    };
    value.is_some_and(|v| filter.values.iter().any(|expected| expected == v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InstanceState;
    use std::collections::BTreeMap;

    fn inst(id: &str, state: &str, env: &str) -> Instance {
        Instance {
            instance_id: id.into(),
            state: Some(InstanceState { name: state.into(), code: 0 }),
            tags: BTreeMap::from([("env".to_string(), env.to_string())]),
            ..Default::default()
        }
    }

    fn client() -> SnapshotClient {
        SnapshotClient::new(SnapshotFile {
            instances: vec![
                inst("i-1", "running", "prod"),
                inst("i-2", "stopped", "prod"),
                inst("i-3", "running", "dev"),
                inst("i-4", "running", "prod"),
            ],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_paging_with_offset_tokens() {
        let client = client();
        let mut request = ListInstancesRequest {
            max_results: Some(3),
            ..Default::default()
        };
        let first = client.list_instances(&request).await.unwrap();
        assert_eq!(first.instances.len(), 3);
        assert_eq!(first.next_token.as_deref(), Some("3"));

        request.next_token = first.next_token;
        let second = client.list_instances(&request).await.unwrap();
        assert_eq!(second.instances.len(), 1);
        assert_eq!(second.instances[0].instance_id, "i-4");
        assert_eq!(second.next_token, None);
    }

    #[tokio::test]
    async fn test_filters() {
        let client = client();
        let request = ListInstancesRequest {
            filters: vec![
                Filter::new("instance-state-name", vec!["running".into()]),
                Filter::new("tag:env", vec!["prod".into()]),
                Filter::new("owner-id", vec!["123".into()]),
            ],
            ..Default::default()
        };
        let page = client.list_instances(&request).await.unwrap();
        let ids: Vec<_> = page.instances.iter().map(|i| i.instance_id.as_str()).collect();
        assert_eq!(ids, vec!["i-1", "i-4"]);
    }

    #[tokio::test]
    async fn test_bad_token_rejected() {
        let request = ListInstancesRequest {
            next_token: Some("abc".into()),
            ..Default::default()
        };
        assert!(matches!(
            client().list_instances(&request).await,
            Err(InventoryError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_connect_reads_labelled_file() {
        let dir = tempfile::tempdir().unwrap();
        let connector = SnapshotConnector::new(dir.path());
        assert!(matches!(
            connector.connect(None),
            Err(InventoryError::Unreachable(_))
        ));

        std::fs::write(
            dir.path().join("ec2.eu-west-1.amazonaws.com.json"),
            r#"{"instances":[{"instanceId":"i-9"}],"availabilityZones":[{"zoneName":"eu-west-1a","regionName":"eu-west-1"}]}"#,
        )
        .unwrap();
        assert!(connector.connect(Some("https://ec2.eu-west-1.amazonaws.com")).is_ok());
        assert!(connector.connect(Some("https://ec2.us-east-1.amazonaws.com")).is_err());
    }
}
