use std::collections::HashMap;
use std::sync::Arc;
use symbion_inventory::config::SourceConfig;
use symbion_inventory::refresh::NodeSource;
use symbion_inventory::render::{resource_document, to_yaml, ResourceDocument};
use symbion_inventory::snapshot::SnapshotConnector;
use symbion_inventory_devkit::{InstanceBuilder, SnapshotBuilder};

fn properties(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[tokio::test]
async fn test_snapshot_to_resource_document() {
    let dir = tempfile::tempdir().unwrap();
    SnapshotBuilder::new()
        .instance(
            InstanceBuilder::running("i-1")
                .tag("Name", "web-1")
                .tag("Rundeck-Tags", "app,blue")
                .tag("ssh_config_Port", "2222")
                .zone("eu-west-1a")
                .architecture("x86_64")
                .build(),
        )
        .instance(InstanceBuilder::new("i-2").state("stopped").build())
        .zone("eu-west-1a", "eu-west-1")
        .write_to(dir.path(), None)
        .unwrap();

    let config = SourceConfig::from_properties(&properties(&[("refreshInterval", "60")])).unwrap();
    let source = NodeSource::from_config("lab", &config, Arc::new(SnapshotConnector::new(dir.path()))).unwrap();
    let nodes = source.get_nodes().await.unwrap();

    assert_eq!(nodes.len(), 2);
    let web = nodes.get("web-1").unwrap();
    assert_eq!(web.hostname.as_deref(), Some("i-1.compute.example:2222"));
    assert_eq!(web.attribute("region"), Some("eu-west-1"));
    assert!(web.has_tag("blue"));

    let stopped = nodes.get("i-2").unwrap();
    assert!(stopped.has_tag("stopped"));
    assert!(stopped.has_tag("ec2"));

    let doc = resource_document(&nodes);
    assert_eq!(doc["web-1"]["tags"], "app,blue,running");
    let yaml = to_yaml(&nodes).unwrap();
    let parsed: ResourceDocument = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed, doc);
}

#[tokio::test]
async fn test_mapping_file_inline_overrides_and_filters() {
    let dir = tempfile::tempdir().unwrap();
    SnapshotBuilder::new()
        .instance(InstanceBuilder::running("i-1").tag("env", "prod").image("ami-1").build())
        .instance(InstanceBuilder::running("i-2").tag("env", "dev").build())
        .instance(InstanceBuilder::new("i-3").state("stopped").tag("env", "prod").build())
        .image("ami-1", "golden")
        .write_to(dir.path(), Some("https://ec2.eu-west-1.amazonaws.com"))
        .unwrap();

    let mapping = dir.path().join("mapping.properties");
    std::fs::write(
        &mapping,
        "# lab mapping\nnodename.selector=instanceId\nhostname.selector=privateIpAddress\nami.selector=imageName\n",
    )
    .unwrap();

    let config = SourceConfig::from_properties(&properties(&[
        ("endpoint", "https://ec2.eu-west-1.amazonaws.com"),
        ("filter", "tag:env=prod"),
        ("runningOnly", "true"),
        ("useDefaultMapping", "false"),
        ("mappingFile", mapping.to_str().unwrap()),
        ("mappingParams", "tag.production.selector=tags/env=prod"),
    ]))
    .unwrap();
    let source = NodeSource::from_config("prod", &config, Arc::new(SnapshotConnector::new(dir.path()))).unwrap();
    let nodes = source.get_nodes().await.unwrap();

    let names: Vec<_> = nodes.names().collect();
    assert_eq!(names, vec!["i-1"]);
    let node = nodes.get("i-1").unwrap();
    assert_eq!(node.hostname.as_deref(), Some("10.0.0.10"));
    assert_eq!(node.attribute("ami"), Some("golden"));
    assert!(node.has_tag("production"));
}

#[tokio::test]
async fn test_missing_snapshot_fails_first_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let source = NodeSource::from_config(
        "empty",
        &SourceConfig::default(),
        Arc::new(SnapshotConnector::new(dir.path())),
    )
    .unwrap();
    assert!(source.get_nodes().await.is_err());
}
