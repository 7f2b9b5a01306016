/*!
Builders d'instances et de snapshots pour les tests

Évite de répéter les structures `Instance` complètes dans chaque test.
*/

use anyhow::Result;
use std::path::{Path, PathBuf};
use symbion_inventory::endpoints::endpoint_label;
use symbion_inventory::inventory::{AvailabilityZone, ImageSummary};
use symbion_inventory::model::{EnrichedInstance, Instance, InstanceState, Placement};
use symbion_inventory::snapshot::SnapshotFile;

/// Builder fluide pour `Instance`
#[derive(Debug, Clone)]
pub struct InstanceBuilder {
    instance: Instance,
}

impl InstanceBuilder {
    pub fn new(instance_id: &str) -> Self {
        Self {
            instance: Instance {
                instance_id: instance_id.to_string(),
                ..Default::default()
            },
        }
    }

    /// Instance "running" avec DNS public et IP privée dérivés de l'id
    pub fn running(instance_id: &str) -> Self {
        Self::new(instance_id)
            .state("running")
            .public_dns(&format!("{instance_id}.compute.example"))
            .private_ip("10.0.0.10")
    }

    pub fn state(mut self, name: &str) -> Self {
        let code = match name {
            "pending" => 0,
            "running" => 16,
            "shutting-down" => 32,
            "terminated" => 48,
            "stopping" => 64,
            "stopped" => 80,
            _ => -1,
        };
        self.instance.state = Some(InstanceState {
            name: name.to_string(),
            code,
        });
        self
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.instance.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn public_dns(mut self, dns: &str) -> Self {
        self.instance.public_dns_name = Some(dns.to_string());
        self
    }

    pub fn public_ip(mut self, ip: &str) -> Self {
        self.instance.public_ip_address = Some(ip.to_string());
        self
    }

    pub fn private_ip(mut self, ip: &str) -> Self {
        self.instance.private_ip_address = Some(ip.to_string());
        self
    }

    pub fn image(mut self, image_id: &str) -> Self {
        self.instance.image_id = Some(image_id.to_string());
        self
    }

    pub fn instance_type(mut self, instance_type: &str) -> Self {
        self.instance.instance_type = Some(instance_type.to_string());
        self
    }

    pub fn architecture(mut self, arch: &str) -> Self {
        self.instance.architecture = Some(arch.to_string());
        self
    }

    pub fn platform(mut self, platform: &str) -> Self {
        self.instance.platform = Some(platform.to_string());
        self
    }

    pub fn zone(mut self, zone: &str) -> Self {
        self.instance.placement = Some(Placement {
            availability_zone: Some(zone.to_string()),
            ..Default::default()
        });
        self
    }

    pub fn build(self) -> Instance {
        self.instance
    }

    pub fn enriched(self) -> EnrichedInstance {
        EnrichedInstance::from(self.instance)
    }
}

/// Builder pour les fichiers lus par `SnapshotConnector`
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    file: SnapshotFile,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instance(mut self, instance: Instance) -> Self {
        self.file.instances.push(instance);
        self
    }

    pub fn zone(mut self, zone: &str, region: &str) -> Self {
        self.file.availability_zones.push(AvailabilityZone {
            zone_name: zone.to_string(),
            region_name: region.to_string(),
        });
        self
    }

    pub fn image(mut self, image_id: &str, name: &str) -> Self {
        self.file.images.push(ImageSummary {
            image_id: image_id.to_string(),
            name: Some(name.to_string()),
        });
        self
    }

    pub fn build(self) -> SnapshotFile {
        self.file
    }

    /// Écrit `<dir>/<label>.json` pour l'endpoint donné (`None` = défaut)
    pub fn write_to(&self, dir: &Path, endpoint: Option<&str>) -> Result<PathBuf> {
        let path = dir.join(format!("{}.json", endpoint_label(endpoint)));
        std::fs::write(&path, serde_json::to_vec_pretty(&self.file)?)?;
        log::info!("📝 Snapshot written: {} ({} instances)", path.display(), self.file.instances.len());
        Ok(path)
    }
}
