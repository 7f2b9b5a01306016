//! Field paths a selector may address on an instance.
//!
//! The table is closed: a path missing from it is a resolver error, while a
//! known path whose value is absent simply resolves to nothing.

use crate::model::EnrichedInstance;
use crate::selector::SelectorError;

/// Every path understood by [`field_value`].
pub const KNOWN_FIELDS: &[&str] = &[
    "instanceId",
    "imageId",
    "instanceType",
    "architecture",
    "platform",
    "kernelId",
    "keyName",
    "launchTime",
    "publicDnsName",
    "publicIpAddress",
    "privateDnsName",
    "privateIpAddress",
    "vpcId",
    "subnetId",
    "hypervisor",
    "virtualizationType",
    "rootDeviceName",
    "rootDeviceType",
    "state.name",
    "state.code",
    "placement.availabilityZone",
    "placement.tenancy",
    "placement.groupName",
    "monitoring.state",
    "imageName",
    "region",
];

pub fn field_value(inst: &EnrichedInstance, path: &str) -> Result<Option<String>, SelectorError> {
    let base = &inst.instance;
    let value = match path {
        "instanceId" => Some(base.instance_id.clone()),
        "imageId" => base.image_id.clone(),
        "instanceType" => base.instance_type.clone(),
        "architecture" => base.architecture.clone(),
        "platform" => base.platform.clone(),
        "kernelId" => base.kernel_id.clone(),
        "keyName" => base.key_name.clone(),
        "launchTime" => base.launch_time.clone(),
        "publicDnsName" => base.public_dns_name.clone(),
        "publicIpAddress" => base.public_ip_address.clone(),
        "privateDnsName" => base.private_dns_name.clone(),
        "privateIpAddress" => base.private_ip_address.clone(),
        "vpcId" => base.vpc_id.clone(),
        "subnetId" => base.subnet_id.clone(),
        "hypervisor" => base.hypervisor.clone(),
        "virtualizationType" => base.virtualization_type.clone(),
        "rootDeviceName" => base.root_device_name.clone(),
        "rootDeviceType" => base.root_device_type.clone(),
        "state.name" => base.state.as_ref().map(|s| s.name.clone()),
        "state.code" => base.state.as_ref().map(|s| s.code.to_string()),
        "placement.availabilityZone" => base.placement.as_ref().and_then(|p| p.availability_zone.clone()),
        "placement.tenancy" => base.placement.as_ref().and_then(|p| p.tenancy.clone()),
        "placement.groupName" => base.placement.as_ref().and_then(|p| p.group_name.clone()),
        "monitoring.state" => base.monitoring.as_ref().map(|m| m.state.clone()),
        "imageName" => inst.image_name.clone(),
        "region" => inst.region.clone(),
        _ => return Err(SelectorError::UnknownField(path.to_string())),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Instance, InstanceState, Placement};

    fn sample() -> EnrichedInstance {
        EnrichedInstance::from(Instance {
            instance_id: "i-1".into(),
            state: Some(InstanceState { name: "stopped".into(), code: 80 }),
            placement: Some(Placement {
                availability_zone: Some("us-east-1b".into()),
                ..Default::default()
            }),
            ..Default::default()
        })
        .with_region("us-east-1")
    }

    #[test]
    fn test_nested_paths() {
        let inst = sample();
        assert_eq!(field_value(&inst, "state.name").unwrap().as_deref(), Some("stopped"));
        assert_eq!(field_value(&inst, "state.code").unwrap().as_deref(), Some("80"));
        assert_eq!(
            field_value(&inst, "placement.availabilityZone").unwrap().as_deref(),
            Some("us-east-1b")
        );
        assert_eq!(field_value(&inst, "region").unwrap().as_deref(), Some("us-east-1"));
    }

    #[test]
    fn test_absent_value_is_not_an_error() {
        let inst = sample();
        assert_eq!(field_value(&inst, "publicDnsName").unwrap(), None);
        assert_eq!(field_value(&inst, "imageName").unwrap(), None);
    }

    #[test]
    fn test_unknown_path_is_an_error() {
        let inst = sample();
        assert!(matches!(
            field_value(&inst, "state.nope"),
            Err(SelectorError::UnknownField(p)) if p == "state.nope"
        ));
    }

    #[test]
    fn test_every_known_field_resolves() {
        let inst = sample();
        for path in KNOWN_FIELDS {
            assert!(field_value(&inst, path).is_ok(), "{path} should be known");
        }
    }
}
