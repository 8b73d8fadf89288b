//! Standalone staging instance with a static public address.

use tracing::info;

use super::compute::root_volume;
use super::security::SecurityGroup;
use super::tags;
use crate::error::{Result, StackError};
use crate::intrinsic::Expr;
use crate::resource::{ResourceRef, ResourceType};
use crate::stack::Stack;

/// Staging instance props.
#[derive(Debug, Clone)]
pub struct StagingProps {
    pub name: String,
    pub instance_type: String,
    pub image_id: Expr,
    pub key_name: Option<String>,
    pub root_volume_gib: u32,
    /// Public subnet the instance lives in.
    pub subnet: ResourceRef,
}

/// The declared staging instance and its address.
#[derive(Debug, Clone)]
pub struct StagingInstance {
    pub instance: ResourceRef,
    pub elastic_ip: ResourceRef,
}

impl StagingInstance {
    /// Declare the instance, attached to every group in `security_groups`.
    ///
    /// # Errors
    ///
    /// Returns an error if no security group is given or a name is taken.
    pub fn declare(
        stack: &mut Stack,
        props: &StagingProps,
        security_groups: &[&SecurityGroup],
    ) -> Result<Self> {
        if security_groups.is_empty() {
            return Err(StackError::invalid(
                "security_groups",
                "staging instance needs at least one security group",
            ));
        }

        let mut properties = Expr::object([
            ("InstanceType", Expr::from(props.instance_type.as_str())),
            ("ImageId", props.image_id.clone()),
            ("SubnetId", props.subnet.reference()),
            (
                "SecurityGroupIds",
                Expr::List(security_groups.iter().map(|sg| sg.group_id()).collect()),
            ),
            (
                "BlockDeviceMappings",
                Expr::list([root_volume(props.root_volume_gib)]),
            ),
            ("Tags", tags([("Name", Expr::from(props.name.as_str()))])),
        ]);
        if let Some(key) = &props.key_name {
            properties.insert("KeyName", key.into());
        }

        let instance = stack.add_resource(&props.name, ResourceType::Instance, properties)?;
        let elastic_ip = stack.add_resource(
            &format!("{}-eip", props.name),
            ResourceType::Eip,
            Expr::object([("Domain", Expr::from("vpc")), ("InstanceId", instance.reference())]),
        )?;

        info!(instance = %instance.id(), "Declared staging instance");
        Ok(Self {
            instance,
            elastic_ip,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eip_binds_instance() {
        let mut stack = Stack::new("staging").unwrap();
        let vpc = stack
            .add_resource("vpc", ResourceType::Vpc, Expr::empty_object())
            .unwrap();
        let subnet = stack
            .add_resource("subnet", ResourceType::Subnet, Expr::object([("VpcId", vpc.reference())]))
            .unwrap();
        let sg = SecurityGroup::declare(&mut stack, "sg", "staging", &vpc).unwrap();
        let staging = StagingInstance::declare(
            &mut stack,
            &StagingProps {
                name: "moodle-staging-server".into(),
                instance_type: "t3.large".into(),
                image_id: Expr::from("ami-1"),
                key_name: None,
                root_volume_gib: 30,
                subnet,
            },
            &[&sg],
        )
        .unwrap();

        let eip = stack.resource(staging.elastic_ip.id()).unwrap();
        assert_eq!(eip.property("InstanceId"), Some(&staging.instance.reference()));
        let instance = stack.resource(staging.instance.id()).unwrap();
        assert!(instance.property("KeyName").is_none());
        assert!(stack
            .graph()
            .unwrap()
            .depends_on("MoodleStagingServerEip", "MoodleStagingServer"));
    }
}
