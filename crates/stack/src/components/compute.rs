//! Compute fleet: launch template, autoscaling group and scaling policy.

use tracing::info;

use super::security::SecurityGroup;
use super::tags;
use crate::error::{Result, StackError};
use crate::intrinsic::Expr;
use crate::resource::{ResourceRef, ResourceType};
use crate::stack::Stack;

/// Root device of the Amazon Linux images.
pub const ROOT_DEVICE: &str = "/dev/xvda";

/// Launch template props.
#[derive(Debug, Clone)]
pub struct LaunchTemplateProps {
    pub name: String,
    /// Image ID expression, usually a `Ref` to the image parameter.
    pub image_id: Expr,
    /// Key pair, `None` to launch without one.
    pub key_name: Option<String>,
    pub root_volume_gib: u32,
    /// One-minute instance metrics.
    pub detailed_monitoring: bool,
    /// Burstable instances may exceed their baseline indefinitely.
    pub unlimited_cpu_credits: bool,
}

/// A declared launch template.
#[derive(Debug, Clone)]
pub struct LaunchTemplate {
    pub handle: ResourceRef,
}

impl LaunchTemplate {
    /// Declare a launch template bound to `security_group`.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero-sized root volume or a taken name.
    pub fn declare(
        stack: &mut Stack,
        props: &LaunchTemplateProps,
        security_group: &SecurityGroup,
    ) -> Result<Self> {
        if props.root_volume_gib == 0 {
            return Err(StackError::invalid("root_volume_gib", "must be positive"));
        }

        let mut data = Expr::object([
            ("ImageId", props.image_id.clone()),
            (
                "BlockDeviceMappings",
                Expr::list([root_volume(props.root_volume_gib)]),
            ),
            ("SecurityGroupIds", Expr::list([security_group.group_id()])),
            (
                "Monitoring",
                Expr::object([("Enabled", props.detailed_monitoring.into())]),
            ),
            (
                "TagSpecifications",
                Expr::list([Expr::object([
                    ("ResourceType", Expr::from("instance")),
                    ("Tags", tags([("Name", Expr::from(props.name.as_str()))])),
                ])]),
            ),
        ]);
        if props.unlimited_cpu_credits {
            data.insert(
                "CreditSpecification",
                Expr::object([("CpuCredits", Expr::from("unlimited"))]),
            );
        }
        if let Some(key) = &props.key_name {
            data.insert("KeyName", key.into());
        }

        let handle = stack.add_resource(
            &props.name,
            ResourceType::LaunchTemplate,
            Expr::object([("LaunchTemplateData", data)]),
        )?;
        Ok(Self { handle })
    }
}

/// EBS root volume mapping of `size_gib`.
pub(crate) fn root_volume(size_gib: u32) -> Expr {
    Expr::object([
        ("DeviceName", Expr::from(ROOT_DEVICE)),
        ("Ebs", Expr::object([("VolumeSize", size_gib.into())])),
    ])
}

/// Autoscaling group props.
#[derive(Debug, Clone)]
pub struct FleetProps {
    pub name: String,
    /// Subnet list the group launches into.
    pub subnets: Expr,
    pub min_capacity: u32,
    pub max_capacity: u32,
    /// Percentage of capacity above the base that is on-demand; the rest is spot.
    pub on_demand_percentage_above_base: u32,
    /// Instance types, in priority order.
    pub instance_types: Vec<String>,
}

/// A declared autoscaling group.
#[derive(Debug, Clone)]
pub struct Fleet {
    name: String,
    pub handle: ResourceRef,
}

impl Fleet {
    /// Declare the autoscaling group on top of `launch_template`.
    ///
    /// # Errors
    ///
    /// Returns an error if the capacity bounds or the on-demand share are invalid.
    pub fn declare(
        stack: &mut Stack,
        props: &FleetProps,
        launch_template: &LaunchTemplate,
    ) -> Result<Self> {
        if props.min_capacity > props.max_capacity || props.max_capacity == 0 {
            return Err(StackError::invalid(
                "capacity",
                format!(
                    "min ({}) must not exceed max ({}) and max must be positive",
                    props.min_capacity, props.max_capacity
                ),
            ));
        }
        if props.on_demand_percentage_above_base > 100 {
            return Err(StackError::invalid(
                "on_demand_percentage_above_base",
                "must be a percentage (0-100)",
            ));
        }
        if props.instance_types.is_empty() {
            return Err(StackError::invalid("instance_types", "must not be empty"));
        }

        let overrides = props
            .instance_types
            .iter()
            .map(|t| Expr::object([("InstanceType", Expr::from(t))]))
            .collect::<Vec<_>>();

        let handle = stack.add_resource(
            &props.name,
            ResourceType::AutoScalingGroup,
            Expr::object([
                ("MinSize", Expr::from(props.min_capacity.to_string())),
                ("MaxSize", Expr::from(props.max_capacity.to_string())),
                ("VPCZoneIdentifier", props.subnets.clone()),
                (
                    "MixedInstancesPolicy",
                    Expr::object([
                        (
                            "InstancesDistribution",
                            Expr::object([(
                                "OnDemandPercentageAboveBaseCapacity",
                                props.on_demand_percentage_above_base.into(),
                            )]),
                        ),
                        (
                            "LaunchTemplate",
                            Expr::object([
                                (
                                    "LaunchTemplateSpecification",
                                    Expr::object([
                                        ("LaunchTemplateId", launch_template.handle.reference()),
                                        (
                                            "Version",
                                            launch_template.handle.attr("LatestVersionNumber"),
                                        ),
                                    ]),
                                ),
                                ("Overrides", Expr::List(overrides)),
                            ]),
                        ),
                    ]),
                ),
                (
                    "MetricsCollection",
                    Expr::list([Expr::object([("Granularity", Expr::from("1Minute"))])]),
                ),
                ("TargetGroupARNs", Expr::List(Vec::new())),
                (
                    "Tags",
                    Expr::list([Expr::object([
                        ("Key", Expr::from("Name")),
                        ("Value", Expr::from(props.name.as_str())),
                        ("PropagateAtLaunch", true.into()),
                    ])]),
                ),
            ]),
        )?;

        info!(
            group = %handle.id(),
            min = props.min_capacity,
            max = props.max_capacity,
            on_demand_pct = props.on_demand_percentage_above_base,
            "Declared autoscaling group"
        );

        Ok(Self {
            name: props.name.clone(),
            handle,
        })
    }

    /// Add a target-tracking policy holding average CPU at `target_percent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the target is not in `(0, 100]`.
    pub fn scale_on_cpu_utilization(
        &self,
        stack: &mut Stack,
        name: &str,
        target_percent: f64,
    ) -> Result<ResourceRef> {
        if !(target_percent > 0.0 && target_percent <= 100.0) {
            return Err(StackError::invalid(
                "target_percent",
                format!("{target_percent} is not in (0, 100]"),
            ));
        }
        stack.add_resource(
            &format!("{}-{name}", self.name),
            ResourceType::ScalingPolicy,
            Expr::object([
                ("AutoScalingGroupName", self.handle.reference()),
                ("PolicyType", "TargetTrackingScaling".into()),
                (
                    "TargetTrackingConfiguration",
                    Expr::object([
                        (
                            "PredefinedMetricSpecification",
                            Expr::object([(
                                "PredefinedMetricType",
                                Expr::from("ASGAverageCPUUtilization"),
                            )]),
                        ),
                        ("TargetValue", target_percent.into()),
                    ]),
                ),
            ]),
        )
    }

    /// Register the group's instances with `target_group`.
    ///
    /// # Errors
    ///
    /// Returns an error if the group is not in `stack`.
    pub fn attach_target_group(&self, stack: &mut Stack, target_group: &ResourceRef) -> Result<()> {
        let resource = stack.resource_mut(&self.handle)?;
        match resource.properties.get_mut("TargetGroupARNs") {
            Some(Expr::List(arns)) => arns.push(target_group.reference()),
            _ => {
                resource.properties.insert(
                    "TargetGroupARNs",
                    Expr::list([target_group.reference()]),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fleet_stack(min: u32, max: u32) -> Result<(Stack, Fleet)> {
        let mut stack = Stack::new("fleet").unwrap();
        let vpc = stack.add_resource("vpc", ResourceType::Vpc, Expr::empty_object())?;
        let sg = SecurityGroup::declare(&mut stack, "app-sg", "app", &vpc)?;
        let lt = LaunchTemplate::declare(
            &mut stack,
            &LaunchTemplateProps {
                name: "app-lt".into(),
                image_id: Expr::from("ami-123"),
                key_name: Some("k1".into()),
                root_volume_gib: 30,
                detailed_monitoring: true,
                unlimited_cpu_credits: true,
            },
            &sg,
        )?;
        let fleet = Fleet::declare(
            &mut stack,
            &FleetProps {
                name: "app-asg".into(),
                subnets: Expr::list(["subnet-a", "subnet-b"]),
                min_capacity: min,
                max_capacity: max,
                on_demand_percentage_above_base: 25,
                instance_types: vec!["t3.large".into(), "m5.large".into()],
            },
            &lt,
        )?;
        Ok((stack, fleet))
    }

    #[test]
    fn test_launch_template_data() {
        let (stack, _) = fleet_stack(1, 10).unwrap();
        let lt = stack.resource("AppLt").unwrap();
        let data = lt.property("LaunchTemplateData").unwrap();
        assert_eq!(data.get("KeyName").and_then(Expr::as_str), Some("k1"));
        assert_eq!(data.path(&["Monitoring", "Enabled"]).and_then(Expr::as_bool), Some(true));
        assert_eq!(
            data.path(&["CreditSpecification", "CpuCredits"]).and_then(Expr::as_str),
            Some("unlimited")
        );
        let volume = &data.get("BlockDeviceMappings").unwrap().as_list().unwrap()[0];
        assert_eq!(volume.path(&["Ebs", "VolumeSize"]).and_then(Expr::as_i64), Some(30));
        assert_eq!(volume.get("DeviceName").and_then(Expr::as_str), Some(ROOT_DEVICE));
    }

    #[test]
    fn test_group_capacity_and_mix() {
        let (stack, fleet) = fleet_stack(1, 10).unwrap();
        let asg = stack.resource(fleet.handle.id()).unwrap();
        assert_eq!(asg.property("MinSize").and_then(Expr::as_i64), Some(1));
        assert_eq!(asg.property("MaxSize").and_then(Expr::as_i64), Some(10));
        assert_eq!(
            asg.properties
                .path(&["MixedInstancesPolicy", "InstancesDistribution", "OnDemandPercentageAboveBaseCapacity"])
                .and_then(Expr::as_i64),
            Some(25)
        );
        assert!(stack.graph().unwrap().depends_on("AppAsg", "AppLt"));
    }

    #[test]
    fn test_inverted_bounds_are_rejected() {
        assert!(fleet_stack(5, 2).is_err());
        assert!(fleet_stack(0, 0).is_err());
    }

    #[test]
    fn test_scaling_policy_and_target_group() {
        let (mut stack, fleet) = fleet_stack(1, 10).unwrap();
        let policy = fleet
            .scale_on_cpu_utilization(&mut stack, "scale-by-cpu", 60.0)
            .unwrap();
        assert_eq!(policy.id(), "AppAsgScaleByCpu");
        let policy = stack.resource(policy.id()).unwrap();
        assert_eq!(
            policy
                .properties
                .path(&["TargetTrackingConfiguration", "TargetValue"])
                .and_then(Expr::as_f64),
            Some(60.0)
        );
        assert!(fleet.scale_on_cpu_utilization(&mut stack, "bad", 0.0).is_err());

        let tg = stack
            .add_resource("app-tg", ResourceType::TargetGroup, Expr::empty_object())
            .unwrap();
        fleet.attach_target_group(&mut stack, &tg).unwrap();
        let asg = stack.resource(fleet.handle.id()).unwrap();
        assert_eq!(
            asg.property("TargetGroupARNs").and_then(Expr::as_list),
            Some(&[tg.reference()][..])
        );
    }
}
