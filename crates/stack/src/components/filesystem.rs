//! Shared elastic file system mounted by every application instance.

use tracing::info;

use super::security::SecurityGroup;
use super::tags;
use crate::error::{Result, StackError};
use crate::intrinsic::Expr;
use crate::resource::{DeletionPolicy, Resource, ResourceRef, ResourceType};
use crate::stack::Stack;

/// NFS port.
pub const NFS_PORT: u16 = 2049;

/// Idle periods the platform accepts for the infrequent-access transition.
pub const TRANSITION_DAYS: [u32; 5] = [7, 14, 30, 60, 90];

/// File system props.
#[derive(Debug, Clone)]
pub struct FileSystemProps {
    pub name: String,
    pub vpc: ResourceRef,
    /// One mount target is created per subnet.
    pub subnets: Vec<ResourceRef>,
    /// Days without access before files move to infrequent access.
    pub transition_to_ia_days: u32,
}

/// Declared file system.
#[derive(Debug, Clone)]
pub struct FileSystem {
    pub handle: ResourceRef,
    pub mount_targets: Vec<ResourceRef>,
    pub security_group: SecurityGroup,
}

impl FileSystem {
    /// Declare the file system, its security group and mount targets.
    ///
    /// # Errors
    ///
    /// Returns an error for an unsupported transition period or no subnets.
    pub fn declare(stack: &mut Stack, props: &FileSystemProps) -> Result<Self> {
        if !TRANSITION_DAYS.contains(&props.transition_to_ia_days) {
            return Err(StackError::invalid(
                "transition_to_ia_days",
                format!("{} is not one of {TRANSITION_DAYS:?}", props.transition_to_ia_days),
            ));
        }
        if props.subnets.is_empty() {
            return Err(StackError::invalid("subnets", "at least one mount subnet is required"));
        }

        let name = props.name.as_str();
        let security_group = SecurityGroup::declare(
            stack,
            &format!("{name}-sg"),
            &format!("Security group for {name} mount targets"),
            &props.vpc,
        )?;

        let handle = stack.insert(
            Resource::new(
                crate::naming::logical_id(name),
                ResourceType::FileSystem,
                Expr::object([
                    ("Encrypted", Expr::from(true)),
                    (
                        "LifecyclePolicies",
                        Expr::list([
                            Expr::object([(
                                "TransitionToIA",
                                Expr::from(format!("AFTER_{}_DAYS", props.transition_to_ia_days)),
                            )]),
                            Expr::object([(
                                "TransitionToPrimaryStorageClass",
                                Expr::from("AFTER_1_ACCESS"),
                            )]),
                        ]),
                    ),
                    ("PerformanceMode", "generalPurpose".into()),
                    ("ThroughputMode", "bursting".into()),
                    (
                        "BackupPolicy",
                        Expr::object([("Status", Expr::from("ENABLED"))]),
                    ),
                    ("FileSystemTags", tags([("Name", Expr::from(name))])),
                ]),
            )
            .with_removal_policy(DeletionPolicy::Delete),
        )?;

        let mount_targets = props
            .subnets
            .iter()
            .enumerate()
            .map(|(index, subnet)| {
                stack.add_resource(
                    &format!("{name}-mount-target-{}", index + 1),
                    ResourceType::MountTarget,
                    Expr::object([
                        ("FileSystemId", handle.reference()),
                        ("SubnetId", subnet.reference()),
                        ("SecurityGroups", Expr::list([security_group.group_id()])),
                    ]),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            file_system = %handle.id(),
            mount_targets = mount_targets.len(),
            "Declared file system"
        );

        Ok(Self {
            handle,
            mount_targets,
            security_group,
        })
    }

    /// Allow NFS from `peer`'s members.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule already exists.
    pub fn allow_default_port_from(
        &self,
        stack: &mut Stack,
        peer: &SecurityGroup,
        description: &str,
    ) -> Result<ResourceRef> {
        self.security_group
            .allow_from(stack, &peer.as_peer(), NFS_PORT, description)
    }
}
