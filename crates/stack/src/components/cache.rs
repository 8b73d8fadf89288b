//! In-memory session cache: a Redis replication group in private subnets.

use tracing::info;

use super::security::SecurityGroup;
use crate::error::{Result, StackError};
use crate::intrinsic::Expr;
use crate::resource::{ResourceRef, ResourceType};
use crate::stack::Stack;

/// Redis port.
pub const REDIS_PORT: u16 = 6379;

/// Cache props.
#[derive(Debug, Clone)]
pub struct CacheProps {
    pub name: String,
    /// Physical subnet group name, referenced by name from the group.
    pub subnet_group_name: String,
    pub node_type: String,
    /// Primary plus replicas.
    pub num_cache_clusters: u32,
    pub multi_az: bool,
    pub subnets: Expr,
    pub vpc: ResourceRef,
}

/// Declared cache.
#[derive(Debug, Clone)]
pub struct Cache {
    pub replication_group: ResourceRef,
    pub subnet_group: ResourceRef,
    pub security_group: SecurityGroup,
}

impl Cache {
    /// Declare security group, subnet group and replication group.
    ///
    /// # Errors
    ///
    /// Returns an error if the node count cannot support failover.
    pub fn declare(stack: &mut Stack, props: &CacheProps) -> Result<Self> {
        if props.num_cache_clusters < 2 {
            return Err(StackError::invalid(
                "num_cache_clusters",
                "automatic failover needs at least two nodes",
            ));
        }
        if props.subnet_group_name.is_empty() {
            return Err(StackError::invalid("subnet_group_name", "must not be empty"));
        }

        let name = props.name.as_str();
        let security_group = SecurityGroup::declare(
            stack,
            &format!("{name}-sg"),
            &format!("Security group for {name}"),
            &props.vpc,
        )?;

        let subnet_group = stack.add_resource(
            &format!("{name}-subnet-group"),
            ResourceType::CacheSubnetGroup,
            Expr::object([
                ("CacheSubnetGroupName", Expr::from(props.subnet_group_name.as_str())),
                ("Description", format!("Subnet group for {name}").into()),
                ("SubnetIds", props.subnets.clone()),
            ]),
        )?;

        let replication_group = stack.add_resource(
            name,
            ResourceType::ReplicationGroup,
            Expr::object([
                ("ReplicationGroupDescription", Expr::from(format!("{name} replication group"))),
                ("Engine", "redis".into()),
                ("CacheNodeType", props.node_type.as_str().into()),
                ("NumCacheClusters", props.num_cache_clusters.into()),
                ("MultiAZEnabled", props.multi_az.into()),
                ("AutomaticFailoverEnabled", true.into()),
                ("AutoMinorVersionUpgrade", true.into()),
                ("AtRestEncryptionEnabled", true.into()),
                ("CacheSubnetGroupName", props.subnet_group_name.as_str().into()),
                ("SecurityGroupIds", Expr::list([security_group.group_id()])),
            ]),
        )?;
        // The group names its subnet group by physical name, not by Ref.
        stack.add_dependency(&replication_group, &subnet_group)?;

        info!(
            replication_group = %replication_group.id(),
            nodes = props.num_cache_clusters,
            multi_az = props.multi_az,
            "Declared cache"
        );

        Ok(Self {
            replication_group,
            subnet_group,
            security_group,
        })
    }

    /// Allow Redis from `peer`'s members.
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
            .allow_from(stack, &peer.as_peer(), REDIS_PORT, description)
    }

    /// `address:port` of the primary endpoint.
    #[must_use]
    pub fn primary_endpoint(&self) -> Expr {
        Expr::join(
            ":",
            vec![
                self.replication_group.attr("PrimaryEndPoint.Address"),
                self.replication_group.attr("PrimaryEndPoint.Port"),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declare(nodes: u32, multi_az: bool) -> Result<(Stack, Cache)> {
        let mut stack = Stack::new("cache").unwrap();
        let vpc = stack.add_resource("vpc", ResourceType::Vpc, Expr::empty_object())?;
        let cache = Cache::declare(
            &mut stack,
            &CacheProps {
                name: "moodle-redis".into(),
                subnet_group_name: "cache-redis-subnet-group".into(),
                node_type: "cache.t3.medium".into(),
                num_cache_clusters: nodes,
                multi_az,
                subnets: Expr::list(["subnet-a", "subnet-b"]),
                vpc,
            },
        )?;
        Ok((stack, cache))
    }

    #[test]
    fn test_replication_group_settings() {
        let (stack, cache) = declare(2, true).unwrap();
        let group = stack.resource(cache.replication_group.id()).unwrap();
        assert_eq!(group.property("NumCacheClusters").and_then(Expr::as_i64), Some(2));
        assert_eq!(group.property("MultiAZEnabled").and_then(Expr::as_bool), Some(true));
        assert_eq!(group.property("AutomaticFailoverEnabled").and_then(Expr::as_bool), Some(true));
        assert_eq!(
            group.property("CacheSubnetGroupName").and_then(Expr::as_str),
            Some("cache-redis-subnet-group")
        );
    }

    #[test]
    fn test_explicit_subnet_group_dependency() {
        let (stack, cache) = declare(2, false).unwrap();
        let group = stack.resource(cache.replication_group.id()).unwrap();
        assert!(group.depends_on.contains(cache.subnet_group.id()));
        assert!(stack
            .graph()
            .unwrap()
            .depends_on(cache.replication_group.id(), cache.subnet_group.id()));
    }

    #[test]
    fn test_primary_endpoint_joins_address_and_port() {
        let (_, cache) = declare(2, true).unwrap();
        let rendered = serde_json::to_value(cache.primary_endpoint()).unwrap();
        assert_eq!(rendered["Fn::Join"][0], ":");
        assert_eq!(
            rendered["Fn::Join"][1][1]["Fn::GetAtt"][1],
            "PrimaryEndPoint.Port"
        );
    }

    #[test]
    fn test_single_node_is_rejected() {
        assert!(declare(1, true).is_err());
    }
}
