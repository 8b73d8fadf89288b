//! Resource descriptors.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::intrinsic::Expr;

/// Every resource type the stack declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceType {
    Vpc,
    InternetGateway,
    VpcGatewayAttachment,
    Subnet,
    RouteTable,
    Route,
    SubnetRouteTableAssociation,
    Eip,
    NatGateway,
    SecurityGroup,
    SecurityGroupIngress,
    Instance,
    LaunchTemplate,
    AutoScalingGroup,
    ScalingPolicy,
    Secret,
    SecretTargetAttachment,
    DbSubnetGroup,
    DbInstance,
    FileSystem,
    MountTarget,
    CacheSubnetGroup,
    ReplicationGroup,
    LoadBalancer,
    Listener,
    TargetGroup,
    Distribution,
}

impl ResourceType {
    /// Platform type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vpc => "AWS::EC2::VPC",
            Self::InternetGateway => "AWS::EC2::InternetGateway",
            Self::VpcGatewayAttachment => "AWS::EC2::VPCGatewayAttachment",
            Self::Subnet => "AWS::EC2::Subnet",
            Self::RouteTable => "AWS::EC2::RouteTable",
            Self::Route => "AWS::EC2::Route",
            Self::SubnetRouteTableAssociation => "AWS::EC2::SubnetRouteTableAssociation",
            Self::Eip => "AWS::EC2::EIP",
            Self::NatGateway => "AWS::EC2::NatGateway",
            Self::SecurityGroup => "AWS::EC2::SecurityGroup",
            Self::SecurityGroupIngress => "AWS::EC2::SecurityGroupIngress",
            Self::Instance => "AWS::EC2::Instance",
            Self::LaunchTemplate => "AWS::EC2::LaunchTemplate",
            Self::AutoScalingGroup => "AWS::AutoScaling::AutoScalingGroup",
            Self::ScalingPolicy => "AWS::AutoScaling::ScalingPolicy",
            Self::Secret => "AWS::SecretsManager::Secret",
            Self::SecretTargetAttachment => "AWS::SecretsManager::SecretTargetAttachment",
            Self::DbSubnetGroup => "AWS::RDS::DBSubnetGroup",
            Self::DbInstance => "AWS::RDS::DBInstance",
            Self::FileSystem => "AWS::EFS::FileSystem",
            Self::MountTarget => "AWS::EFS::MountTarget",
            Self::CacheSubnetGroup => "AWS::ElastiCache::SubnetGroup",
            Self::ReplicationGroup => "AWS::ElastiCache::ReplicationGroup",
            Self::LoadBalancer => "AWS::ElasticLoadBalancingV2::LoadBalancer",
            Self::Listener => "AWS::ElasticLoadBalancingV2::Listener",
            Self::TargetGroup => "AWS::ElasticLoadBalancingV2::TargetGroup",
            Self::Distribution => "AWS::CloudFront::Distribution",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to a resource's data when it leaves the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
    Snapshot,
}

/// One declared resource.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Logical ID inside the template.
    pub logical_id: String,
    /// Platform resource type.
    pub kind: ResourceType,
    /// Property map.
    pub properties: Expr,
    /// Explicit ordering edges, in addition to the ones implied by references.
    pub depends_on: BTreeSet<String>,
    /// Deletion policy, platform default when unset.
    pub deletion_policy: Option<DeletionPolicy>,
    /// Policy applied when an update forces replacement.
    pub update_replace_policy: Option<DeletionPolicy>,
}

impl Resource {
    /// Create a resource with no explicit dependencies or policies.
    #[must_use]
    pub fn new(logical_id: impl Into<String>, kind: ResourceType, properties: Expr) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind,
            properties,
            depends_on: BTreeSet::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    /// Apply the same policy on deletion and on replacement.
    #[must_use]
    pub fn with_removal_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    /// Shortcut for a top-level property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Expr> {
        self.properties.get(key)
    }

    /// Every logical ID this resource needs to exist first.
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<&str> {
        let mut deps: BTreeSet<&str> = self.properties.references().into_iter().collect();
        deps.extend(self.depends_on.iter().map(String::as_str));
        deps
    }

    /// Render the template entry for this resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the properties fail to serialize.
    pub fn to_template_value(&self) -> crate::error::Result<serde_json::Value> {
        let mut entry = serde_json::Map::new();
        entry.insert("Type".into(), self.kind.as_str().into());
        if !self.properties.is_empty_literal() {
            entry.insert("Properties".into(), serde_json::to_value(&self.properties)?);
        }
        if !self.depends_on.is_empty() {
            entry.insert(
                "DependsOn".into(),
                self.depends_on.iter().cloned().collect::<Vec<_>>().into(),
            );
        }
        if let Some(policy) = self.deletion_policy {
            entry.insert("DeletionPolicy".into(), format!("{policy:?}").into());
        }
        if let Some(policy) = self.update_replace_policy {
            entry.insert("UpdateReplacePolicy".into(), format!("{policy:?}").into());
        }
        Ok(serde_json::Value::Object(entry))
    }
}

/// Handle to a declared resource.
///
/// Handles are only produced by [`crate::Stack::add_resource`], so holding one
/// means the logical ID exists in that stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    logical_id: String,
    kind: ResourceType,
}

impl ResourceRef {
    pub(crate) fn new(logical_id: String, kind: ResourceType) -> Self {
        Self { logical_id, kind }
    }

    /// Logical ID of the resource.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.logical_id
    }

    /// Type of the resource.
    #[must_use]
    pub fn kind(&self) -> ResourceType {
        self.kind
    }

    /// `Ref` to the resource.
    #[must_use]
    pub fn reference(&self) -> Expr {
        Expr::reference(&self.logical_id)
    }

    /// `Fn::GetAtt` on the resource.
    #[must_use]
    pub fn attr(&self, attribute: &str) -> Expr {
        Expr::get_att(&self.logical_id, attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_value_includes_policies_and_depends_on() {
        let mut resource = Resource::new(
            "MoodleEfs",
            ResourceType::FileSystem,
            Expr::object([("Encrypted", Expr::Bool(true))]),
        )
        .with_removal_policy(DeletionPolicy::Delete);
        resource.depends_on.insert("MoodleVpc".into());

        assert_eq!(
            resource.to_template_value().unwrap(),
            json!({
                "Type": "AWS::EFS::FileSystem",
                "Properties": { "Encrypted": true },
                "DependsOn": ["MoodleVpc"],
                "DeletionPolicy": "Delete",
                "UpdateReplacePolicy": "Delete"
            })
        );
    }

    #[test]
    fn test_dependencies_merge_references_and_explicit_edges() {
        let mut resource = Resource::new(
            "MoodleRedis",
            ResourceType::ReplicationGroup,
            Expr::object([(
                "SecurityGroupIds",
                Expr::list([Expr::get_att("MoodleRedisSg", "GroupId")]),
            )]),
        );
        resource.depends_on.insert("RedisSubnetGroup".into());

        let deps: Vec<&str> = resource.dependencies().into_iter().collect();
        assert_eq!(deps, vec!["MoodleRedisSg", "RedisSubnetGroup"]);
    }

    #[test]
    fn test_empty_properties_are_omitted() {
        let resource = Resource::new(
            "MoodleVpcIgw",
            ResourceType::InternetGateway,
            Expr::empty_object(),
        );
        assert_eq!(
            resource.to_template_value().unwrap(),
            json!({ "Type": "AWS::EC2::InternetGateway" })
        );
    }

    #[test]
    fn test_intrinsic_properties_render_without_loss() {
        let resource = Resource::new(
            "MoodleVpcIgwAttachment",
            ResourceType::VpcGatewayAttachment,
            Expr::object([
                ("VpcId", Expr::reference("MoodleVpc")),
                ("InternetGatewayId", Expr::reference("MoodleVpcIgw")),
            ]),
        );
        let value = resource.to_template_value().unwrap();
        assert_eq!(value["Properties"]["VpcId"], json!({ "Ref": "MoodleVpc" }));
        assert_ne!(value["Properties"], serde_json::Value::Null);
    }
}
