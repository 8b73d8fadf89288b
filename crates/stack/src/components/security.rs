//! Security groups.
//!
//! Groups start closed for ingress. Each allowed flow becomes its own
//! ingress resource naming exactly one source: another group or a CIDR.

use tracing::debug;

use super::tags;
use crate::error::Result;
use crate::intrinsic::Expr;
use crate::resource::{ResourceRef, ResourceType};
use crate::stack::Stack;

/// Any IPv4 address.
pub const ANY_IPV4_CIDR: &str = "0.0.0.0/0";

/// Source of an ingress rule.
#[derive(Debug, Clone)]
pub enum Peer {
    /// Every IPv4 address.
    AnyIpv4,
    /// Members of another security group.
    Group(ResourceRef),
}

impl Peer {
    fn label(&self) -> &str {
        match self {
            Self::AnyIpv4 => "any-ipv4",
            Self::Group(group) => group.id(),
        }
    }
}

/// A declared security group.
#[derive(Debug, Clone)]
pub struct SecurityGroup {
    name: String,
    handle: ResourceRef,
}

impl SecurityGroup {
    /// Declare a group in `vpc` that allows all outbound traffic.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already taken.
    pub fn declare(
        stack: &mut Stack,
        name: &str,
        description: &str,
        vpc: &ResourceRef,
    ) -> Result<Self> {
        let handle = stack.add_resource(
            name,
            ResourceType::SecurityGroup,
            Expr::object([
                ("GroupDescription", Expr::from(description)),
                ("VpcId", vpc.reference()),
                (
                    "SecurityGroupEgress",
                    Expr::list([Expr::object([
                        ("CidrIp", Expr::from(ANY_IPV4_CIDR)),
                        ("IpProtocol", "-1".into()),
                        ("Description", "Allow all outbound traffic by default".into()),
                    ])]),
                ),
                ("Tags", tags([("Name", Expr::from(name))])),
            ]),
        )?;
        Ok(Self {
            name: name.to_string(),
            handle,
        })
    }

    /// Allow TCP `port` from `peer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the same rule was already declared.
    pub fn allow_from(
        &self,
        stack: &mut Stack,
        peer: &Peer,
        port: u16,
        description: &str,
    ) -> Result<ResourceRef> {
        let mut properties = Expr::object([
            ("GroupId", self.group_id()),
            ("IpProtocol", Expr::from("tcp")),
            ("FromPort", port.into()),
            ("ToPort", port.into()),
            ("Description", description.into()),
        ]);
        match peer {
            Peer::AnyIpv4 => properties.insert("CidrIp", ANY_IPV4_CIDR.into()),
            Peer::Group(group) => properties.insert("SourceSecurityGroupId", group.attr("GroupId")),
        };

        let rule_name = format!("{}-from-{}-{port}", self.name, peer.label());
        debug!(group = %self.handle.id(), peer = %peer.label(), port, "Allowing ingress");
        stack.add_resource(&rule_name, ResourceType::SecurityGroupIngress, properties)
    }

    /// Handle of the group resource.
    #[must_use]
    pub fn handle(&self) -> &ResourceRef {
        &self.handle
    }

    /// `Fn::GetAtt GroupId` of the group.
    #[must_use]
    pub fn group_id(&self) -> Expr {
        self.handle.attr("GroupId")
    }

    /// This group as an ingress source for another group.
    #[must_use]
    pub fn as_peer(&self) -> Peer {
        Peer::Group(self.handle.clone())
    }
}
