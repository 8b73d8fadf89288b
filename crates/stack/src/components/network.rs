//! Network boundary: VPC, subnets, gateways and routing.
//!
//! The address range is split into four equal subnets: public subnets take
//! the first slots, private subnets the next ones. Private subnets send
//! default traffic through a NAT gateway, public subnets through the
//! internet gateway.

use ipnet::Ipv4Net;
use tracing::info;

use super::tags;
use crate::error::{Result, StackError};
use crate::intrinsic::Expr;
use crate::resource::{ResourceRef, ResourceType};
use crate::stack::Stack;

/// Number of availability zones the network spans.
pub const AVAILABILITY_ZONES: u32 = 2;

/// Tag carrying the subnet kind.
pub const SUBNET_KIND_TAG: &str = "SubnetType";

/// Destination of a default route.
const ANY_IPV4: &str = "0.0.0.0/0";

/// Public or private placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetKind {
    Public,
    Private,
}

impl SubnetKind {
    /// Tag value for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Private => "Private",
        }
    }
}

/// Network props.
#[derive(Debug, Clone)]
pub struct NetworkProps {
    /// Base name of every network resource.
    pub name: String,
    /// VPC address range.
    pub cidr: Ipv4Net,
    /// NAT gateways to create, 1 up to one per zone.
    pub nat_gateways: u32,
}

/// Declared network.
#[derive(Debug, Clone)]
pub struct Network {
    pub vpc: ResourceRef,
    pub internet_gateway: ResourceRef,
    /// One per zone, in zone order.
    pub public_subnets: Vec<ResourceRef>,
    /// One per zone, in zone order.
    pub private_subnets: Vec<ResourceRef>,
    pub nat_gateways: Vec<ResourceRef>,
    /// One per private subnet.
    pub private_route_tables: Vec<ResourceRef>,
    /// Internet gateway routes, ordered after the gateway attachment.
    pub public_default_routes: Vec<ResourceRef>,
    /// NAT routes, one per private subnet.
    pub private_default_routes: Vec<ResourceRef>,
}

impl Network {
    /// Declare the network.
    ///
    /// # Errors
    ///
    /// Returns an error if the range cannot hold the subnets or the NAT count
    /// is out of range.
    pub fn declare(stack: &mut Stack, props: &NetworkProps) -> Result<Self> {
        if props.nat_gateways == 0 || props.nat_gateways > AVAILABILITY_ZONES {
            return Err(StackError::invalid(
                "nat_gateways",
                format!("must be between 1 and {AVAILABILITY_ZONES}"),
            ));
        }
        let blocks = carve_subnets(props.cidr, AVAILABILITY_ZONES * 2)?;
        let name = props.name.as_str();

        let vpc = stack.add_resource(
            name,
            ResourceType::Vpc,
            Expr::object([
                ("CidrBlock", Expr::from(props.cidr.to_string())),
                ("EnableDnsHostnames", true.into()),
                ("EnableDnsSupport", true.into()),
                ("InstanceTenancy", "default".into()),
                ("Tags", tags([("Name", Expr::from(name))])),
            ]),
        )?;

        let internet_gateway = stack.add_resource(
            &format!("{name}-igw"),
            ResourceType::InternetGateway,
            Expr::object([("Tags", tags([("Name", Expr::from(name))]))]),
        )?;
        let attachment = stack.add_resource(
            &format!("{name}-vpc-gw"),
            ResourceType::VpcGatewayAttachment,
            Expr::object([
                ("VpcId", vpc.reference()),
                ("InternetGatewayId", internet_gateway.reference()),
            ]),
        )?;

        let mut public_subnets = Vec::new();
        let mut public_default_routes = Vec::new();
        let mut nat_gateways = Vec::new();
        for zone in 0..AVAILABILITY_ZONES {
            let subnet_name = format!("{name}-public-subnet-{}", zone + 1);
            let subnet = declare_subnet(stack, &subnet_name, &vpc, blocks[zone as usize], zone, SubnetKind::Public)?;
            let table = route_table(stack, &subnet_name, &vpc, &subnet)?;
            let route = stack.add_resource(
                &format!("{subnet_name}-default-route"),
                ResourceType::Route,
                Expr::object([
                    ("RouteTableId", table.reference()),
                    ("DestinationCidrBlock", ANY_IPV4.into()),
                    ("GatewayId", internet_gateway.reference()),
                ]),
            )?;
            stack.add_dependency(&route, &attachment)?;

            if zone < props.nat_gateways {
                let eip = stack.add_resource(
                    &format!("{subnet_name}-eip"),
                    ResourceType::Eip,
                    Expr::object([("Domain", "vpc".into())]),
                )?;
                let nat = stack.add_resource(
                    &format!("{subnet_name}-nat-gateway"),
                    ResourceType::NatGateway,
                    Expr::object([
                        ("SubnetId", subnet.reference()),
                        ("AllocationId", eip.attr("AllocationId")),
                        ("Tags", tags([("Name", Expr::from(subnet_name.as_str()))])),
                    ]),
                )?;
                stack.add_dependency(&nat, &route)?;
                nat_gateways.push(nat);
            }
            public_subnets.push(subnet);
            public_default_routes.push(route);
        }

        let mut private_subnets = Vec::new();
        let mut private_route_tables = Vec::new();
        let mut private_default_routes = Vec::new();
        for zone in 0..AVAILABILITY_ZONES {
            let subnet_name = format!("{name}-private-subnet-{}", zone + 1);
            let block = blocks[(AVAILABILITY_ZONES + zone) as usize];
            let subnet = declare_subnet(stack, &subnet_name, &vpc, block, zone, SubnetKind::Private)?;
            let table = route_table(stack, &subnet_name, &vpc, &subnet)?;
            let nat = &nat_gateways[(zone as usize).min(nat_gateways.len() - 1)];
            let route = stack.add_resource(
                &format!("{subnet_name}-default-route"),
                ResourceType::Route,
                Expr::object([
                    ("RouteTableId", table.reference()),
                    ("DestinationCidrBlock", ANY_IPV4.into()),
                    ("NatGatewayId", nat.reference()),
                ]),
            )?;
            private_subnets.push(subnet);
            private_route_tables.push(table);
            private_default_routes.push(route);
        }

        info!(
            vpc = %vpc.id(),
            cidr = %props.cidr,
            zones = AVAILABILITY_ZONES,
            nat_gateways = nat_gateways.len(),
            "Declared network"
        );

        Ok(Self {
            vpc,
            internet_gateway,
            public_subnets,
            private_subnets,
            nat_gateways,
            private_route_tables,
            public_default_routes,
            private_default_routes,
        })
    }

    /// Order `dependent` after internet access is routable in public subnets.
    ///
    /// # Errors
    ///
    /// Returns an error if `dependent` is not declared in `stack`.
    pub fn require_public_internet(
        &self,
        stack: &mut Stack,
        dependent: &ResourceRef,
    ) -> Result<()> {
        for route in &self.public_default_routes {
            stack.add_dependency(dependent, route)?;
        }
        Ok(())
    }

    /// Order `dependent` after private subnets can reach out through NAT.
    ///
    /// # Errors
    ///
    /// Returns an error if `dependent` is not declared in `stack`.
    pub fn require_private_egress(
        &self,
        stack: &mut Stack,
        dependent: &ResourceRef,
    ) -> Result<()> {
        for route in &self.private_default_routes {
            stack.add_dependency(dependent, route)?;
        }
        Ok(())
    }

    /// `Ref`s of the subnets of one kind.
    #[must_use]
    pub fn subnet_ids(&self, kind: SubnetKind) -> Expr {
        let subnets = match kind {
            SubnetKind::Public => &self.public_subnets,
            SubnetKind::Private => &self.private_subnets,
        };
        Expr::List(subnets.iter().map(ResourceRef::reference).collect())
    }
}

/// Split `cidr` into `count` equal blocks (`count` must be a power of two).
fn carve_subnets(cidr: Ipv4Net, count: u32) -> Result<Vec<Ipv4Net>> {
    let extra_bits = u8::try_from(count.trailing_zeros()).unwrap_or(u8::MAX);
    let blocks: Vec<Ipv4Net> = cidr
        .prefix_len()
        .checked_add(extra_bits)
        .and_then(|prefix| cidr.subnets(prefix).ok())
        .map(|subnets| subnets.collect())
        .unwrap_or_default();
    if blocks.len() < count as usize {
        return Err(StackError::invalid(
            "network.cidr",
            format!("{cidr} cannot be split into {count} subnets"),
        ));
    }
    Ok(blocks)
}

fn declare_subnet(
    stack: &mut Stack,
    name: &str,
    vpc: &ResourceRef,
    block: Ipv4Net,
    zone: u32,
    kind: SubnetKind,
) -> Result<ResourceRef> {
    stack.add_resource(
        name,
        ResourceType::Subnet,
        Expr::object([
            ("VpcId", vpc.reference()),
            ("CidrBlock", Expr::from(block.to_string())),
            ("AvailabilityZone", Expr::availability_zone(zone)),
            ("MapPublicIpOnLaunch", (kind == SubnetKind::Public).into()),
            (
                "Tags",
                tags([
                    ("Name", Expr::from(name)),
                    (SUBNET_KIND_TAG, Expr::from(kind.as_str())),
                ]),
            ),
        ]),
    )
}

fn route_table(
    stack: &mut Stack,
    subnet_name: &str,
    vpc: &ResourceRef,
    subnet: &ResourceRef,
) -> Result<ResourceRef> {
    let table = stack.add_resource(
        &format!("{subnet_name}-route-table"),
        ResourceType::RouteTable,
        Expr::object([
            ("VpcId", vpc.reference()),
            ("Tags", tags([("Name", Expr::from(subnet_name))])),
        ]),
    )?;
    stack.add_resource(
        &format!("{subnet_name}-route-table-association"),
        ResourceType::SubnetRouteTableAssociation,
        Expr::object([
            ("RouteTableId", table.reference()),
            ("SubnetId", subnet.reference()),
        ]),
    )?;
    Ok(table)
}
