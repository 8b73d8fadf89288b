//! Structural checks over a declared topology.
//!
//! Every check inspects the synthesized resource graph, not the config that
//! produced it, so a regression in a component shows up here even when the
//! configuration is fine.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::components::network::{AVAILABILITY_ZONES, SUBNET_KIND_TAG};
use crate::components::security::ANY_IPV4_CIDR;
use crate::components::{tag_value, SubnetKind};
use crate::config::{StackConfig, FLEET_CAPACITY_LIMIT, ON_DEMAND_PERCENTAGE_ABOVE_BASE};
use crate::graph::DependencyGraph;
use crate::intrinsic::Expr;
use crate::resource::{Resource, ResourceType};
use crate::stack::Stack;
use crate::topology::{Topology, CACHE_CLUSTERS};

/// Outcome of one check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "✅ PASS"),
            Self::Fail => write!(f, "❌ FAIL"),
        }
    }
}

/// A single check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub details: String,
}

/// All check results for one stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub stack: String,
    pub checks: Vec<CheckResult>,
}

impl CheckReport {
    /// Check if every check passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.status == CheckStatus::Pass)
    }

    /// Get the total number of checks.
    #[must_use]
    pub fn total_checks(&self) -> usize {
        self.checks.len()
    }

    /// Get the number of passed checks.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Pass)
            .count()
    }

    /// Get the number of failed checks.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.total_checks() - self.passed_count()
    }

    /// Look up a check by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }
}

type Outcome = std::result::Result<String, String>;

/// Run every check against `topology`.
#[must_use]
pub fn run(topology: &Topology, config: &StackConfig) -> CheckReport {
    let stack = &topology.stack;
    let graph = stack.graph();

    let mut checks = vec![record(
        "graph_resolves",
        graph
            .as_ref()
            .map(|g| format!("{} resources, {} edges", g.len(), g.edge_count()))
            .map_err(ToString::to_string),
    )];

    checks.push(record("availability_zones", availability_zones(stack)));
    checks.push(record("fleet_capacity", fleet_capacity(topology)));
    checks.push(record("on_demand_share", on_demand_share(topology)));
    checks.push(record("database_storage", database_storage(topology, config)));
    checks.push(record("credentials_indirect", credentials_indirect(topology)));
    checks.push(record(
        "cache_replication",
        cache_replication(topology, graph.as_ref().ok()),
    ));
    checks.push(record("load_balancer_listener", load_balancer_listener(topology)));
    checks.push(record("cdn_origin", cdn_origin(stack)));
    checks.push(record("default_deny", default_deny(topology)));
    checks.push(record("private_egress_via_nat", egress_routes(stack)));
    checks.push(record("outputs", outputs(stack)));

    let report = CheckReport {
        stack: stack.name().to_string(),
        checks,
    };
    debug!(
        passed = report.passed_count(),
        total = report.total_checks(),
        "Ran topology checks"
    );
    report
}

fn record(name: &str, outcome: Outcome) -> CheckResult {
    let (status, details) = match outcome {
        Ok(details) => (CheckStatus::Pass, details),
        Err(details) => (CheckStatus::Fail, details),
    };
    CheckResult {
        name: name.to_string(),
        status,
        details,
    }
}

fn int_property(resource: &Resource, key: &str) -> Option<i64> {
    resource.property(key).and_then(Expr::as_i64)
}

fn subnet_kind(subnet: &Resource) -> Option<SubnetKind> {
    match tag_value(&subnet.properties, SUBNET_KIND_TAG)?.as_str()? {
        "Public" => Some(SubnetKind::Public),
        "Private" => Some(SubnetKind::Private),
        _ => None,
    }
}

fn availability_zones(stack: &Stack) -> Outcome {
    let mut public = Vec::new();
    let mut private = Vec::new();
    for subnet in stack.resources_of(ResourceType::Subnet) {
        let zone = match subnet.property("AvailabilityZone") {
            Some(Expr::Select { index, .. }) => *index,
            _ => return Err(format!("{} has no zone selection", subnet.logical_id)),
        };
        match subnet_kind(subnet) {
            Some(SubnetKind::Public) => public.push(zone),
            Some(SubnetKind::Private) => private.push(zone),
            None => return Err(format!("{} has no subnet kind tag", subnet.logical_id)),
        }
    }
    public.sort_unstable();
    private.sort_unstable();
    let expected: Vec<u32> = (0..AVAILABILITY_ZONES).collect();
    if public == expected && private == expected {
        Ok(format!("{AVAILABILITY_ZONES} zones, one public and one private subnet each"))
    } else {
        Err(format!("public subnets in zones {public:?}, private in {private:?}"))
    }
}

fn fleet_capacity(topology: &Topology) -> Outcome {
    let asg = topology
        .stack
        .resource(topology.fleet.handle.id())
        .ok_or("autoscaling group missing")?;
    let min = int_property(asg, "MinSize").ok_or("MinSize missing")?;
    let max = int_property(asg, "MaxSize").ok_or("MaxSize missing")?;
    if 1 <= min && min <= max && max <= i64::from(FLEET_CAPACITY_LIMIT) {
        Ok(format!("capacity [{min}, {max}]"))
    } else {
        Err(format!("capacity [{min}, {max}] outside 1..={FLEET_CAPACITY_LIMIT}"))
    }
}

fn on_demand_share(topology: &Topology) -> Outcome {
    let asg = topology
        .stack
        .resource(topology.fleet.handle.id())
        .ok_or("autoscaling group missing")?;
    let share = asg
        .properties
        .path(&[
            "MixedInstancesPolicy",
            "InstancesDistribution",
            "OnDemandPercentageAboveBaseCapacity",
        ])
        .and_then(Expr::as_i64)
        .ok_or("on-demand share missing")?;
    if share == i64::from(ON_DEMAND_PERCENTAGE_ABOVE_BASE) {
        Ok(format!("{share}% on-demand above base, rest spot"))
    } else {
        Err(format!("declared {share}%, expected {ON_DEMAND_PERCENTAGE_ABOVE_BASE}%"))
    }
}

fn database_storage(topology: &Topology, config: &StackConfig) -> Outcome {
    let db = topology
        .stack
        .resource(topology.database.instance.id())
        .ok_or("database instance missing")?;
    let allocated = int_property(db, "AllocatedStorage").ok_or("AllocatedStorage missing")?;
    let max = int_property(db, "MaxAllocatedStorage").ok_or("MaxAllocatedStorage missing")?;
    let multi_az = db.property("MultiAZ").and_then(Expr::as_bool).unwrap_or(false);
    if allocated >= max {
        return Err(format!("initial storage {allocated} GiB is not below maximum {max} GiB"));
    }
    if multi_az != config.multi_az {
        return Err(format!(
            "multi-zone is {multi_az}, redundancy flag is {}",
            config.multi_az
        ));
    }
    Ok(format!("{allocated} -> {max} GiB, multi-zone {multi_az}"))
}

fn credentials_indirect(topology: &Topology) -> Outcome {
    let stack = &topology.stack;
    let db = stack
        .resource(topology.database.instance.id())
        .ok_or("database instance missing")?;
    for key in ["MasterUsername", "MasterUserPassword"] {
        let value = db.property(key).ok_or_else(|| format!("{key} missing"))?;
        let from_secret = value.references().iter().any(|id| {
            stack
                .resource(id)
                .is_some_and(|r| r.kind == ResourceType::Secret)
        });
        if value.is_literal() || !from_secret {
            return Err(format!("{key} is not resolved from a secret"));
        }
    }
    Ok("username and password resolved from the generated secret".into())
}

fn cache_replication(topology: &Topology, graph: Option<&DependencyGraph>) -> Outcome {
    let group = topology
        .stack
        .resource(topology.cache.replication_group.id())
        .ok_or("replication group missing")?;
    let nodes = int_property(group, "NumCacheClusters").ok_or("NumCacheClusters missing")?;
    if nodes != i64::from(CACHE_CLUSTERS) {
        return Err(format!("{nodes} nodes declared, expected {CACHE_CLUSTERS}"));
    }
    let graph = graph.ok_or("dependency graph did not resolve")?;
    if !graph.depends_on(group.logical_id.as_str(), topology.cache.subnet_group.id()) {
        return Err("replication group does not depend on its subnet group".into());
    }
    Ok(format!("{nodes} nodes, ordered after the subnet group"))
}

fn load_balancer_listener(topology: &Topology) -> Outcome {
    let stack = &topology.stack;
    let alb = stack
        .resource(topology.load_balancer.handle.id())
        .ok_or("load balancer missing")?;
    if alb.property("Scheme").and_then(Expr::as_str) != Some("internet-facing") {
        return Err("load balancer is not internet-facing".into());
    }
    let listener = stack
        .resource(topology.load_balancer.listener.id())
        .ok_or("listener missing")?;
    match int_property(listener, "Port") {
        Some(80) => Ok("internet-facing, HTTP listener on port 80".into()),
        other => Err(format!("listener port is {other:?}")),
    }
}

fn cdn_origin(stack: &Stack) -> Outcome {
    let distributions: Vec<&Resource> = stack.resources_of(ResourceType::Distribution).collect();
    let [distribution] = distributions.as_slice() else {
        return Err(format!("{} distributions declared", distributions.len()));
    };
    let origins = distribution
        .properties
        .path(&["DistributionConfig", "Origins"])
        .and_then(Expr::as_list)
        .ok_or("distribution has no origins")?;
    for origin in origins {
        let domain = origin.get("DomainName").ok_or("origin has no domain")?;
        let target = domain
            .references()
            .into_iter()
            .find_map(|id| stack.resource(id))
            .ok_or("origin does not point at a declared resource")?;
        if target.kind != ResourceType::LoadBalancer {
            return Err(format!("origin points at {} ({})", target.logical_id, target.kind));
        }
    }
    Ok("origin is the load balancer declared in this stack".into())
}

fn default_deny(topology: &Topology) -> Outcome {
    let stack = &topology.stack;
    if let Some(group) = stack
        .resources_of(ResourceType::SecurityGroup)
        .find(|g| g.property("SecurityGroupIngress").is_some())
    {
        return Err(format!("{} declares inline ingress", group.logical_id));
    }

    let open_groups = [
        topology.load_balancer.security_group.group_id(),
        topology.staging_security_group.group_id(),
    ];
    let mut rules = 0;
    for rule in stack.resources_of(ResourceType::SecurityGroupIngress) {
        rules += 1;
        let cidr = rule.property("CidrIp");
        let source = rule.property("SourceSecurityGroupId");
        match (cidr, source) {
            (Some(_), None) => {
                let group = rule.property("GroupId");
                if !open_groups.iter().any(|g| Some(g) == group) {
                    return Err(format!("{} admits a CIDR on a private group", rule.logical_id));
                }
                if cidr.and_then(Expr::as_str) == Some(ANY_IPV4_CIDR)
                    && int_property(rule, "FromPort") != Some(80)
                {
                    return Err(format!("{} opens a non-HTTP port to the world", rule.logical_id));
                }
            }
            (None, Some(_)) => {}
            _ => return Err(format!("{} must name exactly one source", rule.logical_id)),
        }
    }
    Ok(format!("{rules} ingress rules, each naming one source"))
}

fn egress_routes(stack: &Stack) -> Outcome {
    let mut checked = 0;
    for subnet in stack.resources_of(ResourceType::Subnet) {
        let kind = subnet_kind(subnet)
            .ok_or_else(|| format!("{} has no subnet kind tag", subnet.logical_id))?;
        let subnet_ref = Expr::reference(&subnet.logical_id);
        let table = stack
            .resources_of(ResourceType::SubnetRouteTableAssociation)
            .find(|a| a.property("SubnetId") == Some(&subnet_ref))
            .and_then(|a| a.property("RouteTableId"))
            .ok_or_else(|| format!("{} has no route table", subnet.logical_id))?;
        let route = stack
            .resources_of(ResourceType::Route)
            .find(|r| {
                r.property("RouteTableId") == Some(table)
                    && r.property("DestinationCidrBlock").and_then(Expr::as_str) == Some(ANY_IPV4_CIDR)
            })
            .ok_or_else(|| format!("{} has no default route", subnet.logical_id))?;

        let (key, expected) = match kind {
            SubnetKind::Private => ("NatGatewayId", ResourceType::NatGateway),
            SubnetKind::Public => ("GatewayId", ResourceType::InternetGateway),
        };
        let target = route
            .property(key)
            .map(Expr::references)
            .and_then(|ids| ids.first().and_then(|id| stack.resource(id)))
            .ok_or_else(|| format!("{} default route has no {key}", subnet.logical_id))?;
        if target.kind != expected {
            return Err(format!("{} routes through {}", subnet.logical_id, target.kind));
        }
        checked += 1;
    }
    Ok(format!("{checked} subnets route egress correctly"))
}

fn outputs(stack: &Stack) -> Outcome {
    let missing: Vec<String> = Topology::output_ids()
        .into_iter()
        .filter(|id| {
            stack
                .outputs()
                .get(id)
                .is_none_or(|output| output.value.is_empty_literal())
        })
        .collect();
    if missing.is_empty() {
        Ok(format!("{} outputs declared", stack.outputs().len()))
    } else {
        Err(format!("missing or empty: {}", missing.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::build;

    #[test]
    fn test_reference_topology_passes() {
        let config = StackConfig::with_inputs("k1", true);
        let topology = build(&config).unwrap();
        let report = run(&topology, &config);
        for check in &report.checks {
            assert_eq!(check.status, CheckStatus::Pass, "{}: {}", check.name, check.details);
        }
        assert!(report.all_passed());
        assert_eq!(report.failed_count(), 0);
        assert_eq!(report.passed_count(), report.total_checks());
    }

    #[test]
    fn test_single_zone_topology_passes() {
        let config = StackConfig::with_inputs("k1", false);
        let topology = build(&config).unwrap();
        assert!(run(&topology, &config).all_passed());
    }

    #[test]
    fn test_detects_world_open_database() {
        let config = StackConfig::with_inputs("k1", true);
        let mut topology = build(&config).unwrap();
        topology
            .database
            .security_group
            .allow_from(&mut topology.stack, &crate::components::Peer::AnyIpv4, 3306, "oops")
            .unwrap();
        let report = run(&topology, &config);
        assert_eq!(report.get("default_deny").unwrap().status, CheckStatus::Fail);
        assert_eq!(report.failed_count(), 1);
    }

    #[test]
    fn test_detects_redundancy_mismatch() {
        let topology = build(&StackConfig::with_inputs("k1", false)).unwrap();
        let report = run(&topology, &StackConfig::with_inputs("k1", true));
        assert_eq!(report.get("database_storage").unwrap().status, CheckStatus::Fail);
    }

    #[test]
    fn test_detects_wrong_on_demand_share() {
        let mut config = StackConfig::with_inputs("k1", true);
        config.fleet.on_demand_percentage_above_base = 50;
        let topology = build(&config).unwrap();
        let report = run(&topology, &config);
        let check = report.get("on_demand_share").unwrap();
        assert_eq!(check.status, CheckStatus::Fail);
        assert!(check.details.contains("50%"));
        assert!(!report.all_passed());
    }

    #[test]
    fn test_report_serializes() {
        let config = StackConfig::default();
        let topology = build(&config).unwrap();
        let json = serde_json::to_value(run(&topology, &config)).unwrap();
        assert_eq!(json["stack"], "scalable-moodle-stack");
        assert_eq!(json["checks"][0]["status"], "Pass");
    }
}
