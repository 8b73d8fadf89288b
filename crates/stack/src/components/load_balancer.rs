//! Internet-facing application load balancer in front of the fleet.
//!
//! The balancer owns its security group, open to the world on the listener
//! port. Instances are registered through the target group, which the
//! autoscaling group joins.

use tracing::info;

use super::security::{Peer, SecurityGroup};
use crate::error::{Result, StackError};
use crate::intrinsic::Expr;
use crate::resource::{ResourceRef, ResourceType};
use crate::stack::Stack;

/// Plain HTTP.
pub const HTTP_PORT: u16 = 80;

/// Longest name the platform accepts for a balancer.
pub const MAX_NAME_LEN: usize = 32;

/// Load balancer props.
#[derive(Debug, Clone)]
pub struct LoadBalancerProps {
    /// Physical balancer name.
    pub name: String,
    pub vpc: ResourceRef,
    /// Public subnets the balancer spans.
    pub subnets: Expr,
    pub health_check_timeout_secs: u32,
    pub health_check_interval_secs: u32,
}

/// Declared balancer, listener and target group.
#[derive(Debug, Clone)]
pub struct LoadBalancer {
    pub handle: ResourceRef,
    pub listener: ResourceRef,
    pub target_group: ResourceRef,
    pub security_group: SecurityGroup,
}

impl LoadBalancer {
    /// Declare the balancer with an HTTP listener forwarding to a new target group.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid name or health check timing.
    pub fn declare(stack: &mut Stack, props: &LoadBalancerProps) -> Result<Self> {
        let name = props.name.as_str();
        if name.is_empty()
            || name.len() > MAX_NAME_LEN
            || name.starts_with('-')
            || name.ends_with('-')
            || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(StackError::invalid(
                "load_balancer.name",
                format!("`{name}` is not a valid balancer name"),
            ));
        }
        if props.health_check_timeout_secs == 0
            || props.health_check_timeout_secs >= props.health_check_interval_secs
        {
            return Err(StackError::invalid(
                "health_check_timeout_secs",
                "must be positive and shorter than the interval",
            ));
        }

        let security_group = SecurityGroup::declare(
            stack,
            &format!("{name}-sg"),
            &format!("Security group for {name}"),
            &props.vpc,
        )?;
        security_group.allow_from(stack, &Peer::AnyIpv4, HTTP_PORT, "Allow HTTP from anywhere")?;

        let handle = stack.add_resource(
            name,
            ResourceType::LoadBalancer,
            Expr::object([
                ("Name", Expr::from(name)),
                ("Type", "application".into()),
                ("Scheme", "internet-facing".into()),
                ("IpAddressType", "ipv4".into()),
                ("Subnets", props.subnets.clone()),
                ("SecurityGroups", Expr::list([security_group.group_id()])),
            ]),
        )?;

        let target_group = stack.add_resource(
            &format!("{name}-target-group"),
            ResourceType::TargetGroup,
            Expr::object([
                ("Port", Expr::from(HTTP_PORT)),
                ("Protocol", "HTTP".into()),
                ("TargetType", "instance".into()),
                ("VpcId", props.vpc.reference()),
                ("HealthCheckEnabled", true.into()),
                ("HealthCheckPath", "/".into()),
                ("HealthCheckTimeoutSeconds", props.health_check_timeout_secs.into()),
                (
                    "HealthCheckIntervalSeconds",
                    props.health_check_interval_secs.into(),
                ),
            ]),
        )?;

        let listener = stack.add_resource(
            &format!("{name}-http-listener"),
            ResourceType::Listener,
            Expr::object([
                ("LoadBalancerArn", handle.reference()),
                ("Port", Expr::from(HTTP_PORT)),
                ("Protocol", "HTTP".into()),
                (
                    "DefaultActions",
                    Expr::list([Expr::object([
                        ("Type", Expr::from("forward")),
                        ("TargetGroupArn", target_group.reference()),
                    ])]),
                ),
            ]),
        )?;

        info!(load_balancer = %handle.id(), name, port = HTTP_PORT, "Declared load balancer");

        Ok(Self {
            handle,
            listener,
            target_group,
            security_group,
        })
    }

    /// Let the balancer reach `targets` on the listener port.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule already exists.
    pub fn allow_to(&self, stack: &mut Stack, targets: &SecurityGroup) -> Result<ResourceRef> {
        targets.allow_from(
            stack,
            &self.security_group.as_peer(),
            HTTP_PORT,
            "Allow HTTP from the load balancer",
        )
    }

    /// Public DNS name attribute.
    #[must_use]
    pub fn dns_name(&self) -> Expr {
        self.handle.attr("DNSName")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declare(name: &str, timeout: u32) -> Result<(Stack, LoadBalancer)> {
        let mut stack = Stack::new("alb").unwrap();
        let vpc = stack.add_resource("vpc", ResourceType::Vpc, Expr::empty_object())?;
        let lb = LoadBalancer::declare(
            &mut stack,
            &LoadBalancerProps {
                name: name.into(),
                vpc,
                subnets: Expr::list(["subnet-a", "subnet-b"]),
                health_check_timeout_secs: timeout,
                health_check_interval_secs: 30,
            },
        )?;
        Ok((stack, lb))
    }

    #[test]
    fn test_balancer_listener_and_targets() {
        let (stack, lb) = declare("moodle-alb", 20).unwrap();
        let alb = stack.resource(lb.handle.id()).unwrap();
        assert_eq!(alb.property("Name").and_then(Expr::as_str), Some("moodle-alb"));
        assert_eq!(alb.property("Scheme").and_then(Expr::as_str), Some("internet-facing"));

        let listener = stack.resource(lb.listener.id()).unwrap();
        assert_eq!(listener.property("Port").and_then(Expr::as_i64), Some(80));

        let tg = stack.resource(lb.target_group.id()).unwrap();
        assert_eq!(tg.property("HealthCheckTimeoutSeconds").and_then(Expr::as_i64), Some(20));

        let graph = stack.graph().unwrap();
        assert!(graph.depends_on(lb.listener.id(), lb.handle.id()));
        assert!(graph.depends_on(lb.listener.id(), lb.target_group.id()));
    }

    #[test]
    fn test_world_open_on_http_only() {
        let (stack, lb) = declare("moodle-alb", 20).unwrap();
        let rules: Vec<_> = stack
            .resources_of(ResourceType::SecurityGroupIngress)
            .filter(|r| r.property("GroupId") == Some(&lb.security_group.group_id()))
            .collect();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].property("FromPort").and_then(Expr::as_i64), Some(80));
        assert_eq!(rules[0].property("CidrIp").and_then(Expr::as_str), Some("0.0.0.0/0"));
    }

    #[test]
    fn test_allow_to_targets() {
        let (mut stack, lb) = declare("moodle-alb", 20).unwrap();
        let vpc = stack.resource_ref("Vpc").unwrap();
        let app = SecurityGroup::declare(&mut stack, "app-sg", "app", &vpc).unwrap();
        let rule = lb.allow_to(&mut stack, &app).unwrap();
        let rule = stack.resource(rule.id()).unwrap();
        assert_eq!(
            rule.property("SourceSecurityGroupId"),
            Some(&lb.security_group.group_id())
        );
    }

    #[test]
    fn test_invalid_settings() {
        assert!(declare("-bad", 20).is_err());
        assert!(declare("a-very-long-load-balancer-name-over-limit", 20).is_err());
        assert!(declare("moodle-alb", 30).is_err());
    }
}
