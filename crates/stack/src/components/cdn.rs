//! Edge distribution in front of the load balancer.
//!
//! Pages are dynamic and per-user, so nothing is cached at the edge: every
//! viewer request, with all headers, cookies and query strings, is forwarded
//! to the origin over the protocol the viewer used.

use tracing::info;

use crate::error::{Result, StackError};
use crate::intrinsic::Expr;
use crate::resource::{ResourceRef, ResourceType};
use crate::stack::Stack;

/// Managed cache policy `CachingDisabled`.
pub const CACHING_DISABLED_POLICY_ID: &str = "4135ea2d-6df8-44a3-9df3-4b5a84be39ad";

/// Managed origin request policy `AllViewer`.
pub const ALL_VIEWER_POLICY_ID: &str = "216adef6-5c7f-47e4-b989-5492eafa07d3";

/// Every HTTP method the distribution forwards.
pub const ALLOWED_METHODS: [&str; 7] = ["GET", "HEAD", "OPTIONS", "PUT", "PATCH", "POST", "DELETE"];

/// Highest origin read timeout accepted without a quota increase.
pub const MAX_READ_TIMEOUT_SECS: u32 = 180;

/// Distribution props.
#[derive(Debug, Clone)]
pub struct CdnProps {
    pub name: String,
    pub comment: String,
    /// Origin host, normally the balancer's DNS name.
    pub origin_domain: Expr,
    pub origin_read_timeout_secs: u32,
}

/// Declared distribution.
#[derive(Debug, Clone)]
pub struct Cdn {
    pub distribution: ResourceRef,
}

impl Cdn {
    /// Declare the distribution.
    ///
    /// # Errors
    ///
    /// Returns an error for an out-of-range read timeout or an empty origin.
    pub fn declare(stack: &mut Stack, props: &CdnProps) -> Result<Self> {
        if !(1..=MAX_READ_TIMEOUT_SECS).contains(&props.origin_read_timeout_secs) {
            return Err(StackError::invalid(
                "origin_read_timeout_secs",
                format!("must be between 1 and {MAX_READ_TIMEOUT_SECS}"),
            ));
        }
        if props.origin_domain.is_empty_literal() {
            return Err(StackError::invalid("origin_domain", "must not be empty"));
        }

        let origin_id = format!("{}-origin", props.name);
        let config = Expr::object([
            ("Enabled", Expr::from(true)),
            ("Comment", props.comment.as_str().into()),
            ("HttpVersion", "http2".into()),
            ("IPV6Enabled", true.into()),
            ("PriceClass", "PriceClass_All".into()),
            (
                "Origins",
                Expr::list([Expr::object([
                    ("Id", Expr::from(origin_id.as_str())),
                    ("DomainName", props.origin_domain.clone()),
                    (
                        "CustomOriginConfig",
                        Expr::object([
                            ("HTTPPort", Expr::from(80_u16)),
                            ("HTTPSPort", 443_u16.into()),
                            ("OriginProtocolPolicy", "match-viewer".into()),
                            ("OriginReadTimeout", props.origin_read_timeout_secs.into()),
                            ("OriginSSLProtocols", Expr::list(["TLSv1.2"])),
                        ]),
                    ),
                ])]),
            ),
            (
                "DefaultCacheBehavior",
                Expr::object([
                    ("TargetOriginId", Expr::from(origin_id.as_str())),
                    ("ViewerProtocolPolicy", "allow-all".into()),
                    ("CachePolicyId", CACHING_DISABLED_POLICY_ID.into()),
                    ("OriginRequestPolicyId", ALL_VIEWER_POLICY_ID.into()),
                    ("AllowedMethods", Expr::list(ALLOWED_METHODS)),
                    ("CachedMethods", Expr::list(["GET", "HEAD"])),
                    ("Compress", true.into()),
                ]),
            ),
        ]);

        let distribution = stack.add_resource(
            &props.name,
            ResourceType::Distribution,
            Expr::object([("DistributionConfig", config)]),
        )?;

        info!(
            distribution = %distribution.id(),
            read_timeout_secs = props.origin_read_timeout_secs,
            "Declared edge distribution"
        );
        Ok(Self { distribution })
    }

    /// Distribution domain name attribute.
    #[must_use]
    pub fn domain_name(&self) -> Expr {
        self.distribution.attr("DomainName")
    }

    /// Distribution ID.
    #[must_use]
    pub fn distribution_id(&self) -> Expr {
        self.distribution.reference()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declare(timeout: u32) -> Result<(Stack, Cdn)> {
        let mut stack = Stack::new("cdn").unwrap();
        let alb = stack.add_resource("alb", ResourceType::LoadBalancer, Expr::empty_object())?;
        let cdn = Cdn::declare(
            &mut stack,
            &CdnProps {
                name: "moodle-cf-dist".into(),
                comment: "CF Distribution for Scalable Moodle Stack".into(),
                origin_domain: alb.attr("DNSName"),
                origin_read_timeout_secs: timeout,
            },
        )?;
        Ok((stack, cdn))
    }

    #[test]
    fn test_edge_forwards_everything_uncached() {
        let (stack, cdn) = declare(60).unwrap();
        let dist = stack.resource(cdn.distribution.id()).unwrap();
        let config = dist.property("DistributionConfig").unwrap();
        let behavior = config.get("DefaultCacheBehavior").unwrap();
        assert_eq!(
            behavior.get("CachePolicyId").and_then(Expr::as_str),
            Some(CACHING_DISABLED_POLICY_ID)
        );
        assert_eq!(
            behavior.get("OriginRequestPolicyId").and_then(Expr::as_str),
            Some(ALL_VIEWER_POLICY_ID)
        );
        assert_eq!(behavior.get("ViewerProtocolPolicy").and_then(Expr::as_str), Some("allow-all"));
        assert_eq!(behavior.get("AllowedMethods").and_then(Expr::as_list).map(<[Expr]>::len), Some(7));

        let origin = &config.get("Origins").and_then(Expr::as_list).unwrap()[0];
        assert_eq!(
            origin.path(&["CustomOriginConfig", "OriginProtocolPolicy"]).and_then(Expr::as_str),
            Some("match-viewer")
        );
        assert_eq!(
            origin.path(&["CustomOriginConfig", "OriginReadTimeout"]).and_then(Expr::as_i64),
            Some(60)
        );
        assert!(stack.graph().unwrap().depends_on(cdn.distribution.id(), "Alb"));
    }

    #[test]
    fn test_read_timeout_bounds() {
        assert!(declare(0).is_err());
        assert!(declare(181).is_err());
        assert!(declare(180).is_ok());
    }
}
