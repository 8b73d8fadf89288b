//! Component declarations.
//!
//! Each component validates its own props and declares one or more
//! resources, returning typed handles that downstream components wire into
//! their properties.

pub mod cache;
pub mod cdn;
pub mod compute;
pub mod database;
pub mod filesystem;
pub mod load_balancer;
pub mod network;
pub mod security;
pub mod staging;

use crate::intrinsic::Expr;

pub use cache::{Cache, CacheProps};
pub use cdn::{Cdn, CdnProps};
pub use compute::{Fleet, FleetProps, LaunchTemplate, LaunchTemplateProps};
pub use database::{Database, DatabaseProps};
pub use filesystem::{FileSystem, FileSystemProps};
pub use load_balancer::{LoadBalancer, LoadBalancerProps};
pub use network::{Network, NetworkProps, SubnetKind};
pub use security::{Peer, SecurityGroup};
pub use staging::{StagingInstance, StagingProps};

/// Platform tag list from key/value pairs.
pub(crate) fn tags<I, K>(pairs: I) -> Expr
where
    I: IntoIterator<Item = (K, Expr)>,
    K: Into<String>,
{
    Expr::List(
        pairs
            .into_iter()
            .map(|(key, value)| Expr::object([("Key", Expr::Str(key.into())), ("Value", value)]))
            .collect(),
    )
}

/// Value of tag `key` on a resource's property map.
#[must_use]
pub fn tag_value<'a>(properties: &'a Expr, key: &str) -> Option<&'a Expr> {
    properties.get("Tags")?.as_list()?.iter().find_map(|tag| {
        (tag.get("Key")?.as_str()? == key)
            .then(|| tag.get("Value"))
            .flatten()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_lookup() {
        let props = Expr::object([(
            "Tags",
            tags([("Name", Expr::from("moodle-vpc")), ("SubnetType", Expr::from("Public"))]),
        )]);
        assert_eq!(tag_value(&props, "SubnetType").and_then(Expr::as_str), Some("Public"));
        assert!(tag_value(&props, "Missing").is_none());
        assert!(tag_value(&Expr::empty_object(), "Name").is_none());
    }
}
