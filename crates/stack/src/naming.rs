//! Logical ID and stack name rules.

use crate::error::{Result, StackError};

/// Longest logical ID the platform accepts.
pub const MAX_LOGICAL_ID_LEN: usize = 255;

/// Longest stack name the platform accepts.
pub const MAX_STACK_NAME_LEN: usize = 128;

/// Convert a human resource name into a logical ID.
///
/// Splits on every non-alphanumeric character and capitalizes each segment,
/// so `moodle-redis-sg` becomes `MoodleRedisSg` and `MOODLE-EFS-ID` becomes
/// `MoodleEfsId`.
#[must_use]
pub fn logical_id(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let lower = segment.to_ascii_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Check that `id` is usable as a logical ID.
///
/// # Errors
///
/// Returns [`StackError::InvalidLogicalId`] when `id` is empty, too long or
/// contains anything other than ASCII letters and digits.
pub fn validate_logical_id(id: &str) -> Result<()> {
    if id.is_empty()
        || id.len() > MAX_LOGICAL_ID_LEN
        || !id.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(StackError::InvalidLogicalId(id.to_string()));
    }
    Ok(())
}

/// Check that `name` is usable as a stack name.
///
/// # Errors
///
/// Returns [`StackError::InvalidStackName`] when the name breaks the rules.
pub fn validate_stack_name(name: &str) -> Result<()> {
    let starts_with_letter = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    if !starts_with_letter
        || name.len() > MAX_STACK_NAME_LEN
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(StackError::InvalidStackName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_id_from_names() {
        assert_eq!(logical_id("moodle-vpc"), "MoodleVpc");
        assert_eq!(logical_id("moodle-asg-scale-by-cpu"), "MoodleAsgScaleByCpu");
        assert_eq!(
            logical_id("APPLICATION-LOAD-BALANCER-DNS-NAME"),
            "ApplicationLoadBalancerDnsName"
        );
        assert_eq!(logical_id("public-subnet-1"), "PublicSubnet1");
        assert_eq!(logical_id("--"), "");
    }

    #[test]
    fn test_validate_logical_id() {
        assert!(validate_logical_id("MoodleVpc").is_ok());
        assert!(validate_logical_id("").is_err());
        assert!(validate_logical_id("moodle-vpc").is_err());
        assert!(validate_logical_id(&"A".repeat(256)).is_err());
    }

    #[test]
    fn test_validate_stack_name() {
        assert!(validate_stack_name("scalable-moodle-stack").is_ok());
        assert!(validate_stack_name("1stack").is_err());
        assert!(validate_stack_name("my_stack").is_err());
        assert!(validate_stack_name("").is_err());
    }
}
