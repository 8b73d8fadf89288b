//! CLI subcommands.

pub mod check;
pub mod deploy;
pub mod destroy;
pub mod graph;
pub mod outputs;
pub mod synth;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use moodle_stack::{topology, StackConfig, Topology};
use tracing::warn;

/// Deployment inputs shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    /// EC2 key pair attached to fleet and staging instances.
    #[arg(long, env = "MOODLE_KEY_NAME")]
    key_name: Option<String>,

    /// Spread NAT, database and cache across zones.
    #[arg(long, env = "MOODLE_MULTI_AZ")]
    multi_az: Option<bool>,

    /// Shorthand for `--multi-az false`. Wins over `--multi-az`.
    #[arg(long)]
    single_az: bool,

    /// Override the stack name.
    #[arg(long)]
    stack_name: Option<String>,
}

impl StackArgs {
    /// Load the config file, then apply flags and environment on top.
    pub fn resolve(&self, path: Option<&Path>) -> Result<StackConfig> {
        let mut config = StackConfig::load(path).with_context(|| match path {
            Some(p) => format!("Failed to load config from {}", p.display()),
            None => "Failed to load default config".to_string(),
        })?;

        if let Some(key_name) = &self.key_name {
            config.key_name.clone_from(key_name);
        }
        if self.single_az {
            config.multi_az = false;
        } else if let Some(multi_az) = self.multi_az {
            config.multi_az = multi_az;
        }
        if let Some(name) = &self.stack_name {
            config.stack_name.clone_from(name);
        }

        if !config.multi_az {
            warn!("Single-zone mode: one NAT gateway, no database or cache standby");
        }
        Ok(config)
    }

    /// Resolve the config and build the topology from it.
    pub fn build(&self, path: Option<&Path>) -> Result<(StackConfig, Topology)> {
        let config = self.resolve(path)?;
        let topology = topology::build(&config).context("Invalid stack declaration")?;
        Ok((config, topology))
    }
}

/// A `--timeout` in minutes, saturating instead of overflowing.
#[must_use]
pub fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}

/// Where deployment state and outputs are written.
#[derive(Args, Debug, Clone)]
pub struct DeployTarget {
    /// AWS region. Falls back to the SDK's default chain.
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Directory for the deployment state file.
    #[arg(long, default_value = ".moodle-stack", value_name = "DIR")]
    pub output_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> StackArgs {
        StackArgs {
            key_name: None,
            multi_az: None,
            single_az: false,
            stack_name: None,
        }
    }

    #[test]
    fn test_defaults_without_flags() {
        let config = args().resolve(None).unwrap();
        assert_eq!(config, StackConfig::default());
    }

    #[test]
    fn test_flags_override_config() {
        let config = StackArgs {
            key_name: Some("k1".into()),
            multi_az: Some(false),
            stack_name: Some("moodle-test".into()),
            ..args()
        }
        .resolve(None)
        .unwrap();
        assert_eq!(config.key_name, "k1");
        assert!(!config.multi_az);
        assert_eq!(config.stack_name, "moodle-test");
    }

    #[test]
    fn test_single_az_wins() {
        let config = StackArgs {
            multi_az: Some(true),
            single_az: true,
            ..args()
        }
        .resolve(None)
        .unwrap();
        assert!(!config.multi_az);
    }

    #[test]
    fn test_invalid_stack_name_fails_build() {
        let result = StackArgs {
            stack_name: Some("1-starts-with-digit".into()),
            ..args()
        }
        .build(None);
        assert!(result.is_err());
    }

    #[test]
    fn test_minutes_saturate() {
        assert_eq!(minutes(90), Duration::from_secs(5400));
        assert_eq!(minutes(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_missing_config_file() {
        assert!(args()
            .resolve(Some(Path::new("/nonexistent/moodle-stack.toml")))
            .is_err());
    }
}
