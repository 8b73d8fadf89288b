//! Stack configuration.
//!
//! Every knob has a default matching the reference deployment, so an empty
//! TOML file (or no file at all) yields the standard topology. The CLI layers
//! flags and environment variables on top of whatever is loaded here.

use std::path::Path;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, StackError};
use crate::naming::validate_stack_name;

/// Upper bound for the fleet size.
pub const FLEET_CAPACITY_LIMIT: u32 = 10;

/// On-demand share of fleet capacity above the base; the rest is spot.
pub const ON_DEMAND_PERCENTAGE_ABOVE_BASE: u32 = 25;

/// Highest backup retention the database engine allows.
pub const MAX_BACKUP_RETENTION_DAYS: u32 = 35;

/// Full stack configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Name of the deployed stack.
    pub stack_name: String,
    /// EC2 key pair for administrative access. Empty means no key pair.
    pub key_name: String,
    /// Spread NAT, database and cache across zones.
    pub multi_az: bool,
    /// Network settings.
    pub network: NetworkConfig,
    /// Autoscaling fleet settings.
    pub fleet: FleetConfig,
    /// Staging instance settings.
    pub staging: StagingConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Cache settings.
    pub cache: CacheConfig,
    /// File system settings.
    pub filesystem: FileSystemConfig,
    /// Load balancer settings.
    pub load_balancer: LoadBalancerConfig,
    /// Edge distribution settings.
    pub cdn: CdnConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: "scalable-moodle-stack".into(),
            key_name: String::new(),
            multi_az: true,
            network: NetworkConfig::default(),
            fleet: FleetConfig::default(),
            staging: StagingConfig::default(),
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            filesystem: FileSystemConfig::default(),
            load_balancer: LoadBalancerConfig::default(),
            cdn: CdnConfig::default(),
        }
    }
}

/// Network settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// VPC address range.
    pub cidr: Ipv4Net,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: Ipv4Net::new(std::net::Ipv4Addr::new(10, 0, 0, 0), 16)
                .unwrap_or_default(),
        }
    }
}

/// Autoscaling fleet settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub min_capacity: u32,
    pub max_capacity: u32,
    /// Share of capacity above the base that must be on-demand.
    pub on_demand_percentage_above_base: u32,
    /// Average CPU utilization the scaling policy holds.
    pub target_cpu_utilization: f64,
    /// Launch template instance type, first override.
    pub instance_types: Vec<String>,
    /// Root volume size in GiB.
    pub root_volume_gib: u32,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            min_capacity: 1,
            max_capacity: FLEET_CAPACITY_LIMIT,
            on_demand_percentage_above_base: ON_DEMAND_PERCENTAGE_ABOVE_BASE,
            target_cpu_utilization: 60.0,
            instance_types: vec!["t3.large".into(), "m5.large".into(), "m5d.large".into()],
            root_volume_gib: 30,
        }
    }
}

/// Staging instance settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub instance_type: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            instance_type: "t3.large".into(),
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub instance_class: String,
    pub engine_version: String,
    pub database_name: String,
    pub username: String,
    pub allocated_storage_gib: u32,
    pub max_allocated_storage_gib: u32,
    pub backup_retention_days: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            instance_class: "db.t3.large".into(),
            engine_version: "8.0.30".into(),
            database_name: "moodledb".into(),
            username: "dbadmin".into(),
            allocated_storage_gib: 30,
            max_allocated_storage_gib: 1000,
            backup_retention_days: 7,
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub node_type: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            node_type: "cache.t3.medium".into(),
        }
    }
}

/// File system settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystemConfig {
    /// Idle days before data moves to infrequent access (7, 14, 30, 60 or 90).
    pub transition_to_ia_days: u32,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self {
            transition_to_ia_days: 30,
        }
    }
}

/// Load balancer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub name: String,
    pub health_check_timeout_secs: u32,
    pub health_check_interval_secs: u32,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            name: "moodle-alb".into(),
            health_check_timeout_secs: 20,
            health_check_interval_secs: 30,
        }
    }
}

/// Edge distribution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdnConfig {
    pub comment: String,
    pub read_timeout_secs: u32,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            comment: "CF Distribution for Scalable Moodle Stack".into(),
            read_timeout_secs: 60,
        }
    }
}

impl StackConfig {
    /// Defaults with a key pair and redundancy choice, the two deployment inputs.
    #[must_use]
    pub fn with_inputs(key_name: impl Into<String>, multi_az: bool) -> Self {
        Self {
            key_name: key_name.into(),
            multi_az,
            ..Self::default()
        }
    }

    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::ConfigParse`] if the document is invalid.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a TOML file, or defaults when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|source| StackError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        info!(path = %path.display(), stack = %config.stack_name, "Loaded stack config");
        Ok(config)
    }

    /// Whether a key pair will be attached to instances.
    #[must_use]
    pub fn has_key_pair(&self) -> bool {
        !self.key_name.trim().is_empty()
    }

    /// Check every bound before anything is declared.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::InvalidParameter`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        validate_stack_name(&self.stack_name)?;

        if self.network.cidr.prefix_len() > 22 {
            return Err(StackError::invalid(
                "network.cidr",
                format!("{} is too small to carve four subnets", self.network.cidr),
            ));
        }

        let fleet = &self.fleet;
        if fleet.min_capacity < 1 || fleet.min_capacity > fleet.max_capacity {
            return Err(StackError::invalid(
                "fleet.min_capacity",
                format!(
                    "must satisfy 1 <= min ({}) <= max ({})",
                    fleet.min_capacity, fleet.max_capacity
                ),
            ));
        }
        if fleet.max_capacity > FLEET_CAPACITY_LIMIT {
            return Err(StackError::invalid(
                "fleet.max_capacity",
                format!("must be at most {FLEET_CAPACITY_LIMIT}"),
            ));
        }
        if fleet.on_demand_percentage_above_base > 100 {
            return Err(StackError::invalid(
                "fleet.on_demand_percentage_above_base",
                "must be a percentage (0-100)",
            ));
        }
        if !(fleet.target_cpu_utilization > 0.0 && fleet.target_cpu_utilization <= 100.0) {
            return Err(StackError::invalid(
                "fleet.target_cpu_utilization",
                "must be in (0, 100]",
            ));
        }
        if fleet.instance_types.is_empty() {
            return Err(StackError::invalid(
                "fleet.instance_types",
                "at least one instance type is required",
            ));
        }

        let db = &self.database;
        if db.allocated_storage_gib >= db.max_allocated_storage_gib {
            return Err(StackError::invalid(
                "database.allocated_storage_gib",
                format!(
                    "initial storage ({}) must be below the autoscaling maximum ({})",
                    db.allocated_storage_gib, db.max_allocated_storage_gib
                ),
            ));
        }
        if db.backup_retention_days > MAX_BACKUP_RETENTION_DAYS {
            return Err(StackError::invalid(
                "database.backup_retention_days",
                format!("must be at most {MAX_BACKUP_RETENTION_DAYS}"),
            ));
        }
        if db.username.is_empty() || db.database_name.is_empty() {
            return Err(StackError::invalid(
                "database.username",
                "username and database name are required",
            ));
        }

        if !matches!(self.filesystem.transition_to_ia_days, 7 | 14 | 30 | 60 | 90) {
            return Err(StackError::invalid(
                "filesystem.transition_to_ia_days",
                "must be one of 7, 14, 30, 60, 90",
            ));
        }

        let lb = &self.load_balancer;
        if lb.health_check_timeout_secs >= lb.health_check_interval_secs {
            return Err(StackError::invalid(
                "load_balancer.health_check_timeout_secs",
                "health check timeout must be shorter than the interval",
            ));
        }

        if !(1..=180).contains(&self.cdn.read_timeout_secs) {
            return Err(StackError::invalid(
                "cdn.read_timeout_secs",
                "must be between 1 and 180 seconds",
            ));
        }

        if !self.has_key_pair() {
            warn!("No key pair configured; instances will not accept SSH keys");
        }
        if !self.multi_az {
            warn!("Single-zone mode: NAT, database and cache have no zone redundancy");
        }

        Ok(())
    }
}
