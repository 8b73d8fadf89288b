//! Errors raised while declaring or synthesizing a stack.
//!
//! Every variant is produced locally and synchronously, before anything is
//! handed to the provisioning platform.

use thiserror::Error;

/// Errors that can occur while building the resource graph.
#[derive(Error, Debug)]
pub enum StackError {
    /// A component or configuration parameter is out of range.
    #[error("Invalid parameter `{parameter}`: {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },

    /// Stack name does not satisfy the platform's naming rules.
    #[error("Invalid stack name `{0}`: must start with a letter and contain only letters, digits and hyphens (max 128)")]
    InvalidStackName(String),

    /// Logical ID is empty, too long or not alphanumeric.
    #[error("Invalid logical ID `{0}`")]
    InvalidLogicalId(String),

    /// Two declarations resolved to the same logical ID.
    #[error("Duplicate logical ID `{0}`")]
    DuplicateLogicalId(String),

    /// A value or `DependsOn` points at something that was never declared.
    #[error("`{from}` references undeclared `{target}`")]
    DanglingReference { from: String, target: String },

    /// The declared dependencies contain a cycle.
    #[error("Dependency cycle between: {}", members.join(", "))]
    DependencyCycle { members: Vec<String> },

    /// An output was declared with an empty value.
    #[error("Output `{0}` has an empty value")]
    EmptyOutput(String),

    /// Configuration file could not be read.
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for [`crate::StackConfig`].
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error.
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StackError {
    /// Shorthand for [`StackError::InvalidParameter`].
    pub(crate) fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter,
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StackError>;
