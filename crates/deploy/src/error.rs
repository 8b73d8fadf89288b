//! Deployment errors and platform error classification.
//!
//! Classification uses the error code and message from
//! `ProvideErrorMetadata`, never the `Debug` rendering of the SDK error.

use std::path::PathBuf;

use aws_sdk_cloudformation::error::ProvideErrorMetadata;
use moodle_stack::StackError;
use thiserror::Error;

use crate::cloudformation::FailedEvent;
use crate::status::StackStatus;

/// Errors that can occur while deploying a stack.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The template could not be built or rendered.
    #[error(transparent)]
    Stack(#[from] StackError),

    /// Update submitted with nothing to change.
    #[error("No changes to deploy")]
    NoChanges,

    /// Stack does not exist.
    #[error("Stack not found: {0}")]
    StackNotFound(String),

    /// Stack already exists (create raced another create).
    #[error("Stack already exists: {0}")]
    AlreadyExists(String),

    /// Rate limit exceeded (retryable with backoff).
    #[error("Rate limit exceeded")]
    Throttled,

    /// Account quota reached.
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// Template body is over the inline submission limit.
    #[error("Template is {size} bytes, over the {limit}-byte inline limit")]
    TemplateTooLarge { size: usize, limit: usize },

    /// Stack is mid-operation and cannot take another one.
    #[error("Stack {stack} is busy ({status})")]
    Busy { stack: String, status: StackStatus },

    /// Stack can only be deleted from its current status.
    #[error("Stack {stack} is in {status} and must be destroyed before redeploying")]
    RequiresRecreate { stack: String, status: StackStatus },

    /// Polling gave up.
    #[error("Timed out after {waited_secs}s waiting for {stack} (last status {status})")]
    Timeout {
        stack: String,
        status: StackStatus,
        waited_secs: u64,
    },

    /// Operation ended in a failed or rolled-back status.
    #[error("Stack {stack} ended in {status}{}", describe_events(.events))]
    Failed {
        stack: String,
        status: StackStatus,
        events: Vec<FailedEvent>,
    },

    /// Outputs missing or empty after deployment.
    #[error("Missing or empty outputs: {}", .0.join(", "))]
    MissingOutputs(Vec<String>),

    /// State file could not be read or written.
    #[error("State file {}: {source}", .path.display())]
    State {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State file is not valid JSON.
    #[error("Invalid state file: {0}")]
    StateFormat(#[from] serde_json::Error),

    /// Any other platform error.
    #[error("CloudFormation error: {message}")]
    Api {
        code: Option<String>,
        message: String,
    },
}

impl DeployError {
    /// Check if this is a retryable error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled)
    }

    /// Check if this is a "stack not found" error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::StackNotFound(_))
    }

    /// Get a user-friendly suggestion for resolving this error, if available.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::RequiresRecreate { .. } => Some("Run `moodle-stack destroy` and deploy again"),
            Self::Busy { .. } => Some("Wait for the running operation to finish"),
            Self::TemplateTooLarge { .. } => {
                Some("Upload the template to S3 and deploy it by URL")
            }
            Self::LimitExceeded(_) => Some("Request a service quota increase or remove unused stacks"),
            Self::Api { code: Some(code), .. } if code == "InsufficientCapabilitiesException" => {
                Some("The template needs an extra capability acknowledgement")
            }
            _ => None,
        }
    }
}

fn describe_events(events: &[FailedEvent]) -> String {
    if events.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = events.iter().map(ToString::to_string).collect();
    format!(":\n  {}", lines.join("\n  "))
}

/// Known error codes for throttling/rate limiting.
const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

/// Message returned for an update that changes nothing.
const NO_UPDATES_MESSAGE: &str = "No updates are to be performed";

/// Classify a platform error from its code and message.
#[must_use]
pub fn classify(code: Option<&str>, message: Option<&str>) -> DeployError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        _ if message.contains(NO_UPDATES_MESSAGE) => DeployError::NoChanges,
        Some(c) if THROTTLING_CODES.contains(&c) => DeployError::Throttled,
        Some("AlreadyExistsException") => DeployError::AlreadyExists(message),
        Some("LimitExceededException") => DeployError::LimitExceeded(message),
        Some("ValidationError") if message.contains("does not exist") => {
            DeployError::StackNotFound(message)
        }
        _ => DeployError::Api {
            code: code.map(str::to_string),
            message,
        },
    }
}

/// Classify any SDK error that carries error metadata.
pub fn classify_sdk<E: ProvideErrorMetadata>(error: &E) -> DeployError {
    classify(error.code(), error.message())
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DeployError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_updates_maps_to_no_changes() {
        let err = classify(
            Some("ValidationError"),
            Some("No updates are to be performed."),
        );
        assert!(matches!(err, DeployError::NoChanges));
    }

    #[test]
    fn test_missing_stack() {
        let err = classify(
            Some("ValidationError"),
            Some("Stack with id moodle does not exist"),
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_throttling_is_retryable() {
        for code in THROTTLING_CODES {
            assert!(classify(Some(*code), None).is_retryable());
        }
        assert!(!classify(Some("ValidationError"), Some("bad template")).is_retryable());
    }

    #[test]
    fn test_other_codes_are_kept() {
        match classify(Some("InsufficientCapabilitiesException"), Some("Requires CAPABILITY_IAM")) {
            DeployError::Api { code, message } => {
                assert_eq!(code.as_deref(), Some("InsufficientCapabilitiesException"));
                assert_eq!(message, "Requires CAPABILITY_IAM");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            classify(Some("AlreadyExistsException"), Some("exists")),
            DeployError::AlreadyExists(_)
        ));
        assert!(matches!(
            classify(Some("LimitExceededException"), None),
            DeployError::LimitExceeded(_)
        ));
    }

    #[test]
    fn test_suggestions() {
        let err = DeployError::RequiresRecreate {
            stack: "moodle".into(),
            status: StackStatus::RollbackComplete,
        };
        assert!(err.suggestion().is_some());
        assert!(err.to_string().contains("ROLLBACK_COMPLETE"));
        assert!(DeployError::Throttled.suggestion().is_none());
    }
}
