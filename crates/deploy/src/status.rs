//! Stack lifecycle status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status reported for a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum StackStatus {
    CreateInProgress,
    CreateFailed,
    CreateComplete,
    RollbackInProgress,
    RollbackFailed,
    RollbackComplete,
    DeleteInProgress,
    DeleteFailed,
    DeleteComplete,
    UpdateInProgress,
    UpdateCompleteCleanupInProgress,
    UpdateComplete,
    UpdateFailed,
    UpdateRollbackInProgress,
    UpdateRollbackFailed,
    UpdateRollbackCompleteCleanupInProgress,
    UpdateRollbackComplete,
    ReviewInProgress,
    /// A status this crate does not know about.
    Unknown(String),
}

impl StackStatus {
    /// Wire name of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateFailed => "CREATE_FAILED",
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            Self::RollbackFailed => "ROLLBACK_FAILED",
            Self::RollbackComplete => "ROLLBACK_COMPLETE",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteFailed => "DELETE_FAILED",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::UpdateInProgress => "UPDATE_IN_PROGRESS",
            Self::UpdateCompleteCleanupInProgress => "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            Self::UpdateComplete => "UPDATE_COMPLETE",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::UpdateRollbackInProgress => "UPDATE_ROLLBACK_IN_PROGRESS",
            Self::UpdateRollbackFailed => "UPDATE_ROLLBACK_FAILED",
            Self::UpdateRollbackCompleteCleanupInProgress => {
                "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"
            }
            Self::UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            Self::ReviewInProgress => "REVIEW_IN_PROGRESS",
            Self::Unknown(s) => s,
        }
    }

    /// Whether the stack is still changing.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.as_str().ends_with("_IN_PROGRESS")
    }

    /// Whether polling can stop.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.is_in_progress()
    }

    /// Whether the last operation reached its goal.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::CreateComplete | Self::UpdateComplete | Self::DeleteComplete
        )
    }

    /// Whether the platform is undoing, or has undone, the last operation.
    #[must_use]
    pub fn is_rollback(&self) -> bool {
        self.as_str().contains("ROLLBACK")
    }

    /// Whether the stack can only be deleted, never updated.
    ///
    /// A failed first creation leaves the stack in `ROLLBACK_COMPLETE` with no
    /// resources; the platform refuses updates from there.
    #[must_use]
    pub fn requires_recreate(&self) -> bool {
        matches!(
            self,
            Self::RollbackComplete | Self::RollbackFailed | Self::CreateFailed | Self::DeleteFailed
        )
    }
}

impl FromStr for StackStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CREATE_IN_PROGRESS" => Self::CreateInProgress,
            "CREATE_FAILED" => Self::CreateFailed,
            "CREATE_COMPLETE" => Self::CreateComplete,
            "ROLLBACK_IN_PROGRESS" => Self::RollbackInProgress,
            "ROLLBACK_FAILED" => Self::RollbackFailed,
            "ROLLBACK_COMPLETE" => Self::RollbackComplete,
            "DELETE_IN_PROGRESS" => Self::DeleteInProgress,
            "DELETE_FAILED" => Self::DeleteFailed,
            "DELETE_COMPLETE" => Self::DeleteComplete,
            "UPDATE_IN_PROGRESS" => Self::UpdateInProgress,
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS" => Self::UpdateCompleteCleanupInProgress,
            "UPDATE_COMPLETE" => Self::UpdateComplete,
            "UPDATE_FAILED" => Self::UpdateFailed,
            "UPDATE_ROLLBACK_IN_PROGRESS" => Self::UpdateRollbackInProgress,
            "UPDATE_ROLLBACK_FAILED" => Self::UpdateRollbackFailed,
            "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS" => {
                Self::UpdateRollbackCompleteCleanupInProgress
            }
            "UPDATE_ROLLBACK_COMPLETE" => Self::UpdateRollbackComplete,
            "REVIEW_IN_PROGRESS" => Self::ReviewInProgress,
            other => Self::Unknown(other.to_string()),
        })
    }
}

impl From<String> for StackStatus {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl From<StackStatus> for String {
    fn from(value: StackStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(s: &str) -> StackStatus {
        StackStatus::from(s.to_string())
    }

    #[test]
    fn test_round_trips_known_and_unknown() {
        assert_eq!(status("UPDATE_COMPLETE"), StackStatus::UpdateComplete);
        assert_eq!(status("IMPORT_COMPLETE").as_str(), "IMPORT_COMPLETE");
        assert_eq!(StackStatus::CreateComplete.to_string(), "CREATE_COMPLETE");
    }

    #[test]
    fn test_classification() {
        assert!(StackStatus::CreateInProgress.is_in_progress());
        assert!(StackStatus::UpdateRollbackCompleteCleanupInProgress.is_in_progress());
        assert!(StackStatus::UpdateRollbackComplete.is_terminal());
        assert!(StackStatus::UpdateRollbackComplete.is_rollback());
        assert!(!StackStatus::UpdateRollbackComplete.is_success());
        assert!(StackStatus::UpdateComplete.is_success());
        assert!(StackStatus::RollbackComplete.requires_recreate());
        assert!(!StackStatus::UpdateRollbackComplete.requires_recreate());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&StackStatus::DeleteComplete).unwrap();
        assert_eq!(json, "\"DELETE_COMPLETE\"");
        let parsed: StackStatus = serde_json::from_str("\"REVIEW_IN_PROGRESS\"").unwrap();
        assert_eq!(parsed, StackStatus::ReviewInProgress);
    }
}
