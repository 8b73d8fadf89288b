//! Deployment state persistence and retry helpers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DeployError, Result};
use crate::status::StackStatus;

/// File name of the state document inside the output directory.
pub const STATE_FILE: &str = "deployment-state.json";

/// Last known state of a deployed stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Stack name.
    pub stack_name: String,
    /// Region the stack lives in.
    pub region: String,
    /// Last observed status.
    pub status: Option<StackStatus>,
    /// Outputs keyed by operator-facing name.
    pub outputs: BTreeMap<String, String>,
    /// Output directory for the state file.
    pub output_dir: PathBuf,
    /// Timestamp of last update.
    pub updated_at: String,
}

impl DeploymentState {
    /// Create a new, empty state.
    #[must_use]
    pub fn new(
        stack_name: impl Into<String>,
        region: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            stack_name: stack_name.into(),
            region: region.into(),
            status: None,
            outputs: BTreeMap::new(),
            output_dir: output_dir.into(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Get the state file path.
    #[must_use]
    pub fn state_file(output_dir: &Path) -> PathBuf {
        output_dir.join(STATE_FILE)
    }

    /// Load state from file.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(output_dir: &Path) -> Result<Option<Self>> {
        let path = Self::state_file(output_dir);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|source| DeployError::State { path, source })?;
        let state: Self = serde_json::from_str(&content)?;

        info!(stack = %state.stack_name, status = ?state.status, "Loaded deployment state");
        Ok(Some(state))
    }

    /// Save state to file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&mut self) -> Result<()> {
        self.updated_at = chrono::Utc::now().to_rfc3339();

        let path = Self::state_file(&self.output_dir);
        std::fs::create_dir_all(&self.output_dir).map_err(|source| DeployError::State {
            path: self.output_dir.clone(),
            source,
        })?;

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content).map_err(|source| DeployError::State { path, source })?;
        Ok(())
    }

    /// Record a status and save.
    ///
    /// # Errors
    /// Returns an error if saving fails.
    pub fn set_status(&mut self, status: StackStatus) -> Result<()> {
        self.status = Some(status);
        self.save()
    }

    /// Record outputs and save.
    ///
    /// # Errors
    /// Returns an error if saving fails.
    pub fn set_outputs(&mut self, outputs: BTreeMap<String, String>) -> Result<()> {
        self.outputs = outputs;
        self.save()
    }

    /// Forget the stack after it was destroyed.
    ///
    /// # Errors
    /// Returns an error if the state file exists but cannot be removed.
    pub fn remove(output_dir: &Path) -> Result<()> {
        let path = Self::state_file(output_dir);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(DeployError::State { path, source }),
        }
    }
}

/// Retry configuration for platform calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Execute an async call, retrying only errors that are retryable.
///
/// # Errors
/// Returns the first non-retryable error, or the last error once all
/// attempts are used.
pub async fn with_retry_async<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= config.max_attempts => return Err(e),
            Err(e) => {
                warn!(
                    "{operation_name} failed (attempt {attempt}/{}): {e}. Retrying in {delay:?}...",
                    config.max_attempts
                );

                tokio::time::sleep(delay).await;
                delay = std::cmp::min(config.max_delay, delay.mul_f64(config.backoff_multiplier));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DeploymentState::load(dir.path()).unwrap().is_none());

        let mut state = DeploymentState::new("moodle", "eu-west-1", dir.path());
        state.set_status(StackStatus::CreateComplete).unwrap();
        state
            .set_outputs(BTreeMap::from([(
                "MOODLE-EFS-ID".to_string(),
                "fs-123".to_string(),
            )]))
            .unwrap();

        let loaded = DeploymentState::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.stack_name, "moodle");
        assert_eq!(loaded.status, Some(StackStatus::CreateComplete));
        assert_eq!(loaded.outputs["MOODLE-EFS-ID"], "fs-123");

        DeploymentState::remove(dir.path()).unwrap();
        assert!(DeploymentState::load(dir.path()).unwrap().is_none());
        DeploymentState::remove(dir.path()).unwrap();
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(DeploymentState::state_file(dir.path()), "{not json").unwrap();
        assert!(matches!(
            DeploymentState::load(dir.path()),
            Err(DeployError::StateFormat(_))
        ));
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert!((config.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_throttling_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry_async(&RetryConfig::default(), "DescribeStacks", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(DeployError::Throttled)
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry_async(&RetryConfig::default(), "CreateStack", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DeployError::NoChanges)
        })
        .await;
        assert!(matches!(result, Err(DeployError::NoChanges)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 3,
            ..RetryConfig::default()
        };
        let result: Result<()> = with_retry_async(&config, "DescribeStacks", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DeployError::Throttled)
        })
        .await;
        assert!(matches!(result, Err(DeployError::Throttled)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
