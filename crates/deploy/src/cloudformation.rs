//! Stack submission and status polling.
//!
//! The deployer only sequences API calls. Resource ordering, parallelism and
//! rollback all stay with the platform.

use std::fmt;
use std::time::Duration;

use aws_sdk_cloudformation::types::{OnFailure, Stack as SdkStack, StackEvent};
use aws_sdk_cloudformation::Client;
use chrono::{DateTime, Utc};
use moodle_stack::Template;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::context::AwsContext;
use crate::error::{classify_sdk, DeployError, Result};
use crate::outputs::StackOutputs;
use crate::state::{with_retry_async, RetryConfig};
use crate::status::StackStatus;

/// Largest template body accepted inline.
pub const MAX_TEMPLATE_BODY_BYTES: usize = 51_200;

/// Resource type of the stack's own events.
const STACK_RESOURCE_TYPE: &str = "AWS::CloudFormation::Stack";

/// Default delay between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// What a submission did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitOutcome {
    Created,
    Updated,
    Unchanged,
}

impl SubmitOutcome {
    /// Whether there is an operation to wait for.
    #[must_use]
    pub fn needs_wait(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// A resource event that explains a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEvent {
    pub logical_id: String,
    pub resource_type: String,
    pub status: String,
    pub reason: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl fmt::Display for FailedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {}: {}",
            self.logical_id, self.resource_type, self.status, self.reason
        )
    }
}

/// Reject a template body the platform would refuse inline.
///
/// # Errors
/// Returns [`DeployError::TemplateTooLarge`] over [`MAX_TEMPLATE_BODY_BYTES`].
pub fn check_template_size(size: usize) -> Result<()> {
    if size > MAX_TEMPLATE_BODY_BYTES {
        return Err(DeployError::TemplateTooLarge {
            size,
            limit: MAX_TEMPLATE_BODY_BYTES,
        });
    }
    Ok(())
}

/// Deploys one named stack.
#[derive(Debug, Clone)]
pub struct Deployer {
    client: Client,
    stack_name: String,
    retry: RetryConfig,
    poll_interval: Duration,
}

impl Deployer {
    /// Create a deployer for `stack_name`.
    #[must_use]
    pub fn new(aws: &AwsContext, stack_name: impl Into<String>) -> Self {
        Self {
            client: aws.cloudformation_client(),
            stack_name: stack_name.into(),
            retry: RetryConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the delay between status polls.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the retry policy for throttled calls.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Stack name.
    #[must_use]
    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    async fn describe(&self) -> Result<Option<SdkStack>> {
        let client = &self.client;
        let name = self.stack_name.as_str();
        let response = with_retry_async(&self.retry, "DescribeStacks", || async move {
            client
                .describe_stacks()
                .stack_name(name)
                .send()
                .await
                .map_err(|e| classify_sdk(&e))
        })
        .await;

        match response {
            Ok(output) => Ok(output.stacks().first().cloned()),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Current status, `None` when the stack does not exist.
    ///
    /// # Errors
    /// Returns an error if the stack cannot be described.
    pub async fn status(&self) -> Result<Option<StackStatus>> {
        Ok(self.describe().await?.map(|stack| status_of(&stack)))
    }

    /// Create the stack, or update it when it already exists.
    ///
    /// # Errors
    /// Returns an error if the template is too large, the stack is busy or
    /// unrecoverable, or the platform rejects the request.
    pub async fn submit(&self, template: &Template) -> Result<SubmitOutcome> {
        let body = template.to_json_compact()?;
        check_template_size(body.len())?;

        let client = &self.client;
        let name = self.stack_name.as_str();
        let body = body.as_str();

        match self.status().await? {
            None => {
                info!(stack = %name, bytes = body.len(), "Creating stack");
                with_retry_async(&self.retry, "CreateStack", || async move {
                    client
                        .create_stack()
                        .stack_name(name)
                        .template_body(body)
                        .on_failure(OnFailure::Rollback)
                        .send()
                        .await
                        .map_err(|e| classify_sdk(&e))
                })
                .await?;
                Ok(SubmitOutcome::Created)
            }
            Some(status) if status.requires_recreate() => Err(DeployError::RequiresRecreate {
                stack: name.to_string(),
                status,
            }),
            Some(status) if status.is_in_progress() => Err(DeployError::Busy {
                stack: name.to_string(),
                status,
            }),
            Some(status) => {
                info!(stack = %name, %status, bytes = body.len(), "Updating stack");
                let result = with_retry_async(&self.retry, "UpdateStack", || async move {
                    client
                        .update_stack()
                        .stack_name(name)
                        .template_body(body)
                        .send()
                        .await
                        .map_err(|e| classify_sdk(&e))
                })
                .await;
                match result {
                    Ok(_) => Ok(SubmitOutcome::Updated),
                    Err(DeployError::NoChanges) => {
                        info!(stack = %name, "Stack is already up to date");
                        Ok(SubmitOutcome::Unchanged)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Poll until the stack reaches a terminal status.
    ///
    /// # Errors
    /// Returns [`DeployError::Failed`] with the failed resource events when
    /// the operation ends unsuccessfully, and [`DeployError::Timeout`] when
    /// `timeout` elapses first.
    pub async fn wait_for_completion(&self, timeout: Duration) -> Result<StackStatus> {
        let started = Instant::now();
        let mut last = None;

        loop {
            let Some(status) = self.status().await? else {
                return Err(DeployError::StackNotFound(self.stack_name.clone()));
            };
            if last.as_ref() != Some(&status) {
                info!(stack = %self.stack_name, %status, "Stack status");
            }

            if status.is_terminal() {
                if status.is_success() {
                    return Ok(status);
                }
                let events = self.failed_events().await.unwrap_or_else(|e| {
                    warn!(error = %e, "Could not fetch stack events");
                    Vec::new()
                });
                return Err(DeployError::Failed {
                    stack: self.stack_name.clone(),
                    status,
                    events,
                });
            }

            if started.elapsed() >= timeout {
                return Err(DeployError::Timeout {
                    stack: self.stack_name.clone(),
                    status,
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            last = Some(status);
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Outputs of the deployed stack.
    ///
    /// # Errors
    /// Returns [`DeployError::StackNotFound`] if the stack does not exist.
    pub async fn outputs(&self) -> Result<StackOutputs> {
        let stack = self
            .describe()
            .await?
            .ok_or_else(|| DeployError::StackNotFound(self.stack_name.clone()))?;
        let outputs = StackOutputs::from_sdk(stack.outputs());
        debug!(stack = %self.stack_name, count = outputs.len(), "Fetched outputs");
        Ok(outputs)
    }

    /// Failures reported by the latest stack operation, newest first.
    ///
    /// # Errors
    /// Returns an error if the events cannot be listed.
    pub async fn failed_events(&self) -> Result<Vec<FailedEvent>> {
        let client = &self.client;
        let name = self.stack_name.as_str();
        let response = with_retry_async(&self.retry, "DescribeStackEvents", || async move {
            client
                .describe_stack_events()
                .stack_name(name)
                .send()
                .await
                .map_err(|e| classify_sdk(&e))
        })
        .await?;

        let records = response.stack_events().iter().filter_map(event_record).collect();
        Ok(current_failures(records, &self.stack_name))
    }

    /// Delete the stack and wait until it is gone.
    ///
    /// # Errors
    /// Returns an error if deletion fails or does not finish within `timeout`.
    pub async fn destroy(&self, timeout: Duration) -> Result<()> {
        if self.status().await?.is_none() {
            info!(stack = %self.stack_name, "Stack does not exist, nothing to destroy");
            return Ok(());
        }

        let client = &self.client;
        let name = self.stack_name.as_str();
        info!(stack = %name, "Deleting stack");
        with_retry_async(&self.retry, "DeleteStack", || async move {
            client
                .delete_stack()
                .stack_name(name)
                .send()
                .await
                .map_err(|e| classify_sdk(&e))
        })
        .await?;

        let started = Instant::now();
        loop {
            match self.status().await? {
                None | Some(StackStatus::DeleteComplete) => {
                    info!(stack = %name, "Stack deleted");
                    return Ok(());
                }
                Some(status) if status.is_terminal() => {
                    let events = self.failed_events().await.unwrap_or_default();
                    return Err(DeployError::Failed {
                        stack: name.to_string(),
                        status,
                        events,
                    });
                }
                Some(status) if started.elapsed() >= timeout => {
                    return Err(DeployError::Timeout {
                        stack: name.to_string(),
                        status,
                        waited_secs: started.elapsed().as_secs(),
                    });
                }
                Some(_) => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}

/// Stack statuses that open a new operation in the event history.
const OPERATION_START_STATUSES: &[&str] = &[
    "CREATE_IN_PROGRESS",
    "UPDATE_IN_PROGRESS",
    "DELETE_IN_PROGRESS",
    "IMPORT_IN_PROGRESS",
];

fn event_record(event: &StackEvent) -> Option<FailedEvent> {
    Some(FailedEvent {
        logical_id: event.logical_resource_id().unwrap_or_default().to_string(),
        resource_type: event.resource_type().unwrap_or_default().to_string(),
        status: event.resource_status()?.as_str().to_string(),
        reason: event.resource_status_reason().unwrap_or_default().to_string(),
        timestamp: event
            .timestamp()
            .and_then(|t| DateTime::from_timestamp(t.secs(), 0)),
    })
}

/// Keep `_FAILED` events up to the start of the latest operation.
///
/// `events` is newest first, as the platform returns them.
fn current_failures(events: Vec<FailedEvent>, stack_name: &str) -> Vec<FailedEvent> {
    let mut failures = Vec::new();
    for event in events {
        let starts_operation = event.resource_type == STACK_RESOURCE_TYPE
            && event.logical_id == stack_name
            && OPERATION_START_STATUSES.contains(&event.status.as_str());
        if event.status.ends_with("_FAILED") {
            failures.push(event);
        }
        if starts_operation {
            break;
        }
    }
    failures
}

fn status_of(stack: &SdkStack) -> StackStatus {
    stack
        .stack_status()
        .map_or(StackStatus::Unknown(String::new()), |s| {
            StackStatus::from(s.as_str().to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_size_limit() {
        assert!(check_template_size(MAX_TEMPLATE_BODY_BYTES).is_ok());
        assert!(matches!(
            check_template_size(MAX_TEMPLATE_BODY_BYTES + 1),
            Err(DeployError::TemplateTooLarge { size: 51_201, .. })
        ));
    }

    #[test]
    fn test_outcome_wait() {
        assert!(SubmitOutcome::Created.needs_wait());
        assert!(SubmitOutcome::Updated.needs_wait());
        assert!(!SubmitOutcome::Unchanged.needs_wait());
    }

    #[test]
    fn test_failed_event_display() {
        let event = FailedEvent {
            logical_id: "MoodleDb".into(),
            resource_type: "AWS::RDS::DBInstance".into(),
            status: "CREATE_FAILED".into(),
            reason: "quota".into(),
            timestamp: None,
        };
        assert_eq!(
            event.to_string(),
            "MoodleDb (AWS::RDS::DBInstance) CREATE_FAILED: quota"
        );
    }

    fn event(logical_id: &str, resource_type: &str, status: &str) -> FailedEvent {
        FailedEvent {
            logical_id: logical_id.into(),
            resource_type: resource_type.into(),
            status: status.into(),
            reason: String::new(),
            timestamp: None,
        }
    }

    #[test]
    fn test_failures_stop_at_latest_operation() {
        let stack = "moodle";
        // Newest first: a failed update, then an older failed create attempt.
        let events = vec![
            event(stack, STACK_RESOURCE_TYPE, "UPDATE_ROLLBACK_COMPLETE"),
            event(stack, STACK_RESOURCE_TYPE, "UPDATE_ROLLBACK_IN_PROGRESS"),
            event("MoodleAlb", "AWS::ElasticLoadBalancingV2::LoadBalancer", "UPDATE_FAILED"),
            event(stack, STACK_RESOURCE_TYPE, "UPDATE_IN_PROGRESS"),
            event("MoodleDb", "AWS::RDS::DBInstance", "CREATE_FAILED"),
            event(stack, STACK_RESOURCE_TYPE, "CREATE_IN_PROGRESS"),
        ];

        let failures = current_failures(events, stack);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].logical_id, "MoodleAlb");
    }

    #[test]
    fn test_failures_include_stack_level_failure() {
        let stack = "moodle";
        let events = vec![
            event(stack, STACK_RESOURCE_TYPE, "DELETE_FAILED"),
            event("MoodleEfs", "AWS::EFS::FileSystem", "DELETE_FAILED"),
            event(stack, STACK_RESOURCE_TYPE, "DELETE_IN_PROGRESS"),
        ];
        let ids: Vec<String> = current_failures(events, stack)
            .into_iter()
            .map(|e| e.logical_id)
            .collect();
        assert_eq!(ids, vec!["moodle", "MoodleEfs"]);
    }

    #[test]
    fn test_nested_stack_events_do_not_end_the_scan() {
        let events = vec![
            event("MoodleDb", "AWS::RDS::DBInstance", "CREATE_FAILED"),
            event("Nested", STACK_RESOURCE_TYPE, "CREATE_IN_PROGRESS"),
            event("MoodleEfs", "AWS::EFS::FileSystem", "CREATE_FAILED"),
            event("moodle", STACK_RESOURCE_TYPE, "CREATE_IN_PROGRESS"),
        ];
        assert_eq!(current_failures(events, "moodle").len(), 2);
    }
}
