//! Deploy command - create or update the stack.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use moodle_stack::{checks, Topology};
use moodle_stack_deploy::{
    AwsContext, DeployError, Deployer, DeploymentState, StackOutputs, SubmitOutcome,
};
use tracing::info;

use super::{minutes, DeployTarget, StackArgs};
use crate::ui;

const TOTAL_STEPS: u8 = 4;

/// Deploy the stack and wait for it to settle.
#[derive(Args)]
pub struct DeployCommand {
    #[command(flatten)]
    stack: StackArgs,

    #[command(flatten)]
    target: DeployTarget,

    /// Minutes to wait for the stack to settle.
    #[arg(long, default_value = "90", value_name = "MINUTES")]
    timeout: u64,

    /// Seconds between status polls.
    #[arg(long, default_value = "15", value_name = "SECONDS")]
    poll_interval: u64,
}

impl DeployCommand {
    /// Run the deploy command.
    ///
    /// # Errors
    ///
    /// Returns an error if checks fail, the platform rejects the stack, it
    /// ends in a failed status, or expected outputs are missing.
    pub async fn run(&self, config: Option<&Path>) -> Result<()> {
        ui::print_section("🚀 Moodle Stack Deployment");

        ui::print_step(1, TOTAL_STEPS, "Declaring and checking the stack");
        let (config, topology) = self.stack.build(config)?;
        let report = checks::run(&topology, &config);
        if !report.all_passed() {
            ui::print_check_report(&report);
            anyhow::bail!("Refusing to deploy: {} checks failed", report.failed_count());
        }
        if !config.has_key_pair() {
            ui::print_warning("No key pair given, instances will not accept SSH keys");
        }
        let template = topology.stack.synthesize()?;
        ui::print_success(&format!(
            "{} resources, {} checks passed",
            template.resources.len(),
            report.passed_count()
        ));

        ui::print_step(2, TOTAL_STEPS, "Submitting to CloudFormation");
        let aws = AwsContext::new(self.target.region.as_deref()).await;
        ui::print_kv("Stack", &config.stack_name);
        ui::print_kv("Region", aws.region());

        let deployer = Deployer::new(&aws, &config.stack_name)
            .with_poll_interval(Duration::from_secs(self.poll_interval));
        let mut state = load_state(&self.target)?
            .filter(|s| s.stack_name == config.stack_name)
            .unwrap_or_else(|| {
                DeploymentState::new(&config.stack_name, aws.region(), &self.target.output_dir)
            });

        let outcome = deployer.submit(&template).await.map_err(explain)?;
        info!(?outcome, "Submitted");

        ui::print_step(3, TOTAL_STEPS, "Waiting for the stack to settle");
        match outcome {
            SubmitOutcome::Unchanged => ui::print_info("Stack is already up to date"),
            SubmitOutcome::Created | SubmitOutcome::Updated => {
                let result = deployer
                    .wait_for_completion(minutes(self.timeout))
                    .await;
                let status = match result {
                    Ok(status) => status,
                    Err(e) => {
                        if let DeployError::Failed { status, .. } = &e {
                            state.set_status(status.clone())?;
                        }
                        return Err(explain(e));
                    }
                };
                state.set_status(status.clone())?;
                ui::print_success(&format!("Stack reached {status}"));
            }
        }

        ui::print_step(4, TOTAL_STEPS, "Reading outputs");
        let outputs = deployer.outputs().await.map_err(explain)?;
        print_outputs(&outputs);
        state.set_outputs(outputs.by_name())?;
        outputs
            .verify(Topology::output_ids().as_slice())
            .map_err(explain)?;

        println!();
        ui::print_success("Deployment complete! 🎉");
        ui::print_info(&format!(
            "State saved to {}",
            DeploymentState::state_file(&self.target.output_dir).display()
        ));
        Ok(())
    }
}

/// Print outputs by their operator-facing names.
pub fn print_outputs(outputs: &StackOutputs) {
    if outputs.is_empty() {
        ui::print_warning("Stack has no outputs");
        return;
    }
    for (name, value) in outputs.by_name() {
        ui::print_kv(&name, &value);
    }
}

/// Print the error's suggestion, if it has one, and convert it.
pub fn explain(error: DeployError) -> anyhow::Error {
    if let Some(hint) = error.suggestion() {
        ui::print_hint(hint);
    }
    anyhow::Error::new(error)
}

/// Load state for the target directory, if any was recorded.
pub fn load_state(target: &DeployTarget) -> Result<Option<DeploymentState>> {
    DeploymentState::load(&target.output_dir).with_context(|| {
        format!(
            "Failed to read deployment state in {}",
            target.output_dir.display()
        )
    })
}

/// Remove the state file if it records `stack_name`.
///
/// Returns whether a file was removed.
///
/// # Errors
///
/// Returns an error if the state file cannot be read or removed.
pub fn forget_state(target: &DeployTarget, stack_name: &str) -> Result<bool> {
    match load_state(target)? {
        Some(state) if state.stack_name == stack_name => {
            DeploymentState::remove(&target.output_dir)?;
            Ok(true)
        }
        Some(state) => {
            info!(recorded = %state.stack_name, "State file belongs to another stack, keeping it");
            Ok(false)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(dir: &Path) -> DeployTarget {
        DeployTarget {
            region: None,
            output_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_forget_state_only_for_matching_stack() {
        let dir = tempfile::tempdir().unwrap();
        let target = target(dir.path());
        DeploymentState::new("other-stack", "us-east-1", dir.path())
            .save()
            .unwrap();

        assert!(!forget_state(&target, "scalable-moodle-stack").unwrap());
        assert!(DeploymentState::state_file(dir.path()).exists());

        assert!(forget_state(&target, "other-stack").unwrap());
        assert!(!DeploymentState::state_file(dir.path()).exists());
        assert!(!forget_state(&target, "other-stack").unwrap());
    }
}
