//! Outputs command - endpoints of a deployed stack.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use moodle_stack::Topology;
use moodle_stack_deploy::{AwsContext, Deployer};

use super::deploy::{explain, load_state, print_outputs};
use super::{DeployTarget, StackArgs};
use crate::ui;

/// Print stack outputs.
#[derive(Args)]
pub struct OutputsCommand {
    #[command(flatten)]
    stack: StackArgs,

    #[command(flatten)]
    target: DeployTarget,

    /// Output as JSON keyed by output name.
    #[arg(long, default_value = "false")]
    json: bool,
}

impl OutputsCommand {
    /// Run the outputs command.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack does not exist or cannot be described.
    pub async fn run(&self, config: Option<&Path>) -> Result<()> {
        let config = self.stack.resolve(config)?;
        let aws = AwsContext::new(self.target.region.as_deref()).await;
        let deployer = Deployer::new(&aws, &config.stack_name);

        let outputs = deployer.outputs().await.map_err(explain)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&outputs.by_name())?);
        } else {
            ui::print_section(&format!("Outputs of {}", config.stack_name));
            print_outputs(&outputs);
            println!();
        }

        let missing = outputs.missing(Topology::output_ids().as_slice());
        if !missing.is_empty() {
            ui::print_warning(&format!("Missing or empty: {}", missing.join(", ")));
        }

        if let Some(mut state) = load_state(&self.target)? {
            if state.stack_name == config.stack_name {
                state.set_outputs(outputs.by_name())?;
            }
        }
        Ok(())
    }
}
