//! Destroy command - delete the stack.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};
use moodle_stack_deploy::{AwsContext, Deployer};

use super::deploy::{explain, forget_state};
use super::{minutes, DeployTarget, StackArgs};
use crate::ui;

/// Delete the stack and everything in it.
#[derive(Args)]
pub struct DestroyCommand {
    #[command(flatten)]
    stack: StackArgs,

    #[command(flatten)]
    target: DeployTarget,

    /// Skip the confirmation prompt.
    #[arg(short, long)]
    yes: bool,

    /// Minutes to wait for deletion.
    #[arg(long, default_value = "60", value_name = "MINUTES")]
    timeout: u64,
}

impl DestroyCommand {
    /// Run the destroy command.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails or times out.
    pub async fn run(&self, config: Option<&Path>) -> Result<()> {
        let config = self.stack.resolve(config)?;

        ui::print_section(&format!("🗑  Destroy {}", config.stack_name));
        ui::print_warning("This deletes every resource in the stack:");
        ui::print_list_item("the fleet, staging instance and load balancer");
        ui::print_list_item("the file system and everything stored on it");
        ui::print_list_item("the database (a final snapshot is kept)");
        println!();

        if !self.yes {
            let proceed = Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(format!("Delete stack {}?", config.stack_name))
                .default(false)
                .interact()?;

            if !proceed {
                println!("{}", "Destroy cancelled.".yellow());
                return Ok(());
            }
        }

        let aws = AwsContext::new(self.target.region.as_deref()).await;
        let deployer = Deployer::new(&aws, &config.stack_name);
        deployer
            .destroy(minutes(self.timeout))
            .await
            .map_err(explain)?;

        forget_state(&self.target, &config.stack_name)?;
        ui::print_success(&format!("Stack {} deleted", config.stack_name));
        Ok(())
    }
}
