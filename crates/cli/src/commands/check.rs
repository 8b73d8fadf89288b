//! Check command - structural checks over the declared stack.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use moodle_stack::checks;

use super::StackArgs;
use crate::ui;

/// Run structural checks.
#[derive(Args)]
pub struct CheckCommand {
    #[command(flatten)]
    stack: StackArgs,

    /// Output report as JSON.
    #[arg(long, default_value = "false")]
    json: bool,
}

impl CheckCommand {
    /// Run the check command.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack cannot be declared or any check fails.
    pub fn run(&self, config: Option<&Path>) -> Result<()> {
        let (config, topology) = self.stack.build(config)?;
        let report = checks::run(&topology, &config);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            ui::print_check_report(&report);
        }

        if report.all_passed() {
            Ok(())
        } else {
            anyhow::bail!("Stack checks found {} issues", report.failed_count());
        }
    }
}
