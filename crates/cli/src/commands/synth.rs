//! Synth command - render the CloudFormation template.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tracing::info;

use super::StackArgs;
use crate::ui;

/// Template rendering format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum Format {
    #[default]
    Json,
    Yaml,
}

/// Render the template to stdout or a file.
#[derive(Args)]
pub struct SynthCommand {
    #[command(flatten)]
    stack: StackArgs,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Write to this file instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

impl SynthCommand {
    /// Run the synth command.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack cannot be declared or written.
    pub fn run(&self, config: Option<&Path>) -> Result<()> {
        let (_, topology) = self.stack.build(config)?;
        let template = topology.stack.synthesize()?;

        let body = match self.format {
            Format::Json => template.to_json()?,
            Format::Yaml => template.to_yaml()?,
        };

        match &self.output {
            Some(path) => {
                std::fs::write(path, &body)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), bytes = body.len(), "Template written");
                ui::print_success(&format!(
                    "{} resources written to {}",
                    template.resources.len(),
                    path.display()
                ));
            }
            None => println!("{body}"),
        }
        Ok(())
    }
}
