//! Moodle stack CLI.
//!
//! Builds the Moodle topology, checks it, renders it as a CloudFormation
//! template and drives deployments of it.

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod ui;

use commands::check::CheckCommand;
use commands::deploy::DeployCommand;
use commands::destroy::DestroyCommand;
use commands::graph::GraphCommand;
use commands::outputs::OutputsCommand;
use commands::synth::SynthCommand;

/// Moodle stack - scalable Moodle on AWS.
#[derive(Parser)]
#[command(
    name = "moodle-stack",
    version,
    about = "Scalable Moodle stack on AWS",
    long_about = "Declare, check and deploy a scalable Moodle stack on AWS.\n\n\
                  The stack is a VPC over two zones, an autoscaling fleet behind a\n\
                  load balancer and CloudFront, MySQL, Redis and a shared EFS.\n\n\
                  Deploying is idempotent - re-running updates the stack in place\n\
                  or reports that nothing changed."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Stack configuration file (TOML).
    #[arg(short, long, global = true, value_name = "FILE", env = "MOODLE_STACK_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the CloudFormation template.
    Synth(SynthCommand),

    /// Run structural checks against the declared topology.
    Check(CheckCommand),

    /// Show resource creation order or the dependency graph.
    Graph(GraphCommand),

    /// Create or update the stack and wait for it to settle.
    Deploy(DeployCommand),

    /// Print the outputs of a deployed stack.
    Outputs(OutputsCommand),

    /// Delete the stack.
    Destroy(DestroyCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("info,moodle_stack=debug,moodle_stack_deploy=debug")
    } else {
        EnvFilter::new("warn,moodle_stack=info,moodle_stack_deploy=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Synth(cmd) => cmd.run(config),
        Commands::Check(cmd) => cmd.run(config),
        Commands::Graph(cmd) => cmd.run(config),
        Commands::Deploy(cmd) => cmd.run(config).await,
        Commands::Outputs(cmd) => cmd.run(config).await,
        Commands::Destroy(cmd) => cmd.run(config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy_flags() {
        let cli = Cli::try_parse_from([
            "moodle-stack",
            "deploy",
            "--key-name",
            "k1",
            "--multi-az",
            "true",
            "--region",
            "eu-west-1",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Deploy(_)));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["moodle-stack", "check", "--json", "-v", "-c", "stack.toml"])
                .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("stack.toml")));
    }

    #[test]
    fn test_synth_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["moodle-stack", "synth", "--format", "xml"]).is_err());
    }
}
