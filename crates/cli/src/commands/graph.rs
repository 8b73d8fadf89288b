//! Graph command - dependency order of the declared resources.

use std::path::Path;

use anyhow::Result;
use clap::Args;

use super::StackArgs;
use crate::ui;

/// Show creation order or Graphviz output.
#[derive(Args)]
pub struct GraphCommand {
    #[command(flatten)]
    stack: StackArgs,

    /// Print the graph in Graphviz DOT format.
    #[arg(long)]
    dot: bool,
}

impl GraphCommand {
    /// Run the graph command.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack cannot be declared or its graph does not resolve.
    pub fn run(&self, config: Option<&Path>) -> Result<()> {
        let (_, topology) = self.stack.build(config)?;
        let graph = topology.stack.graph()?;

        if self.dot {
            println!("{}", graph.to_dot());
            return Ok(());
        }

        ui::print_section(&format!("Creation order for {}", topology.stack.name()));
        for (i, id) in graph.creation_order().into_iter().enumerate() {
            let deps = graph.dependencies_of(id);
            if deps.is_empty() {
                ui::print_numbered_step(i + 1, id);
            } else {
                let deps: Vec<&str> = deps.into_iter().collect();
                ui::print_numbered_step(i + 1, &format!("{id} <- {}", deps.join(", ")));
            }
        }
        println!();
        ui::print_info(&format!(
            "{} resources, {} edges",
            graph.len(),
            graph.edge_count()
        ));
        Ok(())
    }
}
