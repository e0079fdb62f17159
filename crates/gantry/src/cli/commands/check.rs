//! Check command

use clap::Args;
use console::style;
use tracing::info;

use super::open_repository;
use crate::cli::output;
use crate::cli::Cli;

/// Validate settings and show components
#[derive(Debug, Args)]
pub struct CheckCommand {}

impl CheckCommand {
    /// Execute the check command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!("executing check command");
        let repo = open_repository()?;
        repo.validate()?;

        if cli.quiet {
            return Ok(());
        }

        let git = repo.git();
        println!("{}", output::header("Components"));
        for component in repo.components() {
            let current = component.current_version(git, None)?;
            let released = component.latest_tag_version(git, "HEAD")?;
            println!();
            println!("  {} ({})", style(component.name()).bold(), component.kind());
            println!("{}", output::key_value("directory", &component.directory().display().to_string()));
            println!("{}", output::key_value("version", &output::maybe_version(current.as_ref())));
            println!("{}", output::key_value("released", &output::maybe_version(released.as_ref())));
        }

        let coordinated: Vec<_> = repo
            .groups()
            .ids()
            .map(|id| repo.groups().members(id))
            .filter(|members| members.len() > 1)
            .collect();
        if !coordinated.is_empty() {
            println!();
            println!("{}", output::header("Coordination groups"));
            for members in coordinated {
                println!("  {}", members.join(", "));
            }
        }

        println!();
        output::success("Settings are valid");
        Ok(())
    }
}
