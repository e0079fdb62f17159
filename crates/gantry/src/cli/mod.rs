//! CLI definition and command handling

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use tracing::debug;

use gantry_core::error::WorkflowError;

use commands::{AbortCommand, CheckCommand, PerformCommand, RequestCommand};

/// Binaries every command shells out to
const REQUIRED_TOOLS: &[&str] = &["git", "gh"];

/// Gantry - Release orchestration for multi-component repositories
#[derive(Debug, Parser)]
#[command(name = "gantry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Open or update a release pull request
    Request(RequestCommand),

    /// Release what a merged release pull request asked for
    Perform(PerformCommand),

    /// Validate settings and show components
    Check(CheckCommand),

    /// Abandon an unmerged release pull request
    Abort(AbortCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(&self) -> anyhow::Result<()> {
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }
        check_tools()?;

        match &self.command {
            Commands::Request(cmd) => cmd.execute(self),
            Commands::Perform(cmd) => cmd.execute(self),
            Commands::Check(cmd) => cmd.execute(self),
            Commands::Abort(cmd) => cmd.execute(self),
        }
    }
}

fn check_tools() -> anyhow::Result<()> {
    for tool in REQUIRED_TOOLS {
        let path = which::which(tool)
            .map_err(|_| gantry_core::GantryError::from(WorkflowError::MissingTool(tool.to_string())))?;
        debug!(tool, path = %path.display(), "found tool");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let cli = Cli::try_parse_from(["gantry", "request", "engine=minor", "hull", "--yes"]).unwrap();
        match cli.command {
            Commands::Request(cmd) => {
                assert_eq!(cmd.components, vec!["engine=minor", "hull"]);
                assert!(cmd.yes);
                assert!(!cmd.dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_perform() {
        let cli = Cli::try_parse_from([
            "gantry",
            "-C",
            "/tmp/repo",
            "perform",
            "--pr",
            "12",
            "--dry-run",
            "--artifact-dir",
            "/tmp/out",
        ])
        .unwrap();
        assert_eq!(cli.directory.as_deref(), Some(std::path::Path::new("/tmp/repo")));
        match cli.command {
            Commands::Perform(cmd) => {
                assert_eq!(cmd.pr, Some(12));
                assert!(cmd.dry_run);
                assert!(!cmd.skip_checks);
                assert!(cmd.components.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_abort_requires_pr() {
        assert!(Cli::try_parse_from(["gantry", "abort"]).is_err());
        assert!(Cli::try_parse_from(["gantry", "abort", "--pr", "3"]).is_ok());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["gantry", "-q", "-v", "check"]).is_err());
    }
}
