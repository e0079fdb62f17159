//! Abort command

use clap::Args;
use tracing::info;

use super::open_repository;
use crate::cli::output;
use crate::cli::Cli;

/// Abandon an unmerged release pull request
#[derive(Debug, Args)]
pub struct AbortCommand {
    /// Release pull request number
    #[arg(long)]
    pub pr: u64,
}

impl AbortCommand {
    /// Execute the abort command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(pr = self.pr, "executing abort command");
        let repo = open_repository()?;
        let pr = repo.abort_release_pr(self.pr)?;

        if !cli.quiet {
            output::success(&format!(
                "Closed release pull request #{} ({})",
                pr.number,
                pr.head_ref()
            ));
        }
        Ok(())
    }
}
