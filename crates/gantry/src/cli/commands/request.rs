//! Request command

use clap::Args;
use console::style;
use dialoguer::Confirm;
use tracing::info;

use gantry_release::{resolve_versions, RequestLogic, RequestSpec};

use super::open_repository;
use crate::cli::output;
use crate::cli::Cli;

/// Open or update a release pull request
#[derive(Debug, Args)]
pub struct RequestCommand {
    /// Components to release, as `name`, `name=VERSION` or
    /// `name=major|minor|patch|patch2`; all changed components if omitted
    pub components: Vec<String>,

    /// Show what would be requested without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl RequestCommand {
    /// Execute the request command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(
            components = ?self.components,
            dry_run = self.dry_run,
            "executing request command"
        );
        let repo = open_repository()?;
        let spec = RequestSpec::from_args(&self.components)?;
        let units = resolve_versions(&spec, &repo, "HEAD")?;

        if units.is_empty() {
            if !cli.quiet {
                output::warning("Nothing to release: no component has significant changes.");
            }
            return Ok(());
        }

        let logic = RequestLogic::new(&repo, units)?;

        if !cli.quiet {
            println!("{}", output::header("Release Request"));
            println!();
            for unit in logic.units() {
                println!(
                    "{}",
                    output::transition(&unit.component_name, unit.last_version.as_ref(), &unit.version)
                );
            }
            println!("{}", output::key_value("branch", &output::branch(&logic.branch_name())));
            println!();

            if self.dry_run {
                println!("  {}", style("[DRY RUN - no changes will be made]").yellow().bold());
                println!();
            }
        }

        if !self.yes && !self.dry_run {
            let confirmed = Confirm::new()
                .with_prompt("Open the release pull request?")
                .default(true)
                .interact()?;

            if !confirmed {
                println!("{}", style("Aborted.").yellow());
                return Ok(());
            }
        }

        let outcome = logic.create_request(self.dry_run)?;

        if cli.quiet {
            return Ok(());
        }
        match &outcome.pull_request {
            Some(pr) => output::success(&format!(
                "Release pull request #{} is ready: {}",
                pr.number, pr.html_url
            )),
            None => {
                output::info(&format!("Would push {} and open: {}", outcome.branch, outcome.title));
                println!();
                println!("{}", outcome.body);
            }
        }
        Ok(())
    }
}
