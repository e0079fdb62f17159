//! Perform command

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use console::style;
use tracing::info;

use gantry_core::Version;
use gantry_release::{CratesIoIndex, Performer, PerformerOptions};

use super::open_repository;
use crate::cli::output;
use crate::cli::Cli;
use crate::exit_codes::ReleaseFailed;

/// Release what a merged release pull request asked for
#[derive(Debug, Args)]
pub struct PerformCommand {
    /// Commit to release (defaults to the release PR's merge commit, or HEAD)
    #[arg(long)]
    pub release_ref: Option<String>,

    /// Release pull request number
    #[arg(long)]
    pub pr: Option<u64>,

    /// Release these components directly, as `name=VERSION`, instead of
    /// what the release pull request released
    pub components: Vec<String>,

    /// Run the pipelines without publishing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the clean tree, remote and GitHub check prechecks
    #[arg(long)]
    pub skip_checks: bool,

    /// Keep build artifacts in this directory
    #[arg(long)]
    pub artifact_dir: Option<PathBuf>,

    /// Build and publish docs for every component
    #[arg(long)]
    pub enable_docs: bool,
}

impl PerformCommand {
    /// Execute the perform command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(
            release_ref = ?self.release_ref,
            pr = ?self.pr,
            components = ?self.components,
            dry_run = self.dry_run,
            skip_checks = self.skip_checks,
            "executing perform command"
        );
        let releases = self
            .components
            .iter()
            .map(String::as_str)
            .map(parse_release)
            .collect::<anyhow::Result<Vec<_>>>()?;

        let repo = open_repository()?;
        let options = PerformerOptions {
            release_ref: self.release_ref.clone(),
            pr_number: self.pr,
            dry_run: self.dry_run,
            skip_checks: self.skip_checks,
            artifact_dir: self.artifact_dir.clone(),
            enable_docs: self.enable_docs,
        };
        let index = Arc::new(CratesIoIndex::new()?);
        let mut performer = Performer::new(&repo, options, index)?;

        if !cli.quiet && self.dry_run {
            println!("{}", style("[DRY RUN - nothing will be published]").yellow().bold());
            println!();
        }

        if releases.is_empty() {
            performer.perform_pr_releases()?;
        } else {
            for (name, version) in &releases {
                performer.perform_adhoc_release(name, version)?;
            }
        }

        let report = performer.report_results()?;
        if !cli.quiet {
            println!("{}", report);
        }

        if !performer.succeeded() {
            return Err(ReleaseFailed.into());
        }
        if !cli.quiet {
            output::success("Release completed");
        }
        Ok(())
    }
}

fn parse_release(arg: &str) -> anyhow::Result<(String, Version)> {
    let (name, version) = arg
        .split_once('=')
        .with_context(|| format!("Expected NAME=VERSION, got '{}'", arg))?;
    let version = Version::parse(version.trim())
        .with_context(|| format!("Invalid version for {}", name.trim()))?;
    Ok((name.trim().to_string(), version))
}
