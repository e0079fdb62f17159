//! Opening release requests
//!
//! Turns resolved versions into a release branch holding the changelog and
//! version file edits, and a pull request describing them.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, instrument, warn};

use gantry_core::error::WorkflowError;
use gantry_core::Result;
use gantry_git::github::{IssueUpdate, NewPullRequest, PullRequest};

use crate::repository::Repository;
use crate::request_spec::ResolvedUnit;

/// What `create_request` did, or would have done
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub branch: String,
    pub title: String,
    pub body: String,
    /// Release commit on the branch; `None` in dry-run mode
    pub commit: Option<String>,
    /// The opened or updated pull request; `None` in dry-run mode
    pub pull_request: Option<PullRequest>,
}

/// Builds a release request from resolved units
pub struct RequestLogic<'a> {
    repo: &'a Repository,
    units: Vec<ResolvedUnit>,
    now: DateTime<Utc>,
}

impl<'a> RequestLogic<'a> {
    /// Fails if there is nothing to release
    pub fn new(repo: &'a Repository, units: Vec<ResolvedUnit>) -> Result<Self> {
        if units.is_empty() {
            return Err(WorkflowError::NothingToRelease.into());
        }
        Ok(Self {
            repo,
            units,
            now: Utc::now(),
        })
    }

    /// Pin the clock used for branch names and changelog dates
    pub fn with_time(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn units(&self) -> &[ResolvedUnit] {
        &self.units
    }

    pub fn branch_name(&self) -> String {
        let names: Vec<&str> = self
            .units
            .iter()
            .map(|u| u.component_name.as_str())
            .collect();
        self.repo.release_branch_name(&names, self.now)
    }

    pub fn commit_title(&self) -> String {
        match self.units.as_slice() {
            [unit] => format!("release: {} {}", unit.component_name, unit.version),
            units => format!("release: {} components", units.len()),
        }
    }

    /// Markdown description of the request
    pub fn pr_body(&self) -> String {
        let mut body = String::from("This pull request prepares new releases.\n\n");
        for unit in &self.units {
            let previous = unit
                .last_version
                .as_ref()
                .map(|v| format!(" (was {})", v))
                .unwrap_or_else(|| " (first release)".to_string());
            body.push_str(&format!(
                " *  **{} {}**{}\n",
                unit.component_name, unit.version, previous
            ));
        }

        for unit in &self.units {
            body.push_str(&format!("\n### {}\n\n```\n", unit.component_name));
            for line in unit.change_set.prefixed_lines() {
                body.push_str(&format!("* {}\n", line));
            }
            body.push_str("```\n");
        }

        body.push_str(concat!(
            "\nYou can edit the changelog entries on this branch before merging. ",
            "Merge to perform the release; close without merging to cancel it.\n"
        ));
        body
    }

    /// Write the changelog entries and version bumps into the working tree
    pub fn change_files(&self, date: NaiveDate) -> Result<()> {
        let root = self.repo.root();
        for unit in &self.units {
            let component = self.repo.require_component(&unit.component_name)?;
            component.update_changelog(root, &unit.version, &unit.change_set, date)?;
            component.update_version_file(root, &unit.version)?;
            info!(component = %unit.component_name, version = %unit.version, "updated release files");
        }
        Ok(())
    }

    /// Commit the changes on the release branch and open its pull request
    ///
    /// An existing open pull request for the branch is updated instead of
    /// creating another. The original branch is checked out again
    /// afterwards. In dry-run mode nothing is changed.
    #[instrument(skip(self), fields(branch = %self.branch_name()))]
    pub fn create_request(&self, dry_run: bool) -> Result<RequestOutcome> {
        let branch = self.branch_name();
        let title = self.commit_title();
        let body = self.pr_body();

        if dry_run {
            info!(branch = %branch, "DRY RUN: skipping release request");
            return Ok(RequestOutcome {
                branch,
                title,
                body,
                commit: None,
                pull_request: None,
            });
        }

        self.repo.check_clean()?;
        let git = self.repo.git();
        let original = git.current_branch()?;

        git.create_branch(&branch, "HEAD")?;
        let committed = self
            .change_files(self.now.date_naive())
            .and_then(|_| {
                git.commit_all(&title, &self.repo.commit_identity())
                    .map_err(Into::into)
            });
        if let Some(original) = &original {
            if let Err(e) = git.checkout_branch(original) {
                warn!(error = %e, branch = %original, "failed to return to original branch");
            }
        }
        let commit = committed?;

        let settings = self.repo.settings();
        git.push_branch(&settings.git_remote, &branch, true)?;
        let pr = self.open_or_update_pr(&branch, &title, &body)?;
        self.repo
            .update_release_label(&pr, &settings.release_pending_label)?;

        info!(pr = pr.number, branch = %branch, "release request ready");
        Ok(RequestOutcome {
            branch,
            title,
            body,
            commit: Some(commit),
            pull_request: Some(pr),
        })
    }

    fn open_or_update_pr(&self, branch: &str, title: &str, body: &str) -> Result<PullRequest> {
        let github = self.repo.github();
        match self.repo.find_open_release_pr(branch)? {
            Some(pr) => {
                let update = IssueUpdate {
                    title: Some(title.to_string()),
                    body: Some(body.to_string()),
                    ..Default::default()
                };
                github.update_issue(pr.number, &update)?;
                info!(pr = pr.number, "updated existing release request");
                github.pull_request(pr.number)
            }
            None => {
                let pr = github.create_pull_request(&NewPullRequest {
                    title: title.to_string(),
                    head: branch.to_string(),
                    base: self.repo.settings().main_branch.clone(),
                    body: body.to_string(),
                })?;
                info!(pr = pr.number, "opened release request");
                Ok(pr)
            }
        }
    }
}
