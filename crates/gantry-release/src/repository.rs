//! Repository façade
//!
//! Ties together the settings, the git repository, GitHub and the loaded
//! components. Everything the request and perform workflows need from the
//! outside world goes through here.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use gantry_changelog::{ChangeSet, ChangeSetConfig};
use gantry_core::accumulate::accumulate_errors;
use gantry_core::config::{load_settings_from_dir, Settings};
use gantry_core::error::{ConfigError, GitError, WorkflowError};
use gantry_core::{Result, SharedRunner, Version};
use gantry_git::github::{IssueUpdate, PullRequest, PullRequestState};
use gantry_git::{CommitIdentity, GhCli, GitHub, GitRepo};

use crate::component::Component;
use crate::groups::{CoordinationGroups, GroupId};

/// Delays between polls while waiting for GitHub checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckPolling {
    pub initial: Duration,
    pub step: Duration,
    pub max: Duration,
}

impl Default for CheckPolling {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(10),
            step: Duration::from_secs(10),
            max: Duration::from_secs(60),
        }
    }
}

impl CheckPolling {
    /// Poll without sleeping
    pub fn immediate() -> Self {
        Self {
            initial: Duration::ZERO,
            step: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        (self.initial + self.step * attempt).min(self.max)
    }
}

/// A release-managed repository
pub struct Repository {
    settings: Settings,
    git: GitRepo,
    github: Arc<dyn GitHub>,
    runner: SharedRunner,
    components: Vec<Component>,
    groups: CoordinationGroups,
    change_set_config: ChangeSetConfig,
    polling: CheckPolling,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.git.path())
            .field("components", &self.components)
            .finish()
    }
}

impl Repository {
    /// Wire up a repository from already-loaded parts
    pub fn new(
        settings: Settings,
        git: GitRepo,
        github: Arc<dyn GitHub>,
        runner: SharedRunner,
    ) -> Self {
        let groups = CoordinationGroups::build(&settings);
        let components = settings
            .components
            .iter()
            .filter_map(|c| {
                groups
                    .group_of(&c.name)
                    .map(|group| Component::new(c.clone(), group))
            })
            .collect();
        let change_set_config = ChangeSetConfig::from_settings(&settings);

        Self {
            settings,
            git,
            github,
            runner,
            components,
            groups,
            change_set_config,
            polling: CheckPolling::default(),
        }
    }

    /// Load settings and open the repository containing `dir`
    ///
    /// GitHub is reached through `gh`, for the repository named in the
    /// settings or, failing that, the one the git remote points at.
    #[instrument(skip(runner), fields(dir = %dir.display()))]
    pub fn open(dir: &Path, runner: SharedRunner) -> Result<Self> {
        let (settings, path) = load_settings_from_dir(dir)?;
        let git = GitRepo::discover(dir)?.with_runner(runner.clone());

        let slug = match &settings.repo {
            Some(repo) => repo.clone(),
            None => git.remote_slug(&settings.git_remote)?.ok_or_else(|| {
                ConfigError::InvalidValue {
                    field: "repo".to_string(),
                    message: format!(
                        "not set, and remote {} is not a GitHub repository",
                        settings.git_remote
                    ),
                }
            })?,
        };
        info!(settings = %path.display(), repo = %slug, "opened repository");

        let github = Arc::new(GhCli::new(runner.clone(), slug));
        Ok(Self::new(settings, git, github, runner))
    }

    /// Override the delays used while waiting for checks
    pub fn with_check_polling(mut self, polling: CheckPolling) -> Self {
        self.polling = polling;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn git(&self) -> &GitRepo {
        &self.git
    }

    pub fn github(&self) -> &dyn GitHub {
        self.github.as_ref()
    }

    pub fn runner(&self) -> &SharedRunner {
        &self.runner
    }

    /// Working tree root
    pub fn root(&self) -> &Path {
        self.git.path()
    }

    /// Components in settings order
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name() == name)
    }

    /// Look up a component, failing if it is not configured
    pub fn require_component(&self, name: &str) -> Result<&Component> {
        self.component(name)
            .ok_or_else(|| ConfigError::UnknownComponent(name.to_string()).into())
    }

    pub fn groups(&self) -> &CoordinationGroups {
        &self.groups
    }

    /// Components sharing a coordination group, in settings order
    pub fn group_members(&self, id: GroupId) -> Vec<&Component> {
        self.groups
            .members(id)
            .iter()
            .filter_map(|name| self.component(name))
            .collect()
    }

    /// Whether every commit belongs to the only component
    pub fn is_single_component(&self) -> bool {
        self.components.len() == 1
    }

    pub fn change_set_config(&self) -> &ChangeSetConfig {
        &self.change_set_config
    }

    /// Identity for release commits
    pub fn commit_identity(&self) -> CommitIdentity {
        CommitIdentity {
            name: self.settings.git_user_name.clone(),
            email: self.settings.git_user_email.clone(),
            signoff: self.settings.signoff_commits,
        }
    }

    /// Check every component's files, reporting all problems together
    pub fn validate(&self) -> Result<()> {
        accumulate_errors("Repository is not set up for releases", |acc| {
            for component in &self.components {
                component.validate(self.root(), acc);
            }
            Ok(())
        })
    }

    /// Change set for `component` over `(from, to]`
    pub fn make_change_set(
        &self,
        component: &Component,
        from: Option<&str>,
        to: &str,
    ) -> Result<ChangeSet> {
        component.make_change_set(
            &self.git,
            &self.change_set_config,
            from,
            to,
            self.is_single_component(),
        )
    }

    /// Latest released version of `component` and its changes since then
    pub fn changes_since_release(
        &self,
        component: &Component,
        to: &str,
    ) -> Result<(Option<Version>, ChangeSet)> {
        let last = component.latest_tag_version(&self.git, to)?;
        let from = last.as_ref().map(|v| component.release_tag(v));
        let change_set = self.make_change_set(component, from.as_deref(), to)?;
        Ok((last, change_set))
    }

    /// Release branch for the given components
    ///
    /// A single component gets a stable branch so that repeated requests
    /// update one pull request; several components get a timestamped one.
    pub fn release_branch_name(&self, names: &[&str], now: DateTime<Utc>) -> String {
        let prefix = &self.settings.release_branch_prefix;
        match names {
            [name] => format!("{}/{}", prefix, name),
            _ => format!("{}/multi/{}", prefix, now.format("%Y%m%d%H%M%S")),
        }
    }

    pub fn is_release_branch(&self, branch: &str) -> bool {
        branch
            .strip_prefix(&self.settings.release_branch_prefix)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// The component a single-component release branch belongs to
    pub fn single_released_component(&self, branch: &str) -> Option<&Component> {
        let rest = branch
            .strip_prefix(&self.settings.release_branch_prefix)?
            .strip_prefix('/')?;
        if rest.starts_with("multi/") {
            return None;
        }
        self.component(rest)
    }

    /// Fail if the working tree has uncommitted changes
    pub fn check_clean(&self) -> Result<()> {
        if self.git.is_clean()? {
            Ok(())
        } else {
            Err(GitError::DirtyWorkingDirectory.into())
        }
    }

    /// Fail if the git remote is not the configured GitHub repository
    pub fn check_remote(&self) -> Result<()> {
        let Some(expected) = &self.settings.repo else {
            return Ok(());
        };
        let remote = &self.settings.git_remote;
        match self.git.remote_slug(remote)? {
            Some(slug) if slug.eq_ignore_ascii_case(expected) => Ok(()),
            Some(slug) => Err(WorkflowError::PreConditionFailed(format!(
                "remote {} points at {}, expected {}",
                remote, slug, expected
            ))
            .into()),
            None => Err(WorkflowError::PreConditionFailed(format!(
                "remote {} is not a GitHub repository",
                remote
            ))
            .into()),
        }
    }

    /// Wait for the required checks on `sha` to finish
    ///
    /// Returns the checks that failed, or, if `timeout` passes first, the
    /// ones still pending. An empty list means everything passed.
    #[instrument(skip(self))]
    pub fn wait_github_checks(&self, sha: &str, timeout: Duration) -> Result<Vec<String>> {
        let Some(pattern) = &self.settings.required_checks else {
            return Ok(Vec::new());
        };
        let required = Regex::new(pattern).map_err(|e| ConfigError::InvalidValue {
            field: "required_checks".to_string(),
            message: e.to_string(),
        })?;

        let deadline = Instant::now() + timeout;
        let mut attempt = 0;
        loop {
            let runs: Vec<_> = self
                .github
                .check_runs(sha)?
                .into_iter()
                .filter(|run| required.is_match(&run.name))
                .collect();

            let failed: Vec<String> = runs
                .iter()
                .filter(|run| run.is_completed() && !run.succeeded())
                .map(|run| {
                    format!(
                        "{} ({})",
                        run.name,
                        run.conclusion.as_deref().unwrap_or("unknown")
                    )
                })
                .collect();
            if !failed.is_empty() {
                warn!(sha, failed = failed.len(), "required checks failed");
                return Ok(failed);
            }

            let pending: Vec<String> = runs
                .iter()
                .filter(|run| !run.is_completed())
                .map(|run| format!("{} (still {})", run.name, run.status))
                .collect();
            if pending.is_empty() {
                info!(sha, checks = runs.len(), "required checks passed");
                return Ok(Vec::new());
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(sha, pending = pending.len(), "timed out waiting for checks");
                return Ok(pending);
            }
            let delay = self.polling.delay(attempt).min(deadline - now);
            debug!(sha, pending = pending.len(), delay_secs = delay.as_secs(), "waiting for checks");
            std::thread::sleep(delay);
            attempt += 1;
        }
    }

    /// Release pull requests in `state`, optionally merged as `merge_sha`
    pub fn find_release_prs(
        &self,
        state: PullRequestState,
        merge_sha: Option<&str>,
    ) -> Result<Vec<PullRequest>> {
        let prs = self.github.find_pull_requests(None, state)?;
        Ok(prs
            .into_iter()
            .filter(|pr| self.is_release_branch(pr.head_ref()))
            .filter(|pr| merge_sha.map_or(true, |sha| pr.merge_commit_sha.as_deref() == Some(sha)))
            .collect())
    }

    /// The open pull request for a release branch, if any
    pub fn find_open_release_pr(&self, branch: &str) -> Result<Option<PullRequest>> {
        Ok(self
            .github
            .find_pull_requests(Some(branch), PullRequestState::Open)?
            .into_iter()
            .next())
    }

    /// Components whose version changed in the commit `sha`
    ///
    /// A release commit bumps each released component's changelog and
    /// version file, so comparing `sha` with its first parent identifies
    /// what a merged release pull request released.
    #[instrument(skip(self))]
    pub fn released_components(&self, sha: &str) -> Result<Vec<(String, Version)>> {
        let parent = self.git.parent_sha(sha)?;
        let mut released = Vec::new();
        for component in &self.components {
            let Some(version) = component.current_version(&self.git, Some(sha))? else {
                continue;
            };
            let previous = match &parent {
                Some(parent) => component.current_version(&self.git, Some(parent))?,
                None => None,
            };
            if previous.as_ref() != Some(&version) {
                debug!(component = component.name(), version = %version, "component released");
                released.push((component.name().to_string(), version));
            }
        }
        Ok(released)
    }

    fn release_labels(&self) -> [&str; 4] {
        [
            &self.settings.release_pending_label,
            &self.settings.release_error_label,
            &self.settings.release_complete_label,
            &self.settings.release_aborted_label,
        ]
    }

    fn swapped_labels(&self, pr: &PullRequest, label: &str) -> Vec<String> {
        let release_labels = self.release_labels();
        let mut labels: Vec<String> = pr
            .label_names()
            .into_iter()
            .filter(|name| !release_labels.contains(&name.as_str()))
            .collect();
        labels.push(label.to_string());
        labels
    }

    /// Replace whatever release label `pr` carries with `label`
    pub fn update_release_label(&self, pr: &PullRequest, label: &str) -> Result<()> {
        let labels = self.swapped_labels(pr, label);
        info!(pr = pr.number, label, "updating release label");
        self.github.update_issue(pr.number, &IssueUpdate::labels(labels))
    }

    /// Mark an unmerged release pull request as aborted and close it
    #[instrument(skip(self))]
    pub fn abort_release_pr(&self, number: u64) -> Result<PullRequest> {
        let pr = self.github.pull_request(number)?;
        if !self.is_release_branch(pr.head_ref()) {
            return Err(WorkflowError::PreConditionFailed(format!(
                "pull request #{} is not a release request",
                number
            ))
            .into());
        }
        if pr.is_merged() {
            return Err(WorkflowError::PreConditionFailed(format!(
                "pull request #{} is already merged",
                number
            ))
            .into());
        }

        let update = IssueUpdate {
            labels: Some(self.swapped_labels(&pr, &self.settings.release_aborted_label)),
            state: Some("closed".to_string()),
            ..Default::default()
        };
        self.github.update_issue(number, &update)?;
        info!(pr = number, "aborted release request");
        Ok(pr)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::testing::{check_run, commit_file, crate_settings, pull_request, FakeGitHub, Fixture};
    use gantry_git::github::CheckRun;

    fn engine_and_macros() -> Fixture {
        Fixture::new(crate_settings(&["engine", "macros"], &[]), FakeGitHub::new())
    }

    #[test]
    fn test_components_and_groups() {
        let fixture = Fixture::new(
            crate_settings(&["engine", "macros", "cli"], &[&["engine", "macros"]]),
            FakeGitHub::new(),
        );
        let repo = &fixture.repo;
        assert_eq!(repo.components().len(), 3);
        assert!(!repo.is_single_component());

        let group = repo.require_component("macros").unwrap().group();
        let members: Vec<_> = repo.group_members(group).iter().map(|c| c.name()).collect();
        assert_eq!(members, vec!["engine", "macros"]);
        assert!(repo.require_component("nope").is_err());
        assert!(repo.validate().is_ok());
    }

    #[test]
    fn test_release_branch_names() {
        let fixture = engine_and_macros();
        let repo = &fixture.repo;
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();

        assert_eq!(repo.release_branch_name(&["engine"], now), "release/engine");
        assert_eq!(
            repo.release_branch_name(&["engine", "macros"], now),
            "release/multi/20240506070809"
        );

        assert!(repo.is_release_branch("release/engine"));
        assert!(!repo.is_release_branch("releases/engine"));
        assert_eq!(
            repo.single_released_component("release/engine").map(|c| c.name()),
            Some("engine")
        );
        assert!(repo
            .single_released_component("release/multi/20240506070809")
            .is_none());
        assert!(repo.single_released_component("feature/engine").is_none());
    }

    #[test]
    fn test_check_clean_and_remote() {
        let fixture = engine_and_macros();
        assert!(fixture.repo.check_clean().is_ok());
        assert!(fixture.repo.check_remote().is_ok());

        std::fs::write(fixture.root().join("scratch.txt"), "x").unwrap();
        assert!(fixture.repo.check_clean().is_err());

        let mut settings = crate_settings(&["engine"], &[]);
        settings.repo = Some("acme/other".to_string());
        let fixture = Fixture::new(settings, FakeGitHub::new());
        assert!(fixture.repo.check_remote().is_err());
    }

    #[test]
    fn test_wait_github_checks() {
        let github = FakeGitHub::new().with_check_runs(vec![
            check_run("ci / test", "success"),
            check_run("ci / lint", "failure"),
        ]);
        let fixture = Fixture::new(crate_settings(&["engine"], &[]), github);
        let failures = fixture
            .repo
            .wait_github_checks("abc", Duration::from_secs(0))
            .unwrap();
        assert_eq!(failures, vec!["ci / lint (failure)"]);
    }

    #[test]
    fn test_wait_github_checks_filters_and_times_out() {
        let pending = CheckRun {
            name: "deploy".to_string(),
            status: "in_progress".to_string(),
            conclusion: None,
        };
        let github = FakeGitHub::new().with_check_runs(vec![
            check_run("ci / test", "success"),
            check_run("nightly", "failure"),
            pending,
        ]);
        let mut settings = crate_settings(&["engine"], &[]);
        settings.required_checks = Some("^(ci|deploy)".to_string());
        let fixture = Fixture::new(settings, github);

        let outstanding = fixture
            .repo
            .wait_github_checks("abc", Duration::from_millis(0))
            .unwrap();
        assert_eq!(outstanding, vec!["deploy (still in_progress)"]);
    }

    #[test]
    fn test_wait_github_checks_passes() {
        let github = FakeGitHub::new().with_check_runs(vec![check_run("ci", "skipped")]);
        let fixture = Fixture::new(crate_settings(&["engine"], &[]), github);
        assert!(fixture
            .repo
            .wait_github_checks("abc", Duration::from_secs(5))
            .unwrap()
            .is_empty());
        assert_eq!(fixture.github.state().check_run_requests, 1);
    }

    #[test]
    fn test_check_polling_delay() {
        let polling = CheckPolling::default();
        assert_eq!(polling.delay(0), Duration::from_secs(10));
        assert_eq!(polling.delay(2), Duration::from_secs(30));
        assert_eq!(polling.delay(9), Duration::from_secs(60));
    }

    #[test]
    fn test_released_components() {
        let fixture = engine_and_macros();
        let sha = commit_file(
            fixture.git(),
            "macros/CHANGELOG.md",
            "# Release History\n\n### v0.2.0 / 2024-02-01\n\n* FIXED: Thing\n\n### v0.1.0 / 2024-01-01\n\n* Initial release\n",
            "release: macros 0.2.0",
        );

        let released = fixture.repo.released_components(&sha).unwrap();
        assert_eq!(
            released,
            vec![("macros".to_string(), Version::parse("0.2.0").unwrap())]
        );
    }

    #[test]
    fn test_find_release_prs() {
        let github = FakeGitHub::new()
            .with_pull_request(pull_request(1, "release/engine", "closed", Some("aaa"), &[]))
            .with_pull_request(pull_request(2, "feature/x", "closed", Some("aaa"), &[]))
            .with_pull_request(pull_request(3, "release/macros", "closed", Some("bbb"), &[]))
            .with_pull_request(pull_request(4, "release/macros", "open", None, &[]));
        let fixture = Fixture::new(crate_settings(&["engine", "macros"], &[]), github);

        let merged: Vec<_> = fixture
            .repo
            .find_release_prs(PullRequestState::Closed, Some("aaa"))
            .unwrap()
            .into_iter()
            .map(|pr| pr.number)
            .collect();
        assert_eq!(merged, vec![1]);

        let open = fixture.repo.find_open_release_pr("release/macros").unwrap();
        assert_eq!(open.map(|pr| pr.number), Some(4));
    }

    #[test]
    fn test_update_release_label_swaps_release_labels() {
        let github = FakeGitHub::new().with_pull_request(pull_request(
            7,
            "release/engine",
            "closed",
            Some("aaa"),
            &["release: pending", "infra"],
        ));
        let fixture = Fixture::new(crate_settings(&["engine"], &[]), github);
        let pr = fixture.github.pull_request(7).unwrap();

        fixture
            .repo
            .update_release_label(&pr, "release: complete")
            .unwrap();
        let pr = fixture.github.pull_request(7).unwrap();
        assert_eq!(pr.label_names(), vec!["infra", "release: complete"]);
    }

    #[test]
    fn test_abort_release_pr() {
        let github = FakeGitHub::new()
            .with_pull_request(pull_request(
                5,
                "release/engine",
                "open",
                None,
                &["release: pending"],
            ))
            .with_pull_request(pull_request(6, "release/engine", "closed", Some("aaa"), &[]));
        let fixture = Fixture::new(crate_settings(&["engine"], &[]), github);

        fixture.repo.abort_release_pr(5).unwrap();
        let pr = fixture.github.pull_request(5).unwrap();
        assert_eq!(pr.state, "closed");
        assert_eq!(pr.label_names(), vec!["release: aborted"]);

        assert!(fixture.repo.abort_release_pr(6).is_err());
    }
}
