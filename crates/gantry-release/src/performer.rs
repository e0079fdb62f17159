//! Performing releases
//!
//! The performer runs each released component's pipeline against a fixed
//! release commit, collects what happened into per-component results, and
//! reports them on the release pull request.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use gantry_core::{Accumulator, Result, Version};
use gantry_git::github::{PullRequest, PullRequestState};

use crate::artifacts::ArtifactDir;
use crate::package_index::PackageIndex;
use crate::repository::Repository;
use crate::steps::{Pipeline, PipelineOutcome, StepContext};

/// What happened while releasing one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentResult {
    name: String,
    version: Option<Version>,
    successes: Vec<String>,
    errors: Vec<String>,
    capturing: bool,
}

impl ComponentResult {
    pub fn new(name: impl Into<String>, version: Option<Version>) -> Self {
        Self {
            name: name.into(),
            version,
            successes: Vec::new(),
            errors: Vec::new(),
            capturing: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn successes(&self) -> &[String] {
        &self.successes
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn success(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!(result = %self.name, "{}", line);
        self.successes.push(line);
    }

    pub fn error(&mut self, line: impl Into<String>) {
        let line = line.into();
        error!(result = %self.name, "{}", line);
        self.errors.push(line);
    }

    /// Defer errors passed to [`capture`](Self::capture) into this result
    pub fn set_capturing(&mut self, capturing: bool) {
        self.capturing = capturing;
    }

    /// Unwrap `result`, recording its error instead of returning it when
    /// capturing
    pub fn capture<T>(&mut self, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if self.capturing => {
                for message in e.messages() {
                    self.error(message);
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn heading(&self) -> String {
        match &self.version {
            Some(version) => format!("{} {}", self.name, version),
            None => self.name.clone(),
        }
    }

    /// Markdown section for the report
    pub fn to_markdown(&self) -> String {
        let status = if self.has_errors() { "FAILED" } else { "OK" };
        let mut section = format!("### {} ({})\n\n", self.heading(), status);
        for line in &self.successes {
            section.push_str(&format!(" *  {}\n", line));
        }
        for line in &self.errors {
            section.push_str(&format!(" *  **ERROR:** {}\n", line));
        }
        if self.successes.is_empty() && self.errors.is_empty() {
            section.push_str(" *  Nothing to report\n");
        }
        section
    }
}

/// How a performer run is set up
#[derive(Debug, Clone, Default)]
pub struct PerformerOptions {
    /// Commit to release; defaults to the release pull request's merge
    /// commit, or HEAD
    pub release_ref: Option<String>,
    /// Release pull request
    pub pr_number: Option<u64>,
    pub dry_run: bool,
    /// Skip the clean tree, remote and GitHub check prechecks
    pub skip_checks: bool,
    /// Keep artifacts here instead of a temporary directory
    pub artifact_dir: Option<PathBuf>,
    /// Build and push docs even for components without pages enabled
    pub enable_docs: bool,
}

/// Runs release pipelines and reports the outcome
pub struct Performer<'a> {
    repo: &'a Repository,
    options: PerformerOptions,
    index: Arc<dyn PackageIndex>,
    artifacts: ArtifactDir,
    release_sha: Option<String>,
    pull_request: Option<PullRequest>,
    init_result: ComponentResult,
    results: Vec<ComponentResult>,
    aborted: bool,
}

impl<'a> Performer<'a> {
    /// Resolve the release commit and pull request and run the prechecks
    ///
    /// Problems found here are recorded in the setup result rather than
    /// returned; only an unusable artifact directory fails construction.
    #[instrument(skip(repo, index))]
    pub fn new(
        repo: &'a Repository,
        options: PerformerOptions,
        index: Arc<dyn PackageIndex>,
    ) -> Result<Self> {
        let artifacts = ArtifactDir::new(options.artifact_dir.clone())?;
        let mut performer = Self {
            repo,
            options,
            index,
            artifacts,
            release_sha: None,
            pull_request: None,
            init_result: ComponentResult::new("Setup", None),
            results: Vec::new(),
            aborted: false,
        };
        performer.init_result.set_capturing(true);
        performer.setup()?;
        Ok(performer)
    }

    fn setup(&mut self) -> Result<()> {
        let repo = self.repo;

        if let Some(number) = self.options.pr_number {
            if let Some(pr) = self.init_result.capture(repo.github().pull_request(number))? {
                match (&pr.merge_commit_sha, pr.is_merged()) {
                    (Some(sha), true) => self.release_sha = Some(sha.clone()),
                    _ => self
                        .init_result
                        .error(format!("Pull request #{} is not merged", number)),
                }
                self.pull_request = Some(pr);
            }
        }

        if let Some(rev) = &self.options.release_ref {
            let sha = self.init_result.capture(repo.git().rev_parse(rev).map_err(Into::into))?;
            if sha.is_some() {
                self.release_sha = sha;
            }
        }
        if self.release_sha.is_none() && self.options.pr_number.is_none() {
            self.release_sha = self.init_result.capture(repo.git().head_sha().map_err(Into::into))?;
        }

        let Some(sha) = self.release_sha.clone() else {
            return Ok(());
        };
        self.init_result.success(format!("Releasing commit {}", sha));

        if self.pull_request.is_none() {
            let found = self
                .init_result
                .capture(repo.find_release_prs(PullRequestState::Closed, Some(&sha)))?;
            self.pull_request = found.and_then(|prs| prs.into_iter().find(|pr| pr.is_merged()));
        }
        if let Some(pr) = &self.pull_request {
            self.init_result
                .success(format!("Release pull request #{}", pr.number));
        }

        if self.options.skip_checks {
            self.init_result.success("Prechecks skipped");
            return Ok(());
        }
        self.init_result.capture(repo.check_clean())?;
        self.init_result.capture(repo.check_remote())?;
        let timeout = Duration::from_secs(repo.settings().required_checks_timeout_secs);
        if let Some(outstanding) = self
            .init_result
            .capture(repo.wait_github_checks(&sha, timeout))?
        {
            for check in outstanding {
                self.init_result
                    .error(format!("GitHub check did not pass: {}", check));
            }
        }
        Ok(())
    }

    pub fn release_sha(&self) -> Option<&str> {
        self.release_sha.as_deref()
    }

    pub fn pull_request(&self) -> Option<&PullRequest> {
        self.pull_request.as_ref()
    }

    pub fn init_result(&self) -> &ComponentResult {
        &self.init_result
    }

    /// Results of the component releases, in the order they ran
    pub fn results(&self) -> &[ComponentResult] {
        &self.results
    }

    /// Whether the setup and every release succeeded
    pub fn succeeded(&self) -> bool {
        !self.init_result.has_errors() && self.results.iter().all(|r| !r.has_errors())
    }

    /// Release one component at `version`, outside the pull request flow
    pub fn perform_adhoc_release(&mut self, name: &str, version: &Version) -> Result<()> {
        self.perform_release(name, version)
    }

    /// Release everything the release pull request's merge commit released
    pub fn perform_pr_releases(&mut self) -> Result<()> {
        let Some(sha) = self.release_sha.clone() else {
            self.init_result.error("No release commit to release from");
            return Ok(());
        };
        if self.pull_request.is_none() {
            self.init_result
                .error(format!("No merged release pull request found for {}", sha));
            return Ok(());
        }

        let released = match self.init_result.capture(self.repo.released_components(&sha))? {
            Some(released) => released,
            None => return Ok(()),
        };
        if released.is_empty() {
            self.init_result
                .error(format!("Commit {} does not release any component", sha));
        }
        for (name, version) in released {
            self.perform_release(&name, &version)?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(version = %version))]
    fn perform_release(&mut self, name: &str, version: &Version) -> Result<()> {
        let mut result = ComponentResult::new(name, Some(version.clone()));
        result.set_capturing(true);

        if self.aborted {
            result.error("Not attempted because an earlier step aborted the run");
            self.results.push(result);
            return Ok(());
        }
        if self.init_result.has_errors() {
            result.error("Not attempted because setup failed");
            self.results.push(result);
            return Ok(());
        }
        let Some(sha) = self.release_sha.clone() else {
            result.error("Not attempted because there is no release commit");
            self.results.push(result);
            return Ok(());
        };

        let repo = self.repo;
        let Some(component) = result.capture(repo.require_component(name))? else {
            self.results.push(result);
            return Ok(());
        };
        let Some(pipeline) =
            result.capture(Pipeline::for_component(component, self.options.enable_docs))?
        else {
            self.results.push(result);
            return Ok(());
        };

        info!(component = name, sha = %sha, dry_run = self.options.dry_run, "releasing component");
        let artifacts = &self.artifacts;
        let index = self.index.as_ref();
        let dry_run = self.options.dry_run;

        let outcome = repo.git().at_sha(&sha, || -> Result<PipelineOutcome> {
            let mut acc = Accumulator::new(format!("{} {} version check", name, version));
            component.verify_version(repo.root(), version, &mut acc);
            if acc.has_errors() {
                for message in acc.errors() {
                    result.error(message.clone());
                }
                return Ok(PipelineOutcome::Stopped);
            }

            let mut ctx = StepContext {
                repo,
                component,
                version,
                release_sha: &sha,
                artifacts,
                index,
                dry_run,
                result: &mut result,
            };
            Ok(pipeline.run(&mut ctx))
        });

        match result.capture(outcome)? {
            Some(PipelineOutcome::AbortRun) => {
                warn!(component = name, "aborting remaining releases");
                self.aborted = true;
            }
            Some(_) | None => {}
        }
        self.results.push(result);
        Ok(())
    }

    /// Markdown report of the setup and every release
    pub fn report(&self) -> String {
        let title = if self.options.dry_run {
            "## Release results (dry run)\n\n"
        } else {
            "## Release results\n\n"
        };
        let mut report = String::from(title);
        report.push_str(&self.init_result.to_markdown());
        for result in &self.results {
            report.push('\n');
            report.push_str(&result.to_markdown());
        }
        report
    }

    /// Render the report and post it where it belongs
    ///
    /// Outside dry-run mode the release pull request, if known, gets the
    /// complete or error label and the report as a comment, and any error
    /// opens a tracking issue. Every post is attempted; failures are
    /// reported together afterwards.
    #[instrument(skip(self))]
    pub fn report_results(&self) -> Result<String> {
        let report = self.report();
        if self.options.dry_run {
            info!("DRY RUN: not posting release results");
            return Ok(report);
        }

        let repo = self.repo;
        let settings = repo.settings();
        let failed = !self.succeeded();
        let mut acc = Accumulator::new("Could not report release results");

        if let Some(pr) = &self.pull_request {
            let label = if failed {
                &settings.release_error_label
            } else {
                &settings.release_complete_label
            };
            acc.absorb(repo.update_release_label(pr, label));
            acc.absorb(repo.github().add_comment(pr.number, &report));
        }

        if failed {
            let title = match &self.pull_request {
                Some(pr) => format!("Release of #{} failed", pr.number),
                None => format!(
                    "Release of {} failed",
                    self.release_sha.as_deref().unwrap_or("unknown commit")
                ),
            };
            let mut body = String::new();
            if let Some(pr) = &self.pull_request {
                body.push_str(&format!("Release pull request: {}\n", pr.html_url));
            }
            if let Some(sha) = &self.release_sha {
                body.push_str(&format!("Release commit: {}\n", sha));
            }
            body.push('\n');
            body.push_str(&report);

            if let Some(issue) = acc.absorb(repo.github().create_issue(&title, &body)) {
                warn!(issue = issue.number, "opened release failure issue");
            }
        }

        acc.finish()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        check_run, commit_file, crate_settings, pull_request, FakeGitHub, FakeIndex, Fixture,
    };
    use gantry_core::config::{ComponentKind, ComponentSettings, Settings, StepKind, StepSettings};
    use gantry_core::{ExecOutput, GantryError};

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn package_pipeline() -> Vec<StepSettings> {
        vec![
            StepSettings::new(StepKind::BuildPackage),
            StepSettings::new(StepKind::ReleasePackage {
                source: "build_package".to_string(),
            }),
            StepSettings::new(StepKind::GithubRelease),
        ]
    }

    fn settings_with_steps(names: &[&str], steps: Vec<StepSettings>) -> Settings {
        let mut settings = crate_settings(names, &[]);
        for component in &mut settings.components {
            component.steps = Some(steps.clone());
        }
        settings
    }

    fn dry_run() -> PerformerOptions {
        PerformerOptions {
            dry_run: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_dry_run_is_repeatable_and_mutates_nothing() {
        let fixture = Fixture::new(
            settings_with_steps(&["engine"], package_pipeline()),
            FakeGitHub::new(),
        );

        let mut runs = Vec::new();
        for _ in 0..2 {
            let mut performer =
                Performer::new(&fixture.repo, dry_run(), Arc::new(FakeIndex::new())).unwrap();
            performer.perform_adhoc_release("engine", &v("0.1.0")).unwrap();
            performer.report_results().unwrap();
            assert!(performer.succeeded(), "{}", performer.report());
            runs.push(performer.results()[0].successes().to_vec());
        }

        assert_eq!(runs[0], runs[1]);
        assert_eq!(
            runs[0],
            vec![
                "Built package engine 0.1.0",
                "DRY RUN: would publish engine 0.1.0",
                "DRY RUN: would create GitHub release engine/v0.1.0",
            ]
        );
        assert_eq!(fixture.github.state().mutations(), 0);
        assert!(fixture.runner.matching("cargo publish").is_empty());
        assert_eq!(fixture.runner.matching("cargo package").len(), 2);
    }

    #[test]
    fn test_components_get_their_own_artifacts() {
        let fixture = Fixture::new(
            settings_with_steps(&["engine", "macros"], package_pipeline()),
            FakeGitHub::new(),
        );
        let mut performer =
            Performer::new(&fixture.repo, dry_run(), Arc::new(FakeIndex::new())).unwrap();
        performer.perform_adhoc_release("engine", &v("0.1.0")).unwrap();
        performer.perform_adhoc_release("macros", &v("0.1.0")).unwrap();
        assert!(performer.succeeded(), "{}", performer.report());

        let packaged = fixture.runner.matching("cargo package");
        assert_eq!(packaged.len(), 2);
        assert_ne!(packaged[0], packaged[1]);
        assert!(packaged[0].ends_with("/engine/build_package"), "{}", packaged[0]);
        assert!(packaged[1].ends_with("/macros/build_package"), "{}", packaged[1]);
    }

    #[test]
    fn test_published_package_is_skipped() {
        let fixture = Fixture::new(
            settings_with_steps(&["engine"], package_pipeline()),
            FakeGitHub::new(),
        );
        let index = Arc::new(FakeIndex::new().with_published("engine", "0.1.0"));

        let mut performer =
            Performer::new(&fixture.repo, PerformerOptions::default(), index).unwrap();
        performer.perform_adhoc_release("engine", &v("0.1.0")).unwrap();

        let result = &performer.results()[0];
        assert!(!result.has_errors(), "{:?}", result.errors());
        assert!(result
            .successes()
            .contains(&"Skipped release_package: engine 0.1.0 is already published".to_string()));
        assert!(fixture.runner.matching("cargo publish").is_empty());

        let state = fixture.github.state();
        assert_eq!(state.created_releases.len(), 1);
        assert_eq!(state.created_releases[0].tag_name, "engine/v0.1.0");
        assert_eq!(state.created_releases[0].body, "* Initial release");
    }

    #[test]
    fn test_existing_release_is_skipped() {
        let fixture = Fixture::new(
            settings_with_steps(&["engine"], vec![StepSettings::new(StepKind::GithubRelease)]),
            FakeGitHub::new().with_release("engine/v0.1.0"),
        );
        let mut performer = Performer::new(
            &fixture.repo,
            PerformerOptions::default(),
            Arc::new(FakeIndex::new()),
        )
        .unwrap();
        performer.perform_adhoc_release("engine", &v("0.1.0")).unwrap();

        assert_eq!(
            performer.results()[0].successes(),
            &["Skipped github_release: release engine/v0.1.0 already exists".to_string()]
        );
        assert!(fixture.github.state().created_releases.is_empty());
    }

    #[test]
    fn test_failed_step_stops_only_its_component() {
        let steps = vec![
            StepSettings::new(StepKind::Command {
                command: vec!["make".to_string(), "check".to_string()],
            })
            .named("check"),
            StepSettings::new(StepKind::GithubRelease),
        ];
        let fixture = Fixture::new(settings_with_steps(&["engine", "macros"], steps), FakeGitHub::new());
        fixture.runner.reply(&["make"], ExecOutput::failed("check failed"));

        let mut performer = Performer::new(
            &fixture.repo,
            PerformerOptions::default(),
            Arc::new(FakeIndex::new()),
        )
        .unwrap();
        performer.perform_adhoc_release("engine", &v("0.1.0")).unwrap();
        performer.perform_adhoc_release("macros", &v("0.1.0")).unwrap();

        let results = performer.results();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.has_errors()));
        assert_eq!(fixture.runner.matching("make check").len(), 2);
        assert!(fixture.github.state().created_releases.is_empty());
        assert_eq!(
            fixture.git().current_branch().unwrap().as_deref(),
            Some("main")
        );
    }

    #[test]
    fn test_aborting_step_stops_the_run() {
        let steps = vec![
            StepSettings::new(StepKind::Command {
                command: vec!["make".to_string(), "check".to_string()],
            })
            .named("check")
            .aborting(),
            StepSettings::new(StepKind::GithubRelease),
        ];
        let fixture = Fixture::new(settings_with_steps(&["engine", "macros"], steps), FakeGitHub::new());
        fixture.runner.reply(&["make"], ExecOutput::failed("check failed"));

        let mut performer = Performer::new(
            &fixture.repo,
            PerformerOptions::default(),
            Arc::new(FakeIndex::new()),
        )
        .unwrap();
        performer.perform_adhoc_release("engine", &v("0.1.0")).unwrap();
        performer.perform_adhoc_release("macros", &v("0.1.0")).unwrap();

        assert_eq!(fixture.runner.matching("make check").len(), 1);
        assert_eq!(
            performer.results()[1].errors(),
            &["Not attempted because an earlier step aborted the run".to_string()]
        );
    }

    #[test]
    fn test_version_mismatch_is_reported() {
        let fixture = Fixture::new(
            settings_with_steps(&["engine"], vec![StepSettings::new(StepKind::GithubRelease)]),
            FakeGitHub::new(),
        );
        let mut performer = Performer::new(&fixture.repo, dry_run(), Arc::new(FakeIndex::new())).unwrap();
        performer.perform_adhoc_release("engine", &v("0.2.0")).unwrap();

        assert_eq!(performer.results()[0].errors().len(), 2);
        assert!(performer.results()[0].successes().is_empty());
    }

    #[test]
    fn test_pr_release_flow() {
        let settings = Settings {
            components: vec![
                ComponentSettings::new("engine", ComponentKind::Crate)
                    .with_steps(vec![StepSettings::new(StepKind::GithubRelease)]),
                ComponentSettings::new("macros", ComponentKind::Crate)
                    .with_steps(vec![StepSettings::new(StepKind::GithubRelease)]),
            ],
            ..crate_settings(&[], &[])
        };
        let fixture = Fixture::new(settings, FakeGitHub::new());
        commit_file(
            fixture.git(),
            "macros/Cargo.toml",
            "[package]\nname = \"macros\"\nversion = \"0.2.0\"\nedition = \"2021\"\n",
            "chore: bump",
        );
        let sha = commit_file(
            fixture.git(),
            "macros/CHANGELOG.md",
            "# Release History\n\n### v0.2.0 / 2024-02-01\n\n* ADDED: Derives\n\n### v0.1.0 / 2024-01-01\n\n* Initial release\n",
            "release: macros 0.2.0",
        );
        fixture.github.state().pull_requests.push(pull_request(
            12,
            "release/macros",
            "closed",
            Some(&sha),
            &["release: pending"],
        ));

        let mut performer = Performer::new(
            &fixture.repo,
            PerformerOptions::default(),
            Arc::new(FakeIndex::new()),
        )
        .unwrap();
        assert_eq!(performer.pull_request().map(|pr| pr.number), Some(12));
        performer.perform_pr_releases().unwrap();
        let report = performer.report_results().unwrap();

        assert_eq!(performer.results().len(), 1);
        assert_eq!(performer.results()[0].name(), "macros");
        assert!(report.contains("### macros 0.2.0 (OK)"));

        let state = fixture.github.state();
        assert_eq!(state.created_releases[0].tag_name, "macros/v0.2.0");
        assert_eq!(state.created_releases[0].target_commitish, sha);
        assert_eq!(state.comments.len(), 1);
        assert!(state.issues.is_empty());
        assert_eq!(
            state.pull_requests[0].label_names(),
            vec!["release: complete"]
        );
    }

    #[test]
    fn test_failed_checks_block_release_and_open_issue() {
        let github = FakeGitHub::new()
            .with_check_runs(vec![check_run("ci", "failure")])
            .with_pull_request(pull_request(3, "release/engine", "closed", Some("aaa"), &[]));
        let fixture = Fixture::new(
            settings_with_steps(&["engine"], vec![StepSettings::new(StepKind::GithubRelease)]),
            github,
        );
        let sha = fixture.git().head_sha().unwrap();
        fixture.github.state().pull_requests[0].merge_commit_sha = Some(sha);

        let mut performer = Performer::new(
            &fixture.repo,
            PerformerOptions {
                pr_number: Some(3),
                ..Default::default()
            },
            Arc::new(FakeIndex::new()),
        )
        .unwrap();
        assert!(performer.init_result().has_errors());
        performer.perform_adhoc_release("engine", &v("0.1.0")).unwrap();
        performer.report_results().unwrap();

        assert_eq!(
            performer.results()[0].errors(),
            &["Not attempted because setup failed".to_string()]
        );
        let state = fixture.github.state();
        assert!(state.created_releases.is_empty());
        assert_eq!(state.issues.len(), 1);
        assert_eq!(state.issues[0].0, "Release of #3 failed");
        assert_eq!(state.pull_requests[0].label_names(), vec!["release: error"]);
    }

    #[test]
    fn test_failed_comment_still_opens_issue() {
        let github = FakeGitHub::new()
            .with_check_runs(vec![check_run("ci", "failure")])
            .with_pull_request(pull_request(3, "release/engine", "closed", Some("aaa"), &[]))
            .failing("update_issue")
            .failing("add_comment");
        let fixture = Fixture::new(
            settings_with_steps(&["engine"], vec![StepSettings::new(StepKind::GithubRelease)]),
            github,
        );
        let sha = fixture.git().head_sha().unwrap();
        fixture.github.state().pull_requests[0].merge_commit_sha = Some(sha);

        let performer = Performer::new(
            &fixture.repo,
            PerformerOptions {
                pr_number: Some(3),
                ..Default::default()
            },
            Arc::new(FakeIndex::new()),
        )
        .unwrap();
        assert!(performer.init_result().has_errors());

        let err = performer.report_results().unwrap_err();
        let messages = err.messages();
        assert_eq!(messages.len(), 2, "{:?}", messages);
        assert!(messages[0].contains("update_issue"));
        assert!(messages[1].contains("add_comment"));

        let state = fixture.github.state();
        assert_eq!(state.issues.len(), 1);
        assert_eq!(state.issues[0].0, "Release of #3 failed");
    }

    #[test]
    fn test_capture_records_errors() {
        let mut result = ComponentResult::new("engine", None);
        assert!(result
            .capture::<()>(Err(GantryError::other("boom")))
            .is_err());

        result.set_capturing(true);
        assert_eq!(
            result.capture::<()>(Err(GantryError::other("boom"))).unwrap(),
            None
        );
        assert_eq!(result.errors(), &["boom".to_string()]);
        assert!(result.to_markdown().contains("**ERROR:** boom"));
    }
}
