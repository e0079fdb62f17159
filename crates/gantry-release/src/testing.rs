//! In-memory test doubles and repository fixtures
//!
//! Available to this crate's tests and, through the `testing` feature, to
//! other crates' tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tempfile::TempDir;

use gantry_core::config::{ComponentKind, ComponentSettings, Settings};
use gantry_core::error::GitHubError;
use gantry_core::{CommandRunner, ExecOptions, ExecOutput, GantryError, Result, Version};
use gantry_git::github::{
    BranchRef, CheckRun, Issue, IssueUpdate, Label, NewPullRequest, NewRelease, PullRequest,
    PullRequestState,
};
use gantry_git::{CommitIdentity, GitHub, GitRepo};

use crate::package_index::PackageIndex;
use crate::repository::{CheckPolling, Repository};

/// A command seen by [`RecordingRunner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub stdin: Option<String>,
}

impl RecordedCall {
    /// The command line joined with spaces
    pub fn line(&self) -> String {
        self.argv.join(" ")
    }
}

/// Command runner that records every call and replies from a script
///
/// Commands without a scripted reply succeed with empty output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<RecordedCall>>,
    replies: Mutex<Vec<(Vec<String>, ExecOutput)>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `output` to commands starting with `prefix`
    pub fn reply(&self, prefix: &[&str], output: ExecOutput) {
        let prefix = prefix.iter().map(|s| s.to_string()).collect();
        lock(&self.replies).push((prefix, output));
    }

    /// Every recorded call, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Every recorded command line, in order
    pub fn lines(&self) -> Vec<String> {
        lock(&self.calls).iter().map(RecordedCall::line).collect()
    }

    /// Recorded command lines starting with `prefix`
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.starts_with(prefix))
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn exec(&self, argv: &[String], options: &ExecOptions) -> Result<ExecOutput> {
        lock(&self.calls).push(RecordedCall {
            argv: argv.to_vec(),
            cwd: options.cwd.clone(),
            stdin: options.stdin.clone(),
        });

        let output = lock(&self.replies)
            .iter()
            .find(|(prefix, _)| argv.starts_with(prefix))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| ExecOutput::ok(""));

        if options.check && !output.success {
            return Err(GantryError::command(argv.join(" "), output.stderr.clone()));
        }
        Ok(output)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Recorded GitHub state
#[derive(Debug, Default)]
pub struct FakeGitHubState {
    pub pull_requests: Vec<PullRequest>,
    /// Tags that already have a release
    pub releases: HashSet<String>,
    pub created_releases: Vec<NewRelease>,
    pub check_runs: Vec<CheckRun>,
    pub comments: Vec<(u64, String)>,
    pub issues: Vec<(String, String)>,
    pub updates: Vec<(u64, IssueUpdate)>,
    pub check_run_requests: usize,
    /// Calls that fail with a server error
    pub failing: HashSet<String>,
}

impl FakeGitHubState {
    fn fail_if_configured(&self, call: &str) -> Result<()> {
        if self.failing.contains(call) {
            return Err(GitHubError::RequestFailed {
                method: "POST".to_string(),
                path: call.to_string(),
                reason: "502 Bad Gateway".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Number of calls that would have changed something on GitHub
    pub fn mutations(&self) -> usize {
        self.created_releases.len() + self.comments.len() + self.issues.len() + self.updates.len()
    }
}

/// In-memory [`GitHub`]
#[derive(Debug, Default)]
pub struct FakeGitHub {
    state: Mutex<FakeGitHubState>,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pull_request(self, pr: PullRequest) -> Self {
        lock(&self.state).pull_requests.push(pr);
        self
    }

    pub fn with_release(self, tag: &str) -> Self {
        lock(&self.state).releases.insert(tag.to_string());
        self
    }

    pub fn with_check_runs(self, runs: Vec<CheckRun>) -> Self {
        lock(&self.state).check_runs = runs;
        self
    }

    /// Make a call (`update_issue`, `add_comment`, `create_issue`) fail
    pub fn failing(self, call: &str) -> Self {
        lock(&self.state).failing.insert(call.to_string());
        self
    }

    /// Inspect the recorded state
    pub fn state(&self) -> MutexGuard<'_, FakeGitHubState> {
        lock(&self.state)
    }
}

/// Build a pull request for tests
pub fn pull_request(
    number: u64,
    head: &str,
    state: &str,
    merge_commit_sha: Option<&str>,
    labels: &[&str],
) -> PullRequest {
    PullRequest {
        number,
        title: format!("PR {}", number),
        body: None,
        state: state.to_string(),
        labels: labels
            .iter()
            .map(|name| Label {
                name: name.to_string(),
            })
            .collect(),
        head: BranchRef {
            ref_name: head.to_string(),
            sha: String::new(),
        },
        merge_commit_sha: merge_commit_sha.map(str::to_string),
        merged_at: merge_commit_sha.map(|_| "2024-01-01T00:00:00Z".to_string()),
        html_url: format!("https://github.com/acme/rockets/pull/{}", number),
    }
}

/// A completed check run
pub fn check_run(name: &str, conclusion: &str) -> CheckRun {
    CheckRun {
        name: name.to_string(),
        status: "completed".to_string(),
        conclusion: Some(conclusion.to_string()),
    }
}

impl GitHub for FakeGitHub {
    fn pull_request(&self, number: u64) -> Result<PullRequest> {
        self.state()
            .pull_requests
            .iter()
            .find(|pr| pr.number == number)
            .cloned()
            .ok_or_else(|| GitHubError::PullRequestNotFound(number).into())
    }

    fn find_pull_requests(
        &self,
        head: Option<&str>,
        state: PullRequestState,
    ) -> Result<Vec<PullRequest>> {
        Ok(self
            .state()
            .pull_requests
            .iter()
            .filter(|pr| head.map_or(true, |h| pr.head_ref() == h))
            .filter(|pr| match state {
                PullRequestState::All => true,
                PullRequestState::Open => pr.is_open(),
                PullRequestState::Closed => !pr.is_open(),
            })
            .cloned()
            .collect())
    }

    fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest> {
        let mut state = self.state();
        let number = state.pull_requests.iter().map(|p| p.number).max().unwrap_or(0) + 1;
        let mut pr = pull_request(number, &request.head, "open", None, &[]);
        pr.title = request.title.clone();
        pr.body = Some(request.body.clone());
        state.pull_requests.push(pr.clone());
        Ok(pr)
    }

    fn update_issue(&self, number: u64, update: &IssueUpdate) -> Result<()> {
        let mut state = self.state();
        state.fail_if_configured("update_issue")?;
        if let Some(pr) = state.pull_requests.iter_mut().find(|p| p.number == number) {
            if let Some(labels) = &update.labels {
                pr.labels = labels
                    .iter()
                    .map(|name| Label { name: name.clone() })
                    .collect();
            }
            if let Some(s) = &update.state {
                pr.state = s.clone();
            }
            if let Some(title) = &update.title {
                pr.title = title.clone();
            }
            if let Some(body) = &update.body {
                pr.body = Some(body.clone());
            }
        }
        state.updates.push((number, update.clone()));
        Ok(())
    }

    fn add_comment(&self, number: u64, body: &str) -> Result<()> {
        let mut state = self.state();
        state.fail_if_configured("add_comment")?;
        state.comments.push((number, body.to_string()));
        Ok(())
    }

    fn check_runs(&self, _sha: &str) -> Result<Vec<CheckRun>> {
        let mut state = self.state();
        state.check_run_requests += 1;
        Ok(state.check_runs.clone())
    }

    fn create_release(&self, release: &NewRelease) -> Result<()> {
        let mut state = self.state();
        state.releases.insert(release.tag_name.clone());
        state.created_releases.push(release.clone());
        Ok(())
    }

    fn release_exists(&self, tag: &str) -> Result<bool> {
        Ok(self.state().releases.contains(tag))
    }

    fn create_issue(&self, title: &str, body: &str) -> Result<Issue> {
        let mut state = self.state();
        state.fail_if_configured("create_issue")?;
        state.issues.push((title.to_string(), body.to_string()));
        Ok(Issue {
            number: 1000 + state.issues.len() as u64,
            html_url: String::new(),
        })
    }
}

/// In-memory [`PackageIndex`]
#[derive(Debug, Default)]
pub struct FakeIndex {
    published: Mutex<HashSet<(String, String)>>,
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_published(self, name: &str, version: &str) -> Self {
        lock(&self.published).insert((name.to_string(), version.to_string()));
        self
    }
}

impl PackageIndex for FakeIndex {
    fn is_published(&self, name: &str, version: &Version) -> Result<bool> {
        Ok(lock(&self.published).contains(&(name.to_string(), version.to_string())))
    }
}

/// Identity used for fixture commits
pub fn identity() -> CommitIdentity {
    CommitIdentity {
        name: Some("Test".to_string()),
        email: Some("test@example.com".to_string()),
        signoff: false,
    }
}

/// Commit everything in the working tree
pub fn commit(git: &GitRepo, message: &str) -> String {
    git.commit_all(message, &identity())
        .expect("fixture commit failed")
}

/// Write `content` to `path` under `root` and commit it
pub fn commit_file(git: &GitRepo, path: &str, content: &str, message: &str) -> String {
    let full = git.path().join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&full, content).unwrap();
    commit(git, message)
}

/// A git repository on `main` holding one crate per name
///
/// Each crate has a `Cargo.toml` at version 0.1.0 and a changelog with a
/// matching entry.
pub fn init_workspace(names: &[&str]) -> (TempDir, GitRepo) {
    let temp = TempDir::new().unwrap();
    let git = GitRepo::init(temp.path(), "main").unwrap();
    for name in names {
        write_crate(temp.path(), name);
    }
    std::fs::write(temp.path().join("README.md"), "# workspace\n").unwrap();
    commit(&git, "Initial commit");
    (temp, git)
}

fn write_crate(root: &Path, name: &str) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("Cargo.toml"),
        format!(
            "[package]\nname = \"{}\"\nversion = \"0.1.0\"\nedition = \"2021\"\n",
            name
        ),
    )
    .unwrap();
    std::fs::write(
        dir.join("CHANGELOG.md"),
        "# Release History\n\n### v0.1.0 / 2024-01-01\n\n* Initial release\n",
    )
    .unwrap();
}

/// Settings for crates named `names`, with optional coordination groups
pub fn crate_settings(names: &[&str], groups: &[&[&str]]) -> Settings {
    Settings {
        repo: Some("acme/rockets".to_string()),
        git_user_name: Some("Test".to_string()),
        git_user_email: Some("test@example.com".to_string()),
        components: names
            .iter()
            .map(|n| ComponentSettings::new(*n, ComponentKind::Crate))
            .collect(),
        coordination_groups: groups
            .iter()
            .map(|g| g.iter().map(|s| s.to_string()).collect())
            .collect(),
        ..Default::default()
    }
}

/// Everything a repository test needs, wired together
pub struct Fixture {
    pub temp: TempDir,
    pub runner: Arc<RecordingRunner>,
    pub github: Arc<FakeGitHub>,
    pub repo: Repository,
}

impl Fixture {
    /// A workspace of crates with the given settings and fake collaborators
    pub fn new(settings: Settings, github: FakeGitHub) -> Self {
        let names: Vec<&str> = settings.components.iter().map(|c| c.name.as_str()).collect();
        let (temp, git) = init_workspace(&names);
        git.inner()
            .remote("origin", "git@github.com:acme/rockets.git")
            .unwrap();

        let runner = Arc::new(RecordingRunner::new());
        let github = Arc::new(github);
        let git = git.with_runner(runner.clone());
        let repo = Repository::new(settings, git, github.clone(), runner.clone())
            .with_check_polling(CheckPolling::immediate());
        Self {
            temp,
            runner,
            github,
            repo,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn git(&self) -> &GitRepo {
        self.repo.git()
    }
}
