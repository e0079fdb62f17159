//! GitHub client backed by the `gh` CLI

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument};

use gantry_core::error::GitHubError;
use gantry_core::exec::{argv, ExecOptions};
use gantry_core::{Result, SharedRunner};

use super::types::{
    CheckRun, Issue, IssueUpdate, NewPullRequest, NewRelease, PullRequest, PullRequestState,
};
use super::GitHub;

/// Issues `gh api` requests for one repository
pub struct GhCli {
    runner: SharedRunner,
    repo: String,
}

impl GhCli {
    /// Create a client for `owner/name`
    pub fn new(runner: SharedRunner, repo: impl Into<String>) -> Self {
        Self {
            runner,
            repo: repo.into(),
        }
    }

    /// The `owner/name` slug this client talks to
    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn owner(&self) -> &str {
        self.repo.split('/').next().unwrap_or_default()
    }

    /// Run `gh api` and parse the JSON response
    ///
    /// A request body, when given, is fed to `gh` on stdin.
    fn api(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value> {
        let mut command = argv(["gh", "api", path, "--method", method]);
        let mut options = ExecOptions::default();
        if let Some(body) = body {
            command.extend(argv(["--input", "-"]));
            options = options.with_stdin(body.to_string());
        }

        debug!(method, path, "calling GitHub API");
        let output = self.runner.exec(&command, &options)?;
        if !output.success {
            return Err(GitHubError::RequestFailed {
                method: method.to_string(),
                path: path.to_string(),
                reason: output.stderr.trim().to_string(),
            }
            .into());
        }

        if output.stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&output.stdout)?)
    }

    fn api_as<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        let value = self.api(method, path, body)?;
        serde_json::from_value(value).map_err(|e| {
            GitHubError::UnexpectedResponse(format!("{} {}: {}", method, path, e)).into()
        })
    }
}

fn is_not_found(err: &gantry_core::GantryError) -> bool {
    matches!(
        err,
        gantry_core::GantryError::GitHub(GitHubError::RequestFailed { reason, .. })
            if reason.contains("HTTP 404") || reason.contains("Not Found")
    )
}

impl GitHub for GhCli {
    #[instrument(skip(self))]
    fn pull_request(&self, number: u64) -> Result<PullRequest> {
        let path = format!("repos/{}/pulls/{}", self.repo, number);
        self.api_as("GET", &path, None).map_err(|e| {
            if is_not_found(&e) {
                GitHubError::PullRequestNotFound(number).into()
            } else {
                e
            }
        })
    }

    #[instrument(skip(self))]
    fn find_pull_requests(
        &self,
        head: Option<&str>,
        state: PullRequestState,
    ) -> Result<Vec<PullRequest>> {
        let mut path = format!(
            "repos/{}/pulls?state={}&per_page=100",
            self.repo,
            state.as_str()
        );
        if let Some(head) = head {
            path.push_str(&format!("&head={}:{}", self.owner(), head));
        }
        let prs: Vec<PullRequest> = self.api_as("GET", &path, None)?;
        debug!(count = prs.len(), "listed pull requests");
        Ok(prs)
    }

    #[instrument(skip(self, request), fields(head = %request.head))]
    fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest> {
        let path = format!("repos/{}/pulls", self.repo);
        let body = serde_json::to_value(request)?;
        let pr: PullRequest = self.api_as("POST", &path, Some(&body))?;
        info!(number = pr.number, "opened pull request");
        Ok(pr)
    }

    #[instrument(skip(self, update))]
    fn update_issue(&self, number: u64, update: &IssueUpdate) -> Result<()> {
        let path = format!("repos/{}/issues/{}", self.repo, number);
        let body = serde_json::to_value(update)?;
        self.api("PATCH", &path, Some(&body))?;
        Ok(())
    }

    #[instrument(skip(self, body))]
    fn add_comment(&self, number: u64, body: &str) -> Result<()> {
        let path = format!("repos/{}/issues/{}/comments", self.repo, number);
        self.api("POST", &path, Some(&serde_json::json!({ "body": body })))?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn check_runs(&self, sha: &str) -> Result<Vec<CheckRun>> {
        #[derive(serde::Deserialize)]
        struct CheckRuns {
            check_runs: Vec<CheckRun>,
        }

        let path = format!("repos/{}/commits/{}/check-runs?per_page=100", self.repo, sha);
        let runs: CheckRuns = self.api_as("GET", &path, None)?;
        Ok(runs.check_runs)
    }

    #[instrument(skip(self, release), fields(tag = %release.tag_name))]
    fn create_release(&self, release: &NewRelease) -> Result<()> {
        let path = format!("repos/{}/releases", self.repo);
        let body = serde_json::to_value(release)?;
        self.api("POST", &path, Some(&body))?;
        info!(tag = %release.tag_name, "created GitHub release");
        Ok(())
    }

    #[instrument(skip(self))]
    fn release_exists(&self, tag: &str) -> Result<bool> {
        let path = format!("repos/{}/releases/tags/{}", self.repo, tag);
        match self.api("GET", &path, None) {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, body))]
    fn create_issue(&self, title: &str, body: &str) -> Result<Issue> {
        let path = format!("repos/{}/issues", self.repo);
        let payload = serde_json::json!({ "title": title, "body": body });
        let issue: Issue = self.api_as("POST", &path, Some(&payload))?;
        info!(number = issue.number, "opened issue");
        Ok(issue)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use gantry_core::{CommandRunner, ExecOutput, GantryError};

    use super::*;

    /// Replies to every command with a fixed output and records the calls
    struct ScriptedRunner {
        reply: ExecOutput,
        calls: Mutex<Vec<(Vec<String>, Option<String>)>>,
    }

    impl CommandRunner for ScriptedRunner {
        fn exec(&self, argv: &[String], options: &ExecOptions) -> Result<ExecOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((argv.to_vec(), options.stdin.clone()));
            Ok(self.reply.clone())
        }
    }

    fn client(reply: ExecOutput) -> (Arc<ScriptedRunner>, GhCli) {
        let runner = Arc::new(ScriptedRunner {
            reply,
            calls: Mutex::new(Vec::new()),
        });
        let gh = GhCli::new(runner.clone(), "acme/rockets");
        (runner, gh)
    }

    #[test]
    fn test_pull_request_request_shape() {
        let (runner, gh) = client(ExecOutput::ok(
            r#"{"number": 7, "state": "open", "head": {"ref": "release/engine"}}"#,
        ));
        let pr = gh.pull_request(7).unwrap();
        assert_eq!(pr.number, 7);

        let calls = runner.calls.lock().unwrap();
        assert_eq!(
            calls[0].0,
            argv(["gh", "api", "repos/acme/rockets/pulls/7", "--method", "GET"])
        );
        assert_eq!(calls[0].1, None);
    }

    #[test]
    fn test_body_is_sent_on_stdin() {
        let (runner, gh) = client(ExecOutput::ok(""));
        gh.add_comment(3, "hello").unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].0[5..], argv(["--input", "-"])[..]);
        let sent: Value = serde_json::from_str(calls[0].1.as_deref().unwrap()).unwrap();
        assert_eq!(sent["body"], "hello");
    }

    #[test]
    fn test_release_exists_maps_404_to_false() {
        let (_runner, gh) = client(ExecOutput::failed("gh: Not Found (HTTP 404)"));
        assert!(!gh.release_exists("engine/v1.0.0").unwrap());
    }

    #[test]
    fn test_missing_pull_request() {
        let (_runner, gh) = client(ExecOutput::failed("gh: Not Found (HTTP 404)"));
        assert!(matches!(
            gh.pull_request(99),
            Err(GantryError::GitHub(GitHubError::PullRequestNotFound(99)))
        ));
    }

    #[test]
    fn test_other_failures_propagate() {
        let (_runner, gh) = client(ExecOutput::failed("HTTP 500"));
        assert!(gh.release_exists("x").is_err());
    }

    #[test]
    fn test_find_pull_requests_by_head() {
        let (runner, gh) = client(ExecOutput::ok("[]"));
        let prs = gh
            .find_pull_requests(Some("release/engine"), PullRequestState::Open)
            .unwrap();
        assert!(prs.is_empty());
        let calls = runner.calls.lock().unwrap();
        assert_eq!(
            calls[0].0[2],
            "repos/acme/rockets/pulls?state=open&per_page=100&head=acme:release/engine"
        );
    }
}
