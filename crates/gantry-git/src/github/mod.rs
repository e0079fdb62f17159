//! GitHub access
//!
//! The [`GitHub`] trait covers the REST calls the release workflow needs.
//! [`GhCli`] implements it on top of the `gh api` command.

mod gh;
mod types;

pub use gh::GhCli;
pub use types::{
    BranchRef, CheckRun, Issue, IssueUpdate, Label, NewPullRequest, NewRelease, PullRequest,
    PullRequestState,
};

use gantry_core::Result;

/// GitHub operations used by release requests and the performer
pub trait GitHub: Send + Sync {
    /// Fetch a single pull request
    fn pull_request(&self, number: u64) -> Result<PullRequest>;

    /// List pull requests, optionally restricted to a head branch
    fn find_pull_requests(
        &self,
        head: Option<&str>,
        state: PullRequestState,
    ) -> Result<Vec<PullRequest>>;

    /// Open a pull request
    fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest>;

    /// Update title, body, labels or state of an issue or pull request
    fn update_issue(&self, number: u64, update: &IssueUpdate) -> Result<()>;

    /// Comment on an issue or pull request
    fn add_comment(&self, number: u64, body: &str) -> Result<()>;

    /// Check runs reported for a commit
    fn check_runs(&self, sha: &str) -> Result<Vec<CheckRun>>;

    /// Create a release (and its tag, if missing)
    fn create_release(&self, release: &NewRelease) -> Result<()>;

    /// Whether a release exists for a tag
    fn release_exists(&self, tag: &str) -> Result<bool>;

    /// Open an issue
    fn create_issue(&self, title: &str, body: &str) -> Result<Issue>;
}
