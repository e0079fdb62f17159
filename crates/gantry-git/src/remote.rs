//! Remote operations
//!
//! Network operations run through the `git` binary so they pick up the
//! user's credential helpers and SSH configuration.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, instrument};

use gantry_core::error::GitError;
use gantry_core::exec::{argv, ExecOptions};
use gantry_core::SharedRunner;

use crate::repository::{GitRepo, Result};

/// Regex for GitHub remote URLs
static GITHUB_REMOTE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"github\.com[:/]([^/\s]+)/([^/\s]+?)(?:\.git)?/?$").expect("Invalid regex")
});

impl GitRepo {
    /// Get the URL for a remote
    pub fn remote_url(&self, name: &str) -> Result<String> {
        match self.repo.find_remote(name) {
            Ok(remote) => remote
                .url()
                .map(|s| s.to_string())
                .ok_or_else(|| GitError::RemoteNotFound(name.to_string())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                Err(GitError::RemoteNotFound(name.to_string()))
            }
            Err(e) => Err(GitError::Git2(e)),
        }
    }

    /// The `owner/name` slug of a GitHub remote
    pub fn remote_slug(&self, name: &str) -> Result<Option<String>> {
        Ok(repo_slug_from_url(&self.remote_url(name)?))
    }

    /// Fetch a remote, including tags
    #[instrument(skip(self))]
    pub fn fetch(&self, remote: &str) -> Result<()> {
        let start = std::time::Instant::now();
        self.git_cli(&["fetch", "--tags", "--force", remote])?;
        info!(remote, duration_ms = start.elapsed().as_millis(), "fetched remote");
        Ok(())
    }

    /// Push a local branch to a remote
    #[instrument(skip(self))]
    pub fn push_branch(&self, remote: &str, branch: &str, force: bool) -> Result<()> {
        let start = std::time::Instant::now();
        let refspec = format!("refs/heads/{}:refs/heads/{}", branch, branch);
        let mut args = vec!["push"];
        if force {
            args.push("--force");
        }
        args.extend([remote, refspec.as_str()]);

        self.git_cli(&args).map_err(|e| {
            GitError::PushFailed(format!("Failed to push to {}/{}: {}", remote, branch, e))
        })?;

        info!(
            remote,
            branch,
            duration_ms = start.elapsed().as_millis(),
            "pushed branch"
        );
        Ok(())
    }
}

/// Clone a single branch of `url` into `dest`
#[instrument(skip(runner))]
pub fn clone_branch(runner: &SharedRunner, url: &str, branch: &str, dest: &Path) -> Result<()> {
    let dest_str = dest.display().to_string();
    let command = argv([
        "git", "clone", "--depth", "1", "--branch", branch, url, &dest_str,
    ]);
    runner
        .exec(&command, &ExecOptions::checked())
        .map_err(|e| GitError::CommandFailed {
            command: command[1..].join(" "),
            stderr: e.to_string(),
        })?;
    info!(url, branch, dest = %dest.display(), "cloned branch");
    Ok(())
}

/// Extract `owner/name` from a GitHub remote URL
///
/// Handles `git@github.com:owner/name.git`, `ssh://git@github.com/owner/name`
/// and `https://github.com/owner/name.git` forms.
pub fn repo_slug_from_url(url: &str) -> Option<String> {
    let captures = GITHUB_REMOTE_REGEX.captures(url.trim())?;
    Some(format!("{}/{}", &captures[1], &captures[2]))
}
