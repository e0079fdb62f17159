//! Commit history operations

use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use git2::{Oid, Sort};
use tracing::{debug, instrument};

use crate::repository::{GitRepo, Result};
use crate::types::CommitInfo;

impl GitRepo {
    /// Commits reachable from `to` but not from `from`, oldest first
    ///
    /// With no `from`, the whole history of `to` is returned.
    #[instrument(skip(self))]
    pub fn commits_between(&self, from: Option<&str>, to: &str) -> Result<Vec<CommitInfo>> {
        let to_oid = Oid::from_str(&self.rev_parse(to)?)?;

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        revwalk.push(to_oid)?;
        if let Some(from) = from {
            revwalk.hide(Oid::from_str(&self.rev_parse(from)?)?)?;
        }

        let mut commits = Vec::new();
        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;
            let files = self.changed_files(&commit)?;
            commits.push(commit_to_info(&commit).with_files(files));
        }

        debug!(count = commits.len(), "collected commits");
        Ok(commits)
    }

    /// Get a specific commit by revision
    pub fn get_commit(&self, rev: &str) -> Result<CommitInfo> {
        let oid = Oid::from_str(&self.rev_parse(rev)?)?;
        let commit = self.repo.find_commit(oid)?;
        let files = self.changed_files(&commit)?;
        Ok(commit_to_info(&commit).with_files(files))
    }

    /// Paths changed by `commit` relative to its first parent
    fn changed_files(&self, commit: &git2::Commit<'_>) -> Result<Vec<PathBuf>> {
        let tree = commit.tree()?;
        let parent_tree = match commit.parents().next() {
            Some(parent) => Some(parent.tree()?),
            None => None,
        };

        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

        let mut files = Vec::new();
        for delta in diff.deltas() {
            for path in [delta.old_file().path(), delta.new_file().path()]
                .into_iter()
                .flatten()
            {
                if !files.iter().any(|f: &PathBuf| f == path) {
                    files.push(path.to_path_buf());
                }
            }
        }
        Ok(files)
    }
}

/// Convert a git2 Commit to CommitInfo
fn commit_to_info(commit: &git2::Commit<'_>) -> CommitInfo {
    let author = commit.author();
    let timestamp = Utc
        .timestamp_opt(commit.time().seconds(), 0)
        .single()
        .unwrap_or_else(Utc::now);

    CommitInfo::new(
        commit.id().to_string(),
        commit.message().unwrap_or(""),
        author.name().unwrap_or("Unknown"),
        author.email().unwrap_or("unknown@example.com"),
        timestamp,
    )
}
