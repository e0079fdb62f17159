//! Gantry Git - Git and GitHub operations for release orchestration
//!
//! This crate provides repository access (history, tags, temporary
//! checkouts, commits), the network operations that shell out to `git`,
//! and the GitHub client used for pull requests, checks and releases.

mod checkout;
mod commits;
pub mod github;
mod remote;
mod repository;
mod tags;
pub mod types;

pub use checkout::{CommitIdentity, DEFAULT_COMMIT_EMAIL, DEFAULT_COMMIT_NAME};
pub use github::{GhCli, GitHub};
pub use remote::{clone_branch, repo_slug_from_url};
pub use repository::{GitRepo, Result};
pub use types::CommitInfo;
