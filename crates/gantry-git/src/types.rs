//! Git types

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Information about a git commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Commit hash (full)
    pub hash: String,
    /// Short hash (first 7 characters)
    pub short_hash: String,
    /// Full commit message, summary and body
    pub message: String,
    /// Author name
    pub author: String,
    /// Author email
    pub author_email: String,
    /// Commit timestamp
    pub timestamp: DateTime<Utc>,
    /// Paths touched relative to the first parent (or the empty tree)
    pub files: Vec<PathBuf>,
}

impl CommitInfo {
    /// Create a new CommitInfo
    pub fn new(
        hash: impl Into<String>,
        message: impl Into<String>,
        author: impl Into<String>,
        author_email: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let hash = hash.into();
        let short_hash = hash.chars().take(7).collect();

        Self {
            hash,
            short_hash,
            message: message.into(),
            author: author.into(),
            author_email: author_email.into(),
            timestamp,
            files: Vec::new(),
        }
    }

    /// Set the touched files
    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.files = files;
        self
    }

    /// First line of the message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Whether the commit touched anything under `dir`
    ///
    /// An empty directory (the repository root) matches every commit that
    /// touched at least one file.
    pub fn touches(&self, dir: &std::path::Path) -> bool {
        let root = dir.as_os_str().is_empty() || dir == std::path::Path::new(".");
        self.files.iter().any(|f| root || f.starts_with(dir))
    }
}
