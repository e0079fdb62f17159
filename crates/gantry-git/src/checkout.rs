//! Branch, checkout and commit operations

use std::path::Path;

use git2::build::CheckoutBuilder;
use git2::{BranchType, IndexAddOption, Oid, Signature};
use tracing::{debug, info, instrument, warn};

use gantry_core::error::GitError;

use crate::repository::{GitRepo, Result};

/// Where HEAD pointed before a temporary checkout
#[derive(Debug, Clone, PartialEq, Eq)]
enum HeadState {
    Branch(String),
    Detached(String),
}

/// Restores HEAD when dropped, unless already restored
struct RestoreGuard<'a> {
    repo: &'a GitRepo,
    original: HeadState,
    restored: bool,
}

impl RestoreGuard<'_> {
    fn restore(&mut self) -> Result<()> {
        self.restored = true;
        self.repo.restore_head(&self.original)
    }
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(e) = self.repo.restore_head(&self.original) {
                warn!(error = %e, original = ?self.original, "failed to restore HEAD");
            }
        }
    }
}

/// Name used when neither the settings nor git config name an author
pub const DEFAULT_COMMIT_NAME: &str = "gantry";

/// Email used when neither the settings nor git config name an author
pub const DEFAULT_COMMIT_EMAIL: &str = "gantry@users.noreply.github.com";

/// Author identity for commits Gantry makes
#[derive(Debug, Clone, Default)]
pub struct CommitIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
    pub signoff: bool,
}

impl CommitIdentity {
    /// Signature for a commit, filling gaps from `config` and then defaults
    ///
    /// Each of name and email is taken from the identity, else from
    /// `user.name`/`user.email` in `config`, else from the built-in default.
    pub fn signature(&self, config: &git2::Config) -> Result<Signature<'static>> {
        let name = self
            .name
            .clone()
            .or_else(|| config.get_string("user.name").ok())
            .unwrap_or_else(|| DEFAULT_COMMIT_NAME.to_string());
        let email = self
            .email
            .clone()
            .or_else(|| config.get_string("user.email").ok())
            .unwrap_or_else(|| DEFAULT_COMMIT_EMAIL.to_string());
        Ok(Signature::now(&name, &email)?)
    }
}

impl GitRepo {
    /// Detach HEAD at `rev`, updating the working tree
    #[instrument(skip(self))]
    pub fn checkout_detached(&self, rev: &str) -> Result<()> {
        let oid = Oid::from_str(&self.rev_parse(rev)?)?;
        let commit = self.repo.find_commit(oid)?;
        self.repo
            .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))?;
        self.repo.set_head_detached(oid)?;
        debug!(sha = %oid, "detached HEAD");
        Ok(())
    }

    /// Check out an existing local branch
    #[instrument(skip(self))]
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        let branch = self.repo.find_branch(name, BranchType::Local)?;
        let commit = branch.get().peel_to_commit()?;
        self.repo
            .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))?;
        self.repo.set_head(&format!("refs/heads/{}", name))?;
        debug!(branch = name, "checked out branch");
        Ok(())
    }

    /// Create (or reset) a local branch at `rev` and check it out
    #[instrument(skip(self))]
    pub fn create_branch(&self, name: &str, rev: &str) -> Result<()> {
        let oid = Oid::from_str(&self.rev_parse(rev)?)?;
        let commit = self.repo.find_commit(oid)?;
        self.repo.branch(name, &commit, true)?;
        self.checkout_branch(name)?;
        info!(branch = name, sha = %oid, "created branch");
        Ok(())
    }

    /// Run `f` with HEAD detached at `sha`, then put HEAD back
    ///
    /// The original branch (or detached SHA) is restored whether `f`
    /// succeeds, fails or panics.
    pub fn at_sha<T, E, F>(&self, sha: &str, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<GitError>,
    {
        let original = match self.current_branch()? {
            Some(branch) => HeadState::Branch(branch),
            None => HeadState::Detached(self.head_sha()?),
        };
        self.checkout_detached(sha)?;

        let mut guard = RestoreGuard {
            repo: self,
            original,
            restored: false,
        };
        let value = f();
        let restored = guard.restore();

        let value = value?;
        restored?;
        Ok(value)
    }

    fn restore_head(&self, state: &HeadState) -> Result<()> {
        match state {
            HeadState::Branch(branch) => self.checkout_branch(branch),
            HeadState::Detached(sha) => self.checkout_detached(sha),
        }
    }

    /// Stage every change in the working tree and commit it on HEAD
    #[instrument(skip(self, message, identity))]
    pub fn commit_all(&self, message: &str, identity: &CommitIdentity) -> Result<String> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree = self.repo.find_tree(index.write_tree()?)?;

        let signature = identity.signature(&self.repo.config()?)?;

        let message = if identity.signoff {
            format!(
                "{}\n\nSigned-off-by: {} <{}>",
                message.trim_end(),
                signature.name().unwrap_or("Unknown"),
                signature.email().unwrap_or("unknown@example.com")
            )
        } else {
            message.to_string()
        };

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => None,
            Err(e) => return Err(e.into()),
        };
        let parents: Vec<_> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, &message, &tree, &parents)?;

        info!(sha = %oid, "created commit");
        Ok(oid.to_string())
    }

    /// Contents of `path` (relative to the repository root) at `rev`
    ///
    /// Returns `None` when the file does not exist at that revision.
    pub fn show_file(&self, rev: &str, path: &Path) -> Result<Option<String>> {
        let oid = Oid::from_str(&self.rev_parse(rev)?)?;
        let tree = self.repo.find_commit(oid)?.tree()?;
        let entry = match tree.get_path(path) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let object = entry.to_object(&self.repo)?;
        Ok(object
            .as_blob()
            .map(|blob| String::from_utf8_lossy(blob.content()).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::*;

    #[test]
    fn test_at_sha_restores_branch() {
        let (temp, repo) = init_repo();
        let first = repo.head_sha().unwrap();
        commit_files(repo.inner(), &[("a.txt", "new")], "second");

        let seen = repo
            .at_sha(&first, || -> Result<bool> {
                Ok(temp.path().join("a.txt").exists())
            })
            .unwrap();
        assert!(!seen);
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("main"));
        assert!(temp.path().join("a.txt").exists());
    }

    #[test]
    fn test_at_sha_restores_branch_after_error() {
        let (_temp, repo) = init_repo();
        let first = repo.head_sha().unwrap();
        commit_files(repo.inner(), &[("a.txt", "new")], "second");
        let before = repo.current_branch().unwrap();

        let result: Result<()> = repo.at_sha(&first, || {
            Err(GitError::CommandFailed {
                command: "build".to_string(),
                stderr: "boom".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(repo.current_branch().unwrap(), before);
    }

    #[test]
    fn test_at_sha_restores_after_panic() {
        let (_temp, repo) = init_repo();
        let first = repo.head_sha().unwrap();
        commit_files(repo.inner(), &[("a.txt", "new")], "second");

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<()> = repo.at_sha(&first, || panic!("step exploded"));
        }));
        assert!(outcome.is_err());
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("main"));
    }

    #[test]
    fn test_create_branch_and_commit_all() {
        let (temp, repo) = init_repo();
        repo.create_branch("release/engine", "HEAD").unwrap();
        std::fs::write(temp.path().join("CHANGELOG.md"), "# Changelog\n").unwrap();

        let identity = CommitIdentity {
            name: Some("Releaser".to_string()),
            email: Some("releaser@example.com".to_string()),
            signoff: true,
        };
        let sha = repo.commit_all("chore: release", &identity).unwrap();

        assert_eq!(
            repo.current_branch().unwrap().as_deref(),
            Some("release/engine")
        );
        let commit = repo.get_commit(&sha).unwrap();
        assert!(commit
            .message
            .ends_with("Signed-off-by: Releaser <releaser@example.com>"));
        assert!(repo.is_clean().unwrap());
    }

    #[test]
    fn test_commit_all_on_unborn_branch() {
        let temp = tempfile::TempDir::new().unwrap();
        let repo = GitRepo::init(temp.path(), "main").unwrap();
        std::fs::write(temp.path().join("a.txt"), "a").unwrap();

        let identity = CommitIdentity {
            name: Some("Test".to_string()),
            email: Some("test@example.com".to_string()),
            signoff: false,
        };
        let sha = repo.commit_all("Initial commit", &identity).unwrap();
        assert_eq!(repo.head_sha().unwrap(), sha);
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("main"));
    }

    #[test]
    fn test_signature_falls_back_to_defaults() {
        let empty = git2::Config::new().unwrap();

        let signature = CommitIdentity::default().signature(&empty).unwrap();
        assert_eq!(signature.name(), Some(DEFAULT_COMMIT_NAME));
        assert_eq!(signature.email(), Some(DEFAULT_COMMIT_EMAIL));

        let named = CommitIdentity {
            name: Some("Releaser".to_string()),
            ..Default::default()
        };
        let signature = named.signature(&empty).unwrap();
        assert_eq!(signature.name(), Some("Releaser"));
        assert_eq!(signature.email(), Some(DEFAULT_COMMIT_EMAIL));
    }

    #[test]
    fn test_show_file() {
        let (_temp, repo) = init_repo();
        let first = repo.head_sha().unwrap();
        commit_files(repo.inner(), &[("README.md", "# changed\n")], "docs: readme");

        assert_eq!(
            repo.show_file(&first, Path::new("README.md")).unwrap().as_deref(),
            Some("# project\n")
        );
        assert_eq!(repo.show_file("HEAD", Path::new("missing")).unwrap(), None);
    }
}
