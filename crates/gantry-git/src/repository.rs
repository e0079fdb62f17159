//! Git repository operations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::{Repository, StatusOptions};
use tracing::{debug, info, instrument};

use gantry_core::error::GitError;
use gantry_core::exec::{argv, ExecOptions};
use gantry_core::{GantryError, SharedRunner, SystemRunner};

/// Result type for git operations
pub type Result<T> = std::result::Result<T, GitError>;

/// Git repository wrapper
///
/// Reads and local mutations go through `git2`. Network operations (fetch,
/// push, clone) shell out to the `git` binary through the command runner so
/// that the user's credential setup applies.
pub struct GitRepo {
    pub(crate) repo: Repository,
    path: PathBuf,
    pub(crate) runner: SharedRunner,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo").field("path", &self.path).finish()
    }
}

impl GitRepo {
    /// Open a repository at the given path
    #[instrument(fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                GitError::RepositoryNotFound(path.to_path_buf())
            } else {
                GitError::OpenFailed(e.to_string())
            }
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            repo,
            runner: Arc::new(SystemRunner::new()),
        })
    }

    /// Initialize a new repository whose first branch is `branch`
    #[instrument(fields(path = %path.display()))]
    pub fn init(path: &Path, branch: &str) -> Result<Self> {
        info!(path = %path.display(), branch, "initializing git repository");
        let repo = Repository::init(path).map_err(|e| GitError::OpenFailed(e.to_string()))?;
        repo.set_head(&format!("refs/heads/{}", branch))?;

        Ok(Self {
            path: path.to_path_buf(),
            repo,
            runner: Arc::new(SystemRunner::new()),
        })
    }

    /// Discover and open a repository by searching parent directories
    #[instrument(fields(start_path = %start_path.display()))]
    pub fn discover(start_path: &Path) -> Result<Self> {
        info!(start_path = %start_path.display(), "discovering git repository");
        let repo = Repository::discover(start_path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                GitError::NotARepository(start_path.to_path_buf())
            } else {
                GitError::OpenFailed(e.to_string())
            }
        })?;

        let path = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();

        Ok(Self {
            repo,
            path,
            runner: Arc::new(SystemRunner::new()),
        })
    }

    /// Use a different runner for git CLI invocations
    pub fn with_runner(mut self, runner: SharedRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Get the repository path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a reference to the inner git2 Repository
    pub fn inner(&self) -> &Repository {
        &self.repo
    }

    /// Resolve a revision to a full commit SHA
    pub fn rev_parse(&self, rev: &str) -> Result<String> {
        let object = self
            .repo
            .revparse_single(rev)
            .map_err(|_| GitError::UnknownRevision(rev.to_string()))?;
        let commit = object.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// SHA of the commit HEAD points at
    pub fn head_sha(&self) -> Result<String> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                return Err(GitError::UnbornHead)
            }
            Err(e) => return Err(e.into()),
        };
        Ok(head.peel_to_commit()?.id().to_string())
    }

    /// SHA of the first parent of `rev`, if it has one
    pub fn parent_sha(&self, rev: &str) -> Result<Option<String>> {
        let sha = self.rev_parse(rev)?;
        let commit = self.repo.find_commit(git2::Oid::from_str(&sha)?)?;
        Ok(commit.parent_ids().next().map(|oid| oid.to_string()))
    }

    /// Get the current branch name, `None` when HEAD is detached or unborn
    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(|s| s.to_string()))
        } else {
            Ok(None)
        }
    }

    /// Check if the working directory is clean (no uncommitted changes)
    ///
    /// Untracked files count as changes; ignored files do not.
    pub fn is_clean(&self) -> Result<bool> {
        let mut options = StatusOptions::new();
        options.include_untracked(true).include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut options))?;
        let dirty = statuses.iter().filter(|e| !e.status().is_ignored()).count();
        debug!(dirty, "checked working tree status");
        Ok(dirty == 0)
    }

    /// Run a git CLI command in the working directory and return its stdout
    pub(crate) fn git_cli(&self, args: &[&str]) -> Result<String> {
        let mut command = vec!["git"];
        command.extend_from_slice(args);
        let options = ExecOptions::checked().with_cwd(&self.path);

        match self.runner.exec(&argv(command), &options) {
            Ok(output) => Ok(output.stdout),
            Err(GantryError::Command { reason, .. }) => Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr: reason,
            }),
            Err(e) => Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use git2::{Repository, Signature};
    use tempfile::TempDir;

    use super::GitRepo;

    /// Commit the given files on HEAD of `repo`, returning the new SHA
    pub fn commit_files(repo: &Repository, files: &[(&str, &str)], message: &str) -> String {
        let workdir = repo.workdir().unwrap().to_path_buf();
        let mut index = repo.index().unwrap();
        for (path, content) in files {
            let full = workdir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&full, content).unwrap();
            index.add_path(Path::new(path)).unwrap();
        }
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();

        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
            .to_string()
    }

    /// A repository with a single commit on `main`
    pub fn init_repo() -> (TempDir, GitRepo) {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path()).unwrap();
        repo.set_head("refs/heads/main").unwrap();
        commit_files(&repo, &[("README.md", "# project\n")], "Initial commit");
        let git = GitRepo::open(temp.path()).unwrap();
        (temp, git)
    }
}
