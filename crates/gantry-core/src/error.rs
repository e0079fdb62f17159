//! Error types for Gantry

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using GantryError
pub type Result<T> = std::result::Result<T, GantryError>;

/// Main error type for Gantry operations
#[derive(Debug, Error)]
pub enum GantryError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Git-related errors
    #[error(transparent)]
    Git(#[from] GitError),

    /// Version-related errors
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Changelog and change set errors
    #[error(transparent)]
    Changelog(#[from] ChangelogError),

    /// GitHub API errors
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    /// Release step errors
    #[error(transparent)]
    Step(#[from] StepError),

    /// Workflow-related errors
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// An external command could not be run or exited unsuccessfully
    #[error("Command failed: {command} - {reason}")]
    Command { command: String, reason: String },

    /// Several errors collected inside an accumulation scope
    #[error("{heading}\n{}", format_accumulated(.errors))]
    Accumulated { heading: String, errors: Vec<String> },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

fn format_accumulated(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("  * {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// Unknown component referenced
    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Git-related errors
#[derive(Debug, Error)]
pub enum GitError {
    /// Repository not found
    #[error("Git repository not found at {0}")]
    RepositoryNotFound(PathBuf),

    /// Not a git repository
    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    /// Failed to open repository
    #[error("Failed to open repository: {0}")]
    OpenFailed(String),

    /// A revision could not be resolved
    #[error("Unable to resolve revision: {0}")]
    UnknownRevision(String),

    /// Working directory is not clean
    #[error("Working directory has uncommitted changes")]
    DirtyWorkingDirectory,

    /// HEAD does not point at anything usable
    #[error("HEAD is unborn; the repository has no commits")]
    UnbornHead,

    /// Failed to push
    #[error("Failed to push to remote: {0}")]
    PushFailed(String),

    /// Remote not found
    #[error("Remote not found: {0}")]
    RemoteNotFound(String),

    /// A git CLI invocation failed
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Git2 library error
    #[error("Git error: {0}")]
    Git2(#[from] git2::Error),
}

/// Version-related errors
#[derive(Debug, Error)]
pub enum VersionError {
    /// Failed to parse version
    #[error("Failed to parse version '{0}'")]
    ParseFailed(String),

    /// Unknown semver level name
    #[error("Unknown semver level: {0}")]
    UnknownLevel(String),

    /// A version file or changelog disagrees with the release version
    #[error("{file} reports version {found}, expected {expected}")]
    Mismatch {
        file: PathBuf,
        found: String,
        expected: String,
    },

    /// No version could be found in a file
    #[error("No version found in {0}")]
    NotFound(PathBuf),

    /// Bumping would overflow a version segment
    #[error("Cannot bump version {0}: segment overflows")]
    Overflow(String),
}

/// Changelog and change set errors
#[derive(Debug, Error)]
pub enum ChangelogError {
    /// The change set was already finished
    #[error("Change set is already finished")]
    AlreadyFinished,

    /// The change set has not been finished yet
    #[error("Change set is not finished")]
    NotFinished,

    /// Changelog file not found
    #[error("Changelog file not found at {0}")]
    FileNotFound(PathBuf),

    /// Changelog file is malformed
    #[error("Malformed changelog {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// GitHub API errors
#[derive(Debug, Error)]
pub enum GitHubError {
    /// The API call failed
    #[error("GitHub API {method} {path} failed: {reason}")]
    RequestFailed {
        method: String,
        path: String,
        reason: String,
    },

    /// A pull request could not be found
    #[error("Pull request #{0} not found")]
    PullRequestNotFound(u64),

    /// Unexpected response shape
    #[error("Unexpected GitHub response: {0}")]
    UnexpectedResponse(String),
}

/// Release step errors
#[derive(Debug, Error)]
pub enum StepError {
    /// A required artifact was not produced by an earlier step
    #[error("Step '{step}' is missing artifact from '{source_step}'")]
    MissingArtifact { step: String, source_step: String },
}

/// Workflow-related errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Validation failed
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Pre-condition not met
    #[error("Pre-condition not met: {0}")]
    PreConditionFailed(String),

    /// Nothing to release
    #[error("No components have releasable changes")]
    NothingToRelease,

    /// A required external binary is missing
    #[error("Required tool '{0}' was not found on PATH")]
    MissingTool(String),
}

impl GantryError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Create a command failure error
    pub fn command(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Individual messages carried by this error
    ///
    /// Accumulated errors expand to their members; everything else yields
    /// its display string.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Accumulated { errors, .. } => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}
