//! Settings types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::semver::Semver;

use super::defaults;

/// Repository-level release settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// GitHub repository as `owner/name`
    pub repo: Option<String>,

    /// Branch release requests are based on
    pub main_branch: String,

    /// Git remote to push to and fetch from
    pub git_remote: String,

    /// Commit author name for release commits
    pub git_user_name: Option<String>,

    /// Commit author email for release commits
    pub git_user_email: Option<String>,

    /// Whether release commits carry a Signed-off-by trailer
    pub signoff_commits: bool,

    /// Prefix for release branches
    pub release_branch_prefix: String,

    /// Label applied to open release pull requests
    pub release_pending_label: String,

    /// Label applied when a release fails
    pub release_error_label: String,

    /// Label applied when a release completes
    pub release_complete_label: String,

    /// Label applied when a release request is abandoned
    pub release_aborted_label: String,

    /// Regex selecting the GitHub checks that must pass before releasing
    pub required_checks: Option<String>,

    /// How long to wait for required checks, in seconds
    pub required_checks_timeout_secs: u64,

    /// Put every component in a single coordination group
    pub coordinate_versions: bool,

    /// Explicit coordination groups, by component name
    pub coordination_groups: Vec<Vec<String>>,

    /// Conventional commit tags that appear in changelogs
    pub commit_tags: Vec<CommitTagSettings>,

    /// Header used for breaking change lines
    pub breaking_change_header: String,

    /// Changelog line used when a release has no significant changes
    pub no_significant_updates_notice: String,

    /// Strip a trailing `(#123)` pull request suffix from descriptions
    pub strip_pr_number: bool,

    /// Releasable components
    pub components: Vec<ComponentSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repo: None,
            main_branch: "main".to_string(),
            git_remote: "origin".to_string(),
            git_user_name: None,
            git_user_email: None,
            signoff_commits: false,
            release_branch_prefix: "release".to_string(),
            release_pending_label: "release: pending".to_string(),
            release_error_label: "release: error".to_string(),
            release_complete_label: "release: complete".to_string(),
            release_aborted_label: "release: aborted".to_string(),
            required_checks: Some(".".to_string()),
            required_checks_timeout_secs: 900,
            coordinate_versions: false,
            coordination_groups: Vec::new(),
            commit_tags: defaults::default_commit_tags(),
            breaking_change_header: "BREAKING CHANGE".to_string(),
            no_significant_updates_notice: "No significant updates.".to_string(),
            strip_pr_number: true,
            components: Vec::new(),
        }
    }
}

impl Settings {
    /// Find a component's settings by name
    pub fn component(&self, name: &str) -> Option<&ComponentSettings> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Find a commit tag by name, case-insensitively
    pub fn commit_tag(&self, tag: &str) -> Option<&CommitTagSettings> {
        self.commit_tags
            .iter()
            .find(|t| t.tag.eq_ignore_ascii_case(tag))
    }

    /// Split `repo` into owner and name
    pub fn repo_owner_and_name(&self) -> Option<(&str, &str)> {
        self.repo.as_deref()?.split_once('/')
    }
}

/// One conventional commit tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitTagSettings {
    /// The tag as written in commit messages, e.g. `feat`
    pub tag: String,

    /// Changelog header, e.g. `ADDED`; defaults to the uppercased tag
    #[serde(default)]
    pub header: Option<String>,

    /// Severity implied by the tag
    #[serde(default)]
    pub semver: Semver,

    /// Whether changes with this tag are left out of changelogs
    #[serde(default)]
    pub hidden: bool,
}

impl CommitTagSettings {
    /// Create a visible tag
    pub fn new(tag: impl Into<String>, header: impl Into<String>, semver: Semver) -> Self {
        Self {
            tag: tag.into(),
            header: Some(header.into()),
            semver,
            hidden: false,
        }
    }

    /// Create a hidden tag
    pub fn hidden(tag: impl Into<String>, semver: Semver) -> Self {
        Self {
            tag: tag.into(),
            header: None,
            semver,
            hidden: true,
        }
    }

    /// The effective changelog header
    pub fn effective_header(&self) -> String {
        self.header
            .clone()
            .unwrap_or_else(|| self.tag.to_ascii_uppercase())
    }
}

/// Kind of releasable component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// Anything released only as a tag and GitHub release
    #[default]
    Basic,
    /// A Rust crate published to a package registry
    Crate,
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Crate => write!(f, "crate"),
        }
    }
}

/// Settings for a single component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSettings {
    /// Unique component name, also the release tag prefix
    pub name: String,

    /// Component kind
    #[serde(default)]
    pub kind: ComponentKind,

    /// Directory relative to the repository root; defaults to the name
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Changelog path relative to the component directory
    #[serde(default)]
    pub changelog_path: Option<PathBuf>,

    /// Version declaration file relative to the component directory
    #[serde(default)]
    pub version_file: Option<PathBuf>,

    /// Published package name; defaults to the component name
    #[serde(default)]
    pub package_name: Option<String>,

    /// Documentation publishing
    #[serde(default)]
    pub pages: PagesSettings,

    /// Explicit release pipeline; defaults depend on the kind
    #[serde(default)]
    pub steps: Option<Vec<StepSettings>>,
}

impl ComponentSettings {
    /// Create settings for a component with all defaults
    pub fn new(name: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            directory: None,
            changelog_path: None,
            version_file: None,
            package_name: None,
            pages: PagesSettings::default(),
            steps: None,
        }
    }

    /// Set the directory
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Set the version file
    pub fn with_version_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.version_file = Some(path.into());
        self
    }

    /// Set an explicit pipeline
    pub fn with_steps(mut self, steps: Vec<StepSettings>) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Effective directory relative to the repository root
    pub fn effective_directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.name))
    }

    /// Effective changelog path relative to the component directory
    pub fn effective_changelog_path(&self) -> PathBuf {
        self.changelog_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(defaults::DEFAULT_CHANGELOG))
    }

    /// Effective version file relative to the component directory
    pub fn effective_version_file(&self) -> PathBuf {
        self.version_file.clone().unwrap_or_else(|| match self.kind {
            ComponentKind::Crate => PathBuf::from("Cargo.toml"),
            ComponentKind::Basic => PathBuf::from(defaults::DEFAULT_VERSION_FILE),
        })
    }

    /// Effective package name
    pub fn effective_package_name(&self) -> String {
        self.package_name
            .clone()
            .unwrap_or_else(|| self.name.clone())
    }
}

/// Documentation publishing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagesSettings {
    /// Whether docs are published for this component
    pub enabled: bool,

    /// Branch holding the published site
    pub branch: String,

    /// Directory inside the site; defaults to the component name
    pub directory: Option<String>,
}

impl Default for PagesSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            branch: "gh-pages".to_string(),
            directory: None,
        }
    }
}

/// One configured pipeline step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSettings {
    /// Step name, unique within the pipeline; defaults to the kind's name
    #[serde(default)]
    pub name: Option<String>,

    /// What the step does
    #[serde(flatten)]
    pub kind: StepKind,

    /// Stop the entire run, not just this component, when the step fails
    #[serde(default)]
    pub abort_pipeline_on_error: bool,
}

impl StepSettings {
    /// Create a step with the kind's default name
    pub fn new(kind: StepKind) -> Self {
        Self {
            name: None,
            kind,
            abort_pipeline_on_error: false,
        }
    }

    /// Set the name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Escalate failures of this step to the whole run
    pub fn aborting(mut self) -> Self {
        self.abort_pipeline_on_error = true;
        self
    }

    /// Effective step name
    pub fn effective_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.kind.default_name().to_string())
    }
}

/// Typed configuration per step kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Resolve and fetch dependencies
    Bundle,
    /// Build the package archive
    BuildPackage,
    /// Build documentation
    BuildDocs,
    /// Create the tag and GitHub release
    GithubRelease,
    /// Publish the package built by `source`
    ReleasePackage {
        #[serde(default = "defaults::package_step_name")]
        source: String,
    },
    /// Publish the docs built by `source` to the pages branch
    PushPages {
        #[serde(default = "defaults::docs_step_name")]
        source: String,
    },
    /// Run an arbitrary command in the component directory
    Command { command: Vec<String> },
}

impl StepKind {
    /// Name used when a step has none
    pub fn default_name(&self) -> &'static str {
        match self {
            Self::Bundle => "bundle",
            Self::BuildPackage => "build_package",
            Self::BuildDocs => "build_docs",
            Self::GithubRelease => "github_release",
            Self::ReleasePackage { .. } => "release_package",
            Self::PushPages { .. } => "push_pages",
            Self::Command { .. } => "command",
        }
    }
}
