//! Conventional commit change sets
//!
//! A [`ChangeSet`] is fed the commits of one release, oldest first. Each
//! line of each message that looks like a conventional commit header
//! (`type(scope)!: description`) is classified by its type:
//!
//! - `BREAKING CHANGE` (also `BREAKING-CHANGE`, `BREAKING_CHANGE`, any case)
//!   records a breaking change and raises the severity to major.
//! - `semver-change: <level>` locks the commit's severity at `level`.
//! - `revert-commit: <sha-prefix>` drops earlier commits with that prefix.
//! - any configured commit tag records a change at the tag's severity.
//!
//! Anything else is ignored. Once [`ChangeSet::finish`] is called the
//! changes are grouped for the changelog and the set is sealed.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, trace};

use gantry_core::config::{CommitTagSettings, Settings};
use gantry_core::error::ChangelogError;
use gantry_core::{Result, Semver, Version};

/// Regex for conventional commit header lines
static HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][\w-]*(?: [A-Za-z][\w-]*)?)(?:\(([^()]*)\))?(!?):\s+(.+)$")
        .expect("Invalid regex")
});

/// Regex for a trailing pull request reference such as `(#123)`
static PR_SUFFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(#\d+\)\s*$").expect("Invalid regex"));

/// Parser settings, usually derived from [`Settings`]
#[derive(Debug, Clone)]
pub struct ChangeSetConfig {
    pub commit_tags: Vec<CommitTagSettings>,
    pub breaking_change_header: String,
    pub no_significant_updates_notice: String,
    pub strip_pr_number: bool,
}

impl ChangeSetConfig {
    /// Take the relevant fields from repository settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            commit_tags: settings.commit_tags.clone(),
            breaking_change_header: settings.breaking_change_header.clone(),
            no_significant_updates_notice: settings.no_significant_updates_notice.clone(),
            strip_pr_number: settings.strip_pr_number,
        }
    }

    fn tag(&self, tag: &str) -> Option<(usize, &CommitTagSettings)> {
        self.commit_tags
            .iter()
            .enumerate()
            .find(|(_, t)| t.tag.eq_ignore_ascii_case(tag))
    }
}

impl Default for ChangeSetConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// One commit's contribution while the set is open
#[derive(Debug, Clone)]
struct Input {
    sha: String,
    /// (index into commit tags, description)
    changes: Vec<(usize, String)>,
    breaks: Vec<String>,
    semver: Semver,
    locked: bool,
}

impl Input {
    fn new(sha: &str) -> Self {
        Self {
            sha: sha.to_ascii_lowercase(),
            changes: Vec::new(),
            breaks: Vec::new(),
            semver: Semver::None,
            locked: false,
        }
    }

    fn raise(&mut self, level: Semver) {
        if !self.locked {
            self.semver = self.semver.max(level);
        }
    }
}

/// A changelog section: lines that share a header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    /// Header text, such as `ADDED` or `BREAKING CHANGE`
    pub header: String,
    /// Normalized descriptions
    pub lines: Vec<String>,
    /// Descriptions prefixed with the header
    pub prefixed_lines: Vec<String>,
}

impl Group {
    fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            lines: Vec::new(),
            prefixed_lines: Vec::new(),
        }
    }

    fn push(&mut self, description: &str) {
        self.lines.push(description.to_string());
        if self.header.is_empty() {
            self.prefixed_lines.push(description.to_string());
        } else {
            self.prefixed_lines
                .push(format!("{}: {}", self.header, description));
        }
    }
}

/// The parsed, categorized changes of one release
#[derive(Debug, Clone)]
pub struct ChangeSet {
    config: ChangeSetConfig,
    inputs: Vec<Input>,
    finished: bool,
    semver: Semver,
    groups: Vec<Group>,
    shas: Vec<String>,
}

impl ChangeSet {
    /// Create an open change set
    pub fn new(config: ChangeSetConfig) -> Self {
        Self {
            config,
            inputs: Vec::new(),
            finished: false,
            semver: Semver::None,
            groups: Vec::new(),
            shas: Vec::new(),
        }
    }

    /// Feed one commit
    pub fn add_message(&mut self, sha: &str, message: &str) -> Result<()> {
        if self.finished {
            return Err(ChangelogError::AlreadyFinished.into());
        }

        let mut input = Input::new(sha);
        for line in message.lines() {
            let Some(captures) = HEADER_REGEX.captures(line.trim()) else {
                continue;
            };
            let tag = &captures[1];
            let bang = !captures[3].is_empty();
            let description = captures[4].trim();

            if is_breaking_tag(tag) {
                input.breaks.push(self.normalize(description));
                input.raise(Semver::Major);
            } else if tag.eq_ignore_ascii_case("semver-change") {
                if let Some(level) = Semver::for_name(description) {
                    input.semver = level;
                    input.locked = true;
                }
            } else if tag.eq_ignore_ascii_case("revert-commit") {
                self.revert(description);
            } else if let Some((index, settings)) = self.config.tag(tag) {
                let description = self.normalize(description);
                input.raise(settings.semver);
                if bang {
                    input.breaks.push(description.clone());
                    input.raise(Semver::Major);
                }
                input.changes.push((index, description));
            } else {
                trace!(tag, "ignoring unknown commit tag");
            }
        }

        debug!(sha, semver = %input.semver, changes = input.changes.len(), "added commit");
        self.inputs.push(input);
        Ok(())
    }

    fn revert(&mut self, prefix: &str) {
        let prefix = prefix.to_ascii_lowercase();
        let before = self.inputs.len();
        self.inputs.retain(|input| !input.sha.starts_with(&prefix));
        debug!(prefix, removed = before - self.inputs.len(), "reverted commits");
    }

    fn normalize(&self, description: &str) -> String {
        let description = if self.config.strip_pr_number {
            PR_SUFFIX_REGEX.replace(description, "").into_owned()
        } else {
            description.to_string()
        };
        let mut chars = description.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Fold the commits into groups and seal the set
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(ChangelogError::AlreadyFinished.into());
        }

        let mut breaking = Group::new(self.config.breaking_change_header.clone());
        let mut by_tag: Vec<Group> = self
            .config
            .commit_tags
            .iter()
            .map(|t| Group::new(t.effective_header()))
            .collect();

        for input in std::mem::take(&mut self.inputs) {
            self.semver = self.semver.max(input.semver);
            for description in &input.breaks {
                breaking.push(description);
            }
            for (index, description) in &input.changes {
                if !self.config.commit_tags[*index].hidden {
                    by_tag[*index].push(description);
                }
            }
            self.shas.push(input.sha);
        }

        self.groups = std::iter::once(breaking)
            .chain(by_tag)
            .filter(|g| !g.lines.is_empty())
            .collect();
        self.finished = true;

        debug!(semver = %self.semver, groups = self.groups.len(), "finished change set");
        Ok(())
    }

    /// Make sure a finished set produces a release
    ///
    /// A set with no changelog groups gets a single group holding the
    /// configured notice and at least patch severity. Otherwise this does
    /// nothing.
    pub fn force_release(&mut self) -> Result<()> {
        if !self.finished {
            return Err(ChangelogError::NotFinished.into());
        }
        if self.groups.is_empty() {
            let mut group = Group::new("");
            group.push(&self.config.no_significant_updates_notice);
            self.groups.push(group);
            self.semver = self.semver.max(Semver::Patch);
        }
        Ok(())
    }

    /// Whether `finish` has been called
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Overall severity (meaningful once finished)
    pub fn semver(&self) -> Semver {
        self.semver
    }

    /// Non-empty changelog groups, breaking changes first
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// SHAs of the commits that survived reverts
    pub fn shas(&self) -> &[String] {
        &self.shas
    }

    /// Whether the set has no changelog groups
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Every prefixed line, in group order
    pub fn prefixed_lines(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .flat_map(|g| g.prefixed_lines.iter().map(String::as_str))
    }

    /// Version implied by the changes, starting from `last`
    ///
    /// `None` when nothing significant changed. A component that was never
    /// released starts from `0.0.0`.
    pub fn suggested_version(&self, last: Option<&Version>) -> Result<Option<Version>> {
        if !self.semver.is_significant() {
            return Ok(None);
        }
        let base = last.cloned().unwrap_or_else(Version::zero);
        Ok(Some(self.semver.bump(&base)?))
    }
}

fn is_breaking_tag(tag: &str) -> bool {
    tag.replace(['-', '_'], " ")
        .eq_ignore_ascii_case("breaking change")
}
