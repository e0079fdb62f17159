//! Default values

use crate::semver::Semver;

use super::types::CommitTagSettings;

/// Default changelog file name
pub const DEFAULT_CHANGELOG: &str = "CHANGELOG.md";

/// Default version declaration file for basic components
pub const DEFAULT_VERSION_FILE: &str = "src/version.rs";

/// Default settings file names, in search order
pub fn config_file_names() -> &'static [&'static str] {
    &["gantry.toml", "gantry.yaml", "gantry.yml"]
}

/// Commit tags recognized when settings do not list any
pub fn default_commit_tags() -> Vec<CommitTagSettings> {
    vec![
        CommitTagSettings::new("feat", "ADDED", Semver::Minor),
        CommitTagSettings::new("fix", "FIXED", Semver::Patch),
        CommitTagSettings::new("perf", "IMPROVED", Semver::Patch),
        CommitTagSettings::new("docs", "DOCS", Semver::Patch),
        CommitTagSettings::hidden("refactor", Semver::Patch),
        CommitTagSettings::hidden("chore", Semver::None),
        CommitTagSettings::hidden("ci", Semver::None),
        CommitTagSettings::hidden("test", Semver::None),
        CommitTagSettings::hidden("style", Semver::None),
        CommitTagSettings::hidden("build", Semver::None),
    ]
}

pub(crate) fn package_step_name() -> String {
    "build_package".to_string()
}

pub(crate) fn docs_step_name() -> String {
    "build_docs".to_string()
}
