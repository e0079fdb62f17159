//! Settings validation
//!
//! Every problem is collected and reported together.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use tracing::debug;

use crate::accumulate::Accumulator;
use crate::error::Result;

use super::types::Settings;

/// Tags with special meaning that cannot be configured as commit tags
const RESERVED_TAGS: &[&str] = &[
    "semver-change",
    "revert-commit",
    "touch-component",
    "breaking change",
    "breaking-change",
    "breaking_change",
];

/// Validate settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    debug!("validating settings");
    let mut acc = Accumulator::new("Release settings are invalid");
    validate_repo(settings, &mut acc);
    validate_labels(settings, &mut acc);
    validate_commit_tags(settings, &mut acc);
    validate_components(settings, &mut acc);
    validate_coordination_groups(settings, &mut acc);
    acc.finish()?;
    debug!("settings validation passed");
    Ok(())
}

fn validate_repo(settings: &Settings, acc: &mut Accumulator) {
    if let Some(repo) = &settings.repo {
        let valid = repo
            .split_once('/')
            .is_some_and(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'));
        if !valid {
            acc.error(format!("repo must have the form owner/name, got {:?}", repo));
        }
    }

    if settings.main_branch.is_empty() {
        acc.error("main_branch cannot be empty");
    }
    if settings.git_remote.is_empty() {
        acc.error("git_remote cannot be empty");
    }
    if settings.release_branch_prefix.is_empty() {
        acc.error("release_branch_prefix cannot be empty");
    }

    if let Some(pattern) = &settings.required_checks {
        if let Err(e) = Regex::new(pattern) {
            acc.error(format!("required_checks is not a valid regex: {}", e));
        }
    }
}

fn validate_labels(settings: &Settings, acc: &mut Accumulator) {
    let labels = [
        ("release_pending_label", &settings.release_pending_label),
        ("release_error_label", &settings.release_error_label),
        ("release_complete_label", &settings.release_complete_label),
        ("release_aborted_label", &settings.release_aborted_label),
    ];
    for (field, label) in labels {
        if label.trim().is_empty() {
            acc.error(format!("{} cannot be empty", field));
        }
    }
}

fn validate_commit_tags(settings: &Settings, acc: &mut Accumulator) {
    let mut seen = HashSet::new();
    for (i, tag) in settings.commit_tags.iter().enumerate() {
        let normalized = tag.tag.to_ascii_lowercase();
        if normalized.is_empty() {
            acc.error(format!("commit_tags[{}].tag cannot be empty", i));
            continue;
        }
        if RESERVED_TAGS.contains(&normalized.as_str()) {
            acc.error(format!("commit tag {:?} is reserved", tag.tag));
        }
        if !seen.insert(normalized) {
            acc.error(format!("commit tag {:?} is listed more than once", tag.tag));
        }
    }
}

fn validate_components(settings: &Settings, acc: &mut Accumulator) {
    let mut seen = HashSet::new();
    for (i, component) in settings.components.iter().enumerate() {
        if component.name.is_empty() {
            acc.error(format!("components[{}].name cannot be empty", i));
            continue;
        }
        if component.name.contains('/') || component.name.contains(char::is_whitespace) {
            acc.error(format!(
                "component name {:?} may not contain slashes or whitespace",
                component.name
            ));
        }
        if !seen.insert(component.name.as_str()) {
            acc.error(format!("component {:?} is listed more than once", component.name));
        }
        if component.directory.as_ref().is_some_and(|d| d.is_absolute()) {
            acc.error(format!(
                "component {:?} directory must be relative to the repository root",
                component.name
            ));
        }
    }
}

fn validate_coordination_groups(settings: &Settings, acc: &mut Accumulator) {
    let known: HashSet<&str> = settings.components.iter().map(|c| c.name.as_str()).collect();
    let mut membership: HashMap<&str, usize> = HashMap::new();

    for (i, group) in settings.coordination_groups.iter().enumerate() {
        for name in group {
            if !known.contains(name.as_str()) {
                acc.error(format!(
                    "coordination_groups[{}] names unknown component {:?}",
                    i, name
                ));
                continue;
            }
            if let Some(previous) = membership.insert(name.as_str(), i) {
                acc.error(format!(
                    "component {:?} is in coordination groups {} and {}",
                    name, previous, i
                ));
            }
        }
    }

    if settings.coordinate_versions && !settings.coordination_groups.is_empty() {
        acc.warning("coordinate_versions is set; coordination_groups are ignored");
    }
}
