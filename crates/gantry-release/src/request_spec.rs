//! Release requests and version resolution
//!
//! A [`RequestSpec`] says which components to release and how to pick
//! their versions. [`resolve_versions`] expands it to whole coordination
//! groups, inspects each member's changes since its last release, and
//! settles on one version per group.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info, instrument};

use gantry_changelog::ChangeSet;
use gantry_core::accumulate::accumulate_errors;
use gantry_core::error::{VersionError, WorkflowError};
use gantry_core::{GantryError, Result, Semver, Version};

use crate::component::Component;
use crate::groups::GroupId;
use crate::repository::Repository;

/// How the version of a requested component is chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequest {
    /// Release exactly this version
    Explicit(Version),
    /// Bump the last release by this level
    Bump(Semver),
    /// Infer the level from the commits since the last release
    Inferred,
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit(version) => write!(f, "{}", version),
            Self::Bump(level) => write!(f, "{}", level),
            Self::Inferred => write!(f, "inferred"),
        }
    }
}

impl FromStr for VersionRequest {
    type Err = GantryError;

    /// `major`, `minor`, `patch`, `patch2`, a version number, or empty
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::Inferred);
        }
        match Semver::for_name(s) {
            Some(Semver::None) => Err(VersionError::UnknownLevel(s.to_string()).into()),
            Some(level) => Ok(Self::Bump(level)),
            None => Ok(Self::Explicit(Version::parse(s)?)),
        }
    }
}

/// Parse a `name` or `name=request` argument
pub fn parse_request(arg: &str) -> Result<(String, VersionRequest)> {
    let (name, request) = match arg.split_once('=') {
        Some((name, request)) => (name.trim(), request.parse()?),
        None => (arg.trim(), VersionRequest::Inferred),
    };
    if name.is_empty() {
        return Err(GantryError::other(format!(
            "Missing component name in '{}'",
            arg
        )));
    }
    Ok((name.to_string(), request))
}

/// The components a release was asked for
///
/// Each component may be named once. An empty spec asks for every
/// component with releasable changes.
#[derive(Debug, Clone, Default)]
pub struct RequestSpec {
    requests: Vec<(String, VersionRequest)>,
}

impl RequestSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request, failing if the component was already named
    pub fn add(&mut self, name: impl Into<String>, request: VersionRequest) -> Result<()> {
        let name = name.into();
        if self.requests.iter().any(|(n, _)| *n == name) {
            return Err(WorkflowError::ValidationFailed(format!(
                "component {} was requested more than once",
                name
            ))
            .into());
        }
        self.requests.push((name, request));
        Ok(())
    }

    /// Build a spec from `name[=request]` arguments
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut spec = Self::new();
        for arg in args {
            let (name, request) = parse_request(arg.as_ref())?;
            spec.add(name, request)?;
        }
        Ok(spec)
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VersionRequest)> {
        self.requests.iter().map(|(n, r)| (n.as_str(), r))
    }
}

/// One component's resolved release
#[derive(Debug, Clone)]
pub struct ResolvedUnit {
    pub component_name: String,
    pub change_set: ChangeSet,
    pub last_version: Option<Version>,
    pub version: Version,
}

struct Candidate {
    group: GroupId,
    request: VersionRequest,
}

struct History<'a> {
    component: &'a Component,
    last: Option<Version>,
    change_set: ChangeSet,
}

/// Resolve `spec` against the history up to `to_rev`
///
/// Every problem found (unknown components, conflicting requests within a
/// coordination group, versions that do not move forward) is reported
/// together once all groups have been looked at.
#[instrument(skip(spec, repo))]
pub fn resolve_versions(
    spec: &RequestSpec,
    repo: &Repository,
    to_rev: &str,
) -> Result<Vec<ResolvedUnit>> {
    accumulate_errors("Unable to resolve the release request", |acc| {
        let mut candidates: Vec<Candidate> = Vec::new();
        if spec.is_empty() {
            candidates.extend(repo.groups().ids().map(|group| Candidate {
                group,
                request: VersionRequest::Inferred,
            }));
        }
        for (name, request) in spec.iter() {
            let Some(component) = repo.component(name) else {
                acc.error(format!("Unknown component: {}", name));
                continue;
            };
            let group = component.group();
            match candidates.iter_mut().find(|c| c.group == group) {
                None => candidates.push(Candidate {
                    group,
                    request: request.clone(),
                }),
                Some(existing) if existing.request == VersionRequest::Inferred => {
                    existing.request = request.clone();
                }
                Some(existing) => {
                    if *request != VersionRequest::Inferred && *request != existing.request {
                        acc.error(format!(
                            "Conflicting requests for coordination group {}: {} and {}",
                            group_label(repo, group),
                            existing.request,
                            request
                        ));
                    }
                }
            }
        }

        let mut units = Vec::new();
        for candidate in candidates {
            let mut histories = Vec::new();
            for component in repo.group_members(candidate.group) {
                let Some((last, change_set)) =
                    acc.absorb(repo.changes_since_release(component, to_rev))
                else {
                    continue;
                };
                histories.push(History {
                    component,
                    last,
                    change_set,
                });
            }
            if histories.len() != repo.groups().members(candidate.group).len() {
                continue;
            }

            let Some(version) = acc.absorb(group_version(&candidate.request, &histories)).flatten()
            else {
                debug!(group = %group_label(repo, candidate.group), "no significant changes");
                continue;
            };

            let mut stale = false;
            for history in &histories {
                if let Some(last) = &history.last {
                    if version <= *last {
                        acc.error(format!(
                            "Version {} of {} is not newer than its last release {}",
                            version,
                            history.component.name(),
                            last
                        ));
                        stale = true;
                    }
                }
            }
            if stale {
                continue;
            }

            for mut history in histories {
                history.change_set.force_release()?;
                info!(component = history.component.name(), version = %version, "resolved release version");
                units.push(ResolvedUnit {
                    component_name: history.component.name().to_string(),
                    change_set: history.change_set,
                    last_version: history.last,
                    version: version.clone(),
                });
            }
        }

        units.sort_by_key(|unit| {
            repo.components()
                .iter()
                .position(|c| c.name() == unit.component_name)
        });
        Ok(units)
    })
}

/// The single version a coordination group moves to
///
/// Inferred versions take the highest suggestion among the members. If a
/// member was never tagged its suggestion can fall behind another member's
/// last release; then the group's overall severity is applied to the
/// highest last release instead.
fn group_version(request: &VersionRequest, histories: &[History<'_>]) -> Result<Option<Version>> {
    let max_last = histories.iter().filter_map(|h| h.last.clone()).max();
    match request {
        VersionRequest::Explicit(version) => Ok(Some(version.clone())),
        VersionRequest::Bump(level) => Ok(Some(level.bump(&max_last.unwrap_or_else(Version::zero))?)),
        VersionRequest::Inferred => {
            let mut suggestions = Vec::new();
            for history in histories {
                if let Some(version) = history.change_set.suggested_version(history.last.as_ref())? {
                    suggestions.push(version);
                }
            }
            let Some(suggested) = suggestions.into_iter().max() else {
                return Ok(None);
            };
            match max_last {
                Some(last) if suggested <= last => {
                    let severity = histories
                        .iter()
                        .map(|h| h.change_set.semver())
                        .max()
                        .unwrap_or(Semver::None);
                    Ok(Some(severity.bump(&last)?))
                }
                _ => Ok(Some(suggested)),
            }
        }
    }
}

fn group_label(repo: &Repository, group: GroupId) -> String {
    repo.groups().members(group).join(", ")
}
