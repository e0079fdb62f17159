//! Change severity levels

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VersionError;
use crate::version::Version;

/// Severity of a set of changes, ordered by precedence
///
/// `None < Patch2 < Patch < Minor < Major`. Each level except `None` names
/// the segment of a dotted version it increments.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Semver {
    /// No significant changes
    #[default]
    None,
    /// Fourth-segment bump
    Patch2,
    /// Patch bump (bug fixes)
    Patch,
    /// Minor bump (new features)
    Minor,
    /// Major bump (breaking changes)
    Major,
}

impl Semver {
    /// All levels from lowest to highest precedence
    pub const ALL: [Semver; 5] = [
        Semver::None,
        Semver::Patch2,
        Semver::Patch,
        Semver::Minor,
        Semver::Major,
    ];

    /// Look a level up by name, case-insensitively
    pub fn for_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "patch2" => Some(Self::Patch2),
            "patch" => Some(Self::Patch),
            "minor" => Some(Self::Minor),
            "major" => Some(Self::Major),
            _ => None,
        }
    }

    /// Returns the string representation of the level
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Patch2 => "patch2",
            Self::Patch => "patch",
            Self::Minor => "minor",
            Self::Major => "major",
        }
    }

    /// Index of the version segment this level increments
    pub fn segment(&self) -> Option<usize> {
        match self {
            Self::None => None,
            Self::Major => Some(0),
            Self::Minor => Some(1),
            Self::Patch => Some(2),
            Self::Patch2 => Some(3),
        }
    }

    /// Whether this level warrants a release
    pub fn is_significant(&self) -> bool {
        *self != Self::None
    }

    /// Bump a version by this level
    ///
    /// The version is padded to at least three segments (more if the level
    /// targets a later segment). A major bump of a `0.x` version increments
    /// the minor segment instead. Every segment after the bumped one is
    /// zeroed.
    pub fn bump(&self, version: &Version) -> Result<Version, VersionError> {
        let Some(mut index) = self.segment() else {
            return Ok(version.clone());
        };

        let mut segments = version.segments().to_vec();
        let min_len = index.max(2) + 1;
        if segments.len() < min_len {
            segments.resize(min_len, 0);
        }

        if index == 0 && segments[0] == 0 {
            index = 1;
        }

        segments[index] = segments[index]
            .checked_add(1)
            .ok_or_else(|| VersionError::Overflow(version.to_string()))?;
        for segment in segments.iter_mut().skip(index + 1) {
            *segment = 0;
        }

        Ok(Version::from_segments(segments))
    }
}

impl fmt::Display for Semver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Semver {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::for_name(s).ok_or_else(|| VersionError::UnknownLevel(s.to_string()))
    }
}
