//! Changelog file reading and editing
//!
//! Changelogs are Markdown files whose release entries start with a heading
//! naming the version, newest first:
//!
//! ```markdown
//! # Release History
//!
//! ### v1.2.0 / 2024-05-01
//!
//! * ADDED: Something new
//! ```

use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, instrument};

use gantry_core::error::ChangelogError;
use gantry_core::{Result, Version};

/// Title written into changelogs created from scratch
pub const DEFAULT_TITLE: &str = "# Release History";

/// Regex for a version heading line
static VERSION_HEADING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#+\s+v?(\d+(?:\.\d+)+)\b").expect("Invalid regex")
});

/// Regex for any Markdown heading line
static HEADING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#+\s").expect("Invalid regex"));

fn heading_version(line: &str) -> Option<Version> {
    let captures = VERSION_HEADING_REGEX.captures(line)?;
    Version::parse(&captures[1]).ok()
}

/// Version of the newest entry, if the changelog has one
pub fn current_version(content: &str) -> Option<Version> {
    content.lines().find_map(heading_version)
}

/// Render one changelog entry
pub fn format_entry<'a, I>(version: &Version, date: NaiveDate, lines: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut entry = format!("### v{} / {}\n\n", version, date.format("%Y-%m-%d"));
    for line in lines {
        entry.push_str("* ");
        entry.push_str(line);
        entry.push('\n');
    }
    entry
}

/// Insert a rendered entry above the newest existing entry
///
/// Everything before the first version heading (the title block) is kept in
/// place. A changelog with no entries gets the entry appended; an empty one
/// gets a default title first.
pub fn insert_entry(content: &str, entry: &str) -> String {
    if content.trim().is_empty() {
        return format!("{}\n\n{}", DEFAULT_TITLE, entry);
    }

    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if heading_version(line).is_some() {
            let (head, tail) = content.split_at(offset);
            return format!("{}{}\n{}", head, entry, tail);
        }
        offset += line.len();
    }

    format!("{}\n\n{}", content.trim_end(), entry)
}

/// Body of the entry for `version`, without its heading
pub fn entry_body(content: &str, version: &Version) -> Option<String> {
    let mut lines = content.lines();
    lines.find(|line| heading_version(line).as_ref() == Some(version))?;

    let body: Vec<&str> = lines
        .take_while(|line| !HEADING_REGEX.is_match(line))
        .collect();
    Some(body.join("\n").trim().to_string())
}

/// Read a changelog file
pub fn read_changelog(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(ChangelogError::FileNotFound(path.to_path_buf()).into());
    }
    Ok(std::fs::read_to_string(path).map_err(ChangelogError::Io)?)
}

/// Prepend a new entry to the changelog at `path`
#[instrument(skip(lines), fields(path = %path.display()))]
pub fn update_changelog<'a, I>(path: &Path, version: &Version, date: NaiveDate, lines: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let content = if path.exists() {
        read_changelog(path)?
    } else {
        String::new()
    };

    if current_version(&content).is_some_and(|current| current >= *version) {
        return Err(ChangelogError::Malformed {
            path: path.to_path_buf(),
            reason: format!("already has an entry for {} or later", version),
        }
        .into());
    }

    let updated = insert_entry(&content, &format_entry(version, date, lines));
    std::fs::write(path, updated).map_err(ChangelogError::Io)?;
    debug!(%version, "updated changelog");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CHANGELOG: &str = "# Release History\n\n### v1.2.0 / 2024-05-01\n\n* ADDED: Thing\n* FIXED: Other\n\n### v1.1.0 / 2024-04-01\n\n* ADDED: Older\n";

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
    }

    #[test]
    fn test_current_version() {
        assert_eq!(current_version(CHANGELOG), Some(Version::parse("1.2.0").unwrap()));
        assert_eq!(current_version("# Release History\n"), None);
        assert_eq!(current_version("## 0.3 (unreleased)\n"), Some(Version::parse("0.3").unwrap()));
    }

    #[test]
    fn test_format_entry() {
        let entry = format_entry(&Version::parse("1.3.0").unwrap(), date(), ["ADDED: New"]);
        assert_eq!(entry, "### v1.3.0 / 2024-06-02\n\n* ADDED: New\n");
    }

    #[test]
    fn test_insert_entry_above_newest() {
        let entry = format_entry(&Version::parse("1.3.0").unwrap(), date(), ["ADDED: New"]);
        let updated = insert_entry(CHANGELOG, &entry);
        assert!(updated.starts_with(
            "# Release History\n\n### v1.3.0 / 2024-06-02\n\n* ADDED: New\n\n### v1.2.0"
        ));
        assert_eq!(current_version(&updated), Some(Version::parse("1.3.0").unwrap()));
    }

    #[test]
    fn test_insert_entry_into_empty_changelogs() {
        let entry = format_entry(&Version::parse("0.1.0").unwrap(), date(), ["FIXED: X"]);
        assert_eq!(
            insert_entry("", &entry),
            "# Release History\n\n### v0.1.0 / 2024-06-02\n\n* FIXED: X\n"
        );
        assert_eq!(
            insert_entry("# Changes\n", &entry),
            "# Changes\n\n### v0.1.0 / 2024-06-02\n\n* FIXED: X\n"
        );
    }

    #[test]
    fn test_entry_body() {
        let body = entry_body(CHANGELOG, &Version::parse("1.2.0").unwrap()).unwrap();
        assert_eq!(body, "* ADDED: Thing\n* FIXED: Other");
        let body = entry_body(CHANGELOG, &Version::parse("1.1").unwrap()).unwrap();
        assert_eq!(body, "* ADDED: Older");
        assert_eq!(entry_body(CHANGELOG, &Version::parse("9.0.0").unwrap()), None);
    }

    #[test]
    fn test_update_changelog_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("CHANGELOG.md");
        std::fs::write(&path, CHANGELOG).unwrap();

        update_changelog(&path, &Version::parse("1.2.1").unwrap(), date(), ["FIXED: Y"]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(current_version(&content), Some(Version::parse("1.2.1").unwrap()));

        let again = update_changelog(&path, &Version::parse("1.2.1").unwrap(), date(), ["FIXED: Y"]);
        assert!(again.is_err());
    }

    #[test]
    fn test_read_missing_changelog() {
        let temp = TempDir::new().unwrap();
        assert!(read_changelog(&temp.path().join("CHANGELOG.md")).is_err());
    }
}
