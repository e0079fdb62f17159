//! Version declaration files
//!
//! A component declares its version either in a Cargo manifest
//! (`package.version`) or as a constant assignment in a source file, such
//! as `VERSION = "1.2.3"` or `pub const VERSION: &str = "1.2.3";`.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use toml_edit::{value, DocumentMut};
use tracing::{debug, instrument};

use gantry_core::error::VersionError;
use gantry_core::{GantryError, Result, Version};

/// Regex for a version constant assignment
static VERSION_CONSTANT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bVERSION\b[^=\n]*=\s*"(\d+(?:\.\d+)*)""#).expect("Invalid regex")
});

fn is_manifest(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name == "Cargo.toml")
}

fn parse_manifest(path: &Path, content: &str) -> Result<DocumentMut> {
    content.parse::<DocumentMut>().map_err(|e| {
        GantryError::Version(VersionError::ParseFailed(format!(
            "{}: {}",
            path.display(),
            e
        )))
    })
}

/// Version declared in `content`, the text of the file at `path`
pub fn read_version(path: &Path, content: &str) -> Result<Option<Version>> {
    let raw = if is_manifest(path) {
        let doc = parse_manifest(path, content)?;
        doc.get("package")
            .and_then(|p| p.get("version"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    } else {
        VERSION_CONSTANT_REGEX
            .captures(content)
            .map(|c| c[1].to_string())
    };

    match raw {
        Some(raw) => Ok(Some(Version::parse(&raw)?)),
        None => Ok(None),
    }
}

/// Package name declared in a Cargo manifest
pub fn manifest_package_name(path: &Path, content: &str) -> Result<Option<String>> {
    let doc = parse_manifest(path, content)?;
    Ok(doc
        .get("package")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
        .map(str::to_string))
}

/// Rewrite the version declared in `content`, preserving everything else
pub fn replace_version(path: &Path, content: &str, version: &Version) -> Result<String> {
    if is_manifest(path) {
        let mut doc = parse_manifest(path, content)?;
        let Some(package) = doc.get_mut("package").and_then(|p| p.as_table_mut()) else {
            return Err(VersionError::NotFound(path.to_path_buf()).into());
        };
        package["version"] = value(version.to_string());
        return Ok(doc.to_string());
    }

    let captures = VERSION_CONSTANT_REGEX
        .captures(content)
        .ok_or_else(|| VersionError::NotFound(path.to_path_buf()))?;
    let Some(span) = captures.get(1) else {
        return Err(VersionError::NotFound(path.to_path_buf()).into());
    };

    let mut updated = String::with_capacity(content.len());
    updated.push_str(&content[..span.start()]);
    updated.push_str(&version.to_string());
    updated.push_str(&content[span.end()..]);
    Ok(updated)
}

/// Read the version from the file at `path`
pub fn read_version_file(path: &Path) -> Result<Option<Version>> {
    if !path.exists() {
        return Err(VersionError::NotFound(path.to_path_buf()).into());
    }
    let content = std::fs::read_to_string(path)?;
    read_version(path, &content)
}

/// Rewrite the version in the file at `path`
#[instrument(fields(path = %path.display()))]
pub fn update_version_file(path: &Path, version: &Version) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .map_err(|_| GantryError::Version(VersionError::NotFound(path.to_path_buf())))?;
    let updated = replace_version(path, &content, version)?;
    std::fs::write(path, updated)?;
    debug!("updated version file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"[package]
name = "engine"
version = "1.0.0" # bumped by release tooling
edition = "2021"

# This is a comment

[dependencies]
serde = "1.0"
"#;

    #[test]
    fn test_read_constant_forms() {
        let path = Path::new("src/version.rs");
        assert_eq!(
            read_version(path, "pub const VERSION: &str = \"0.3.1\";\n").unwrap(),
            Some(Version::parse("0.3.1").unwrap())
        );
        assert_eq!(
            read_version(Path::new("lib/version.rb"), "  VERSION = \"2.0\"\n").unwrap(),
            Some(Version::parse("2.0").unwrap())
        );
        assert_eq!(read_version(path, "// nothing here\n").unwrap(), None);
    }

    #[test]
    fn test_read_manifest() {
        let path = Path::new("engine/Cargo.toml");
        assert_eq!(
            read_version(path, MANIFEST).unwrap(),
            Some(Version::parse("1.0.0").unwrap())
        );
        assert_eq!(
            manifest_package_name(path, MANIFEST).unwrap().as_deref(),
            Some("engine")
        );
    }

    #[test]
    fn test_replace_constant() {
        let content = "// generated\npub const VERSION: &str = \"0.3.1\";\npub const NAME: &str = \"x\";\n";
        let updated =
            replace_version(Path::new("version.rs"), content, &Version::parse("0.4.0").unwrap())
                .unwrap();
        assert_eq!(
            updated,
            "// generated\npub const VERSION: &str = \"0.4.0\";\npub const NAME: &str = \"x\";\n"
        );
    }

    #[test]
    fn test_replace_manifest_preserves_formatting() {
        let updated = replace_version(
            Path::new("Cargo.toml"),
            MANIFEST,
            &Version::parse("2.0.0").unwrap(),
        )
        .unwrap();
        assert!(updated.contains("version = \"2.0.0\""));
        assert!(updated.contains("# This is a comment"));
        assert!(updated.contains("[dependencies]"));
    }

    #[test]
    fn test_replace_missing_declaration() {
        let result = replace_version(Path::new("x.rs"), "fn main() {}", &Version::zero());
        assert!(matches!(
            result,
            Err(GantryError::Version(VersionError::NotFound(_)))
        ));
    }

    #[test]
    fn test_update_version_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Cargo.toml");
        std::fs::write(&path, MANIFEST).unwrap();

        update_version_file(&path, &Version::parse("1.1.0").unwrap()).unwrap();
        assert_eq!(
            read_version_file(&path).unwrap(),
            Some(Version::parse("1.1.0").unwrap())
        );
    }
}
