//! Settings loading

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::defaults::config_file_names;
use super::types::Settings;
use super::validation::validate_settings;

/// Load settings from a file
pub fn load_settings(path: &Path) -> Result<Settings> {
    let format = if path.extension().is_some_and(|e| e == "toml") {
        "TOML"
    } else {
        "YAML"
    };
    info!(path = %path.display(), format, "loading settings");

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    let settings = parse_settings(&content, format == "TOML")?;

    validate_settings(&settings)?;
    debug!(path = %path.display(), components = settings.components.len(), "settings loaded and validated");
    Ok(settings)
}

/// Parse settings text without validating it
pub fn parse_settings(content: &str, is_toml: bool) -> Result<Settings> {
    let settings: Settings = if is_toml {
        toml::from_str(content).map_err(ConfigError::TomlError)?
    } else {
        serde_yaml::from_str(content).map_err(ConfigError::YamlError)?
    };
    Ok(settings)
}

/// Find a settings file in a directory or its parents.
///
/// At each directory level the search checks:
///   1. `<dir>/<name>`          (e.g. `gantry.toml`)
///   2. `<dir>/.github/<name>`  (e.g. `.github/gantry.yml`)
///
/// The first match wins. Parents are walked until the filesystem root.
pub fn find_settings(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for settings file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let path = current.join(name);
            if path.exists() {
                info!(path = %path.display(), "found settings file");
                return Some(path);
            }

            let github_path = current.join(".github").join(name);
            if github_path.exists() {
                info!(path = %github_path.display(), "found settings file in .github/");
                return Some(github_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no settings file found");
    None
}

/// Load settings by searching from a directory
pub fn load_settings_from_dir(dir: &Path) -> Result<(Settings, PathBuf)> {
    let path = find_settings(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;
    let settings = load_settings(&path)?;
    Ok((settings, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ComponentKind, StepKind};
    use crate::semver::Semver;
    use tempfile::TempDir;

    const TOML_SETTINGS: &str = r#"
repo = "acme/rockets"
coordination_groups = [["engine", "engine-macros"]]

[[commit_tags]]
tag = "feat"
header = "ADDED"
semver = "minor"

[[commit_tags]]
tag = "chore"
hidden = true

[[components]]
name = "engine"
kind = "crate"

[components.pages]
enabled = true

[[components]]
name = "engine-macros"
kind = "crate"

[[components.steps]]
kind = "build_package"

[[components.steps]]
kind = "release_package"

[[components.steps]]
name = "smoke"
kind = "command"
command = ["cargo", "test"]
abort_pipeline_on_error = true
"#;

    #[test]
    fn test_find_settings_in_github_dir() {
        let temp = TempDir::new().unwrap();
        let github_dir = temp.path().join(".github");
        std::fs::create_dir_all(&github_dir).unwrap();
        let path = github_dir.join("gantry.yml");
        std::fs::write(&path, "main_branch: trunk\n").unwrap();

        assert_eq!(find_settings(temp.path()), Some(path));
    }

    #[test]
    fn test_root_level_preferred_over_github_dir() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("gantry.toml");
        std::fs::create_dir_all(temp.path().join(".github")).unwrap();
        std::fs::write(&root, "main_branch = \"trunk\"\n").unwrap();
        std::fs::write(temp.path().join(".github/gantry.toml"), "").unwrap();

        assert_eq!(find_settings(temp.path()), Some(root));
    }

    #[test]
    fn test_load_toml_settings() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gantry.toml");
        std::fs::write(&path, TOML_SETTINGS).unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.repo.as_deref(), Some("acme/rockets"));
        assert_eq!(settings.main_branch, "main");
        assert_eq!(settings.commit_tags.len(), 2);
        assert_eq!(settings.commit_tags[1].semver, Semver::None);
        assert!(settings.commit_tags[1].hidden);

        let engine = settings.component("engine").unwrap();
        assert_eq!(engine.kind, ComponentKind::Crate);
        assert!(engine.pages.enabled);
        assert_eq!(engine.pages.branch, "gh-pages");

        let steps = settings.component("engine-macros").unwrap().steps.clone().unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(
            steps[1].kind,
            StepKind::ReleasePackage {
                source: "build_package".to_string()
            }
        );
        assert_eq!(steps[2].effective_name(), "smoke");
        assert!(steps[2].abort_pipeline_on_error);
    }

    #[test]
    fn test_load_yaml_settings() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gantry.yaml");
        std::fs::write(
            &path,
            "repo: acme/tools\ncomponents:\n  - name: cli\n    directory: .\n",
        )
        .unwrap();

        let settings = load_settings(&path).unwrap();
        let cli = settings.component("cli").unwrap();
        assert_eq!(cli.kind, ComponentKind::Basic);
        assert_eq!(cli.effective_directory(), PathBuf::from("."));
        assert_eq!(settings.commit_tags.len(), 10);
    }

    #[test]
    fn test_load_invalid_settings_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gantry.yaml");
        std::fs::write(
            &path,
            "components:\n  - name: a\n  - name: a\ncoordination_groups: [[a, ghost]]\n",
        )
        .unwrap();

        let err = load_settings(&path).unwrap_err();
        assert_eq!(err.messages().len(), 2);
    }
}
