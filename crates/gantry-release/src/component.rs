//! Releasable components
//!
//! A component is one releasable artifact in the repository: a directory
//! with a changelog and a version declaration, optionally a Rust crate with
//! its manifest. Its release history lives in tags named
//! `{name}/v{version}`.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, instrument};

use gantry_changelog::{changelog, version_file, ChangeSet, ChangeSetConfig};
use gantry_core::config::{ComponentKind, ComponentSettings, PagesSettings, StepSettings};
use gantry_core::error::{ChangelogError, VersionError};
use gantry_core::{Accumulator, Result, Version};
use gantry_git::GitRepo;

use crate::groups::GroupId;

/// One releasable component
#[derive(Debug, Clone)]
pub struct Component {
    settings: ComponentSettings,
    directory: PathBuf,
    group: GroupId,
}

impl Component {
    pub(crate) fn new(settings: ComponentSettings, group: GroupId) -> Self {
        let directory = settings.effective_directory();
        Self {
            settings,
            directory,
            group,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn kind(&self) -> ComponentKind {
        self.settings.kind
    }

    pub fn settings(&self) -> &ComponentSettings {
        &self.settings
    }

    /// Coordination group this component belongs to
    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Directory relative to the repository root
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Changelog path relative to the repository root
    pub fn changelog_path(&self) -> PathBuf {
        self.directory.join(self.settings.effective_changelog_path())
    }

    /// Version declaration file relative to the repository root
    pub fn version_file_path(&self) -> PathBuf {
        self.directory.join(self.settings.effective_version_file())
    }

    /// Cargo manifest relative to the repository root, for crates
    pub fn manifest_path(&self) -> Option<PathBuf> {
        match self.kind() {
            ComponentKind::Crate => Some(self.directory.join("Cargo.toml")),
            ComponentKind::Basic => None,
        }
    }

    pub fn package_name(&self) -> String {
        self.settings.effective_package_name()
    }

    pub fn pages(&self) -> &PagesSettings {
        &self.settings.pages
    }

    /// Explicitly configured steps, if any
    pub fn configured_steps(&self) -> Option<&[StepSettings]> {
        self.settings.steps.as_deref()
    }

    /// Tag marking the release of `version`
    pub fn release_tag(&self, version: &Version) -> String {
        format!("{}/v{}", self.name(), version)
    }

    fn tag_prefix(&self) -> String {
        format!("{}/v", self.name())
    }

    /// Check the component's files against its settings
    pub fn validate(&self, root: &Path, acc: &mut Accumulator) {
        let name = self.name();
        if !root.join(&self.directory).is_dir() {
            acc.error(format!(
                "Component {}: directory {} does not exist",
                name,
                self.directory.display()
            ));
            return;
        }

        if let Err(e) = changelog::read_changelog(&root.join(self.changelog_path())) {
            acc.error(format!("Component {}: {}", name, e));
        }

        let version_path = self.version_file_path();
        match version_file::read_version_file(&root.join(&version_path)) {
            Ok(Some(_)) => {}
            Ok(None) => acc.error(format!(
                "Component {}: {} does not declare a version",
                name,
                version_path.display()
            )),
            Err(e) => acc.error(format!("Component {}: {}", name, e)),
        }

        if let Some(manifest) = self.manifest_path() {
            let full = root.join(&manifest);
            match std::fs::read_to_string(&full) {
                Ok(content) => match version_file::manifest_package_name(&manifest, &content) {
                    Ok(Some(package)) if package == self.package_name() => {}
                    Ok(Some(package)) => acc.error(format!(
                        "Component {}: {} names package {}, expected {}",
                        name,
                        manifest.display(),
                        package,
                        self.package_name()
                    )),
                    Ok(None) => acc.error(format!(
                        "Component {}: {} has no package name",
                        name,
                        manifest.display()
                    )),
                    Err(e) => acc.error(format!("Component {}: {}", name, e)),
                },
                Err(_) => acc.error(format!(
                    "Component {}: manifest {} does not exist",
                    name,
                    manifest.display()
                )),
            }
        }
    }

    /// Current version, read from the working tree or from `at`
    ///
    /// The changelog's newest entry wins; the version file is consulted only
    /// when the changelog has no entries.
    pub fn current_version(&self, git: &GitRepo, at: Option<&str>) -> Result<Option<Version>> {
        let read = |path: &Path| -> Result<Option<String>> {
            match at {
                Some(rev) => Ok(git.show_file(rev, path)?),
                None => {
                    let full = git.path().join(path);
                    if full.exists() {
                        Ok(Some(std::fs::read_to_string(full)?))
                    } else {
                        Ok(None)
                    }
                }
            }
        };

        if let Some(content) = read(&self.changelog_path())? {
            if let Some(version) = changelog::current_version(&content) {
                return Ok(Some(version));
            }
        }

        let version_path = self.version_file_path();
        match read(&version_path)? {
            Some(content) => version_file::read_version(&version_path, &content),
            None => Ok(None),
        }
    }

    /// Highest released version among tags reachable from `rev`
    pub fn latest_tag_version(&self, git: &GitRepo, rev: &str) -> Result<Option<Version>> {
        let prefix = self.tag_prefix();
        let latest = git
            .tags_reachable_from(rev)?
            .iter()
            .filter_map(|tag| tag.strip_prefix(&prefix))
            .filter_map(|v| Version::parse(v).ok())
            .max();
        debug!(component = self.name(), latest = ?latest.as_ref().map(|v| v.to_string()), "latest release tag");
        Ok(latest)
    }

    /// Parse the commits in `(from, to]` that belong to this component
    ///
    /// A commit belongs to the component if it touched a file under the
    /// component directory, or if its message contains
    /// `touch-component: {name}`. In a single-component repository every
    /// commit belongs to the component.
    #[instrument(skip(self, git, config), fields(component = %self.name()))]
    pub fn make_change_set(
        &self,
        git: &GitRepo,
        config: &ChangeSetConfig,
        from: Option<&str>,
        to: &str,
        single_component: bool,
    ) -> Result<ChangeSet> {
        let touch_marker = format!("touch-component: {}", self.name());
        let mut change_set = ChangeSet::new(config.clone());

        for commit in git.commits_between(from, to)? {
            let included = single_component
                || commit.touches(&self.directory)
                || commit
                    .message
                    .lines()
                    .any(|line| line.trim() == touch_marker);
            if included {
                change_set.add_message(&commit.hash, &commit.message)?;
            }
        }

        change_set.finish()?;
        Ok(change_set)
    }

    /// Check that the changelog and version file both report `claimed`
    pub fn verify_version(&self, root: &Path, claimed: &Version, acc: &mut Accumulator) {
        let changelog_path = self.changelog_path();
        let found = changelog::read_changelog(&root.join(&changelog_path))
            .map(|content| changelog::current_version(&content));
        self.compare_version(&changelog_path, found, claimed, acc);

        let version_path = self.version_file_path();
        let found = version_file::read_version_file(&root.join(&version_path));
        self.compare_version(&version_path, found, claimed, acc);
    }

    fn compare_version(
        &self,
        path: &Path,
        found: Result<Option<Version>>,
        claimed: &Version,
        acc: &mut Accumulator,
    ) {
        match found {
            Ok(Some(version)) if version == *claimed => {}
            Ok(Some(version)) => acc.error(format!(
                "Component {}: {}",
                self.name(),
                VersionError::Mismatch {
                    file: path.to_path_buf(),
                    found: version.to_string(),
                    expected: claimed.to_string(),
                }
            )),
            Ok(None) => acc.error(format!(
                "Component {}: {}",
                self.name(),
                VersionError::NotFound(path.to_path_buf())
            )),
            Err(e) => acc.error(format!("Component {}: {}", self.name(), e)),
        }
    }

    /// Prepend a changelog entry for `version`
    pub fn update_changelog(
        &self,
        root: &Path,
        version: &Version,
        change_set: &ChangeSet,
        date: NaiveDate,
    ) -> Result<()> {
        changelog::update_changelog(
            &root.join(self.changelog_path()),
            version,
            date,
            change_set.prefixed_lines(),
        )
    }

    /// Rewrite the version declaration
    pub fn update_version_file(&self, root: &Path, version: &Version) -> Result<()> {
        version_file::update_version_file(&root.join(self.version_file_path()), version)
    }

    /// Body of the changelog entry for `version`
    pub fn changelog_entry(&self, root: &Path, version: &Version) -> Result<String> {
        let path = root.join(self.changelog_path());
        let content = changelog::read_changelog(&path)?;
        changelog::entry_body(&content, version).ok_or_else(|| {
            ChangelogError::Malformed {
                path,
                reason: format!("no entry for version {}", version),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{commit, init_workspace};

    fn engine() -> Component {
        let settings = gantry_core::config::Settings {
            components: vec![ComponentSettings::new("engine", ComponentKind::Crate)],
            ..Default::default()
        };
        let groups = crate::groups::CoordinationGroups::build(&settings);
        Component::new(
            settings.components[0].clone(),
            groups.group_of("engine").unwrap(),
        )
    }

    #[test]
    fn test_paths() {
        let component = engine();
        assert_eq!(component.changelog_path(), PathBuf::from("engine/CHANGELOG.md"));
        assert_eq!(component.version_file_path(), PathBuf::from("engine/Cargo.toml"));
        assert_eq!(
            component.release_tag(&Version::parse("1.2.0").unwrap()),
            "engine/v1.2.0"
        );
    }

    #[test]
    fn test_validate_workspace() {
        let (temp, _git) = init_workspace(&["engine"]);
        let mut acc = Accumulator::new("validate");
        engine().validate(temp.path(), &mut acc);
        assert!(!acc.has_errors(), "{:?}", acc.errors());

        std::fs::remove_file(temp.path().join("engine/CHANGELOG.md")).unwrap();
        let mut acc = Accumulator::new("validate");
        engine().validate(temp.path(), &mut acc);
        assert_eq!(acc.errors().len(), 1);
    }

    #[test]
    fn test_current_version_prefers_changelog() {
        let (temp, git) = init_workspace(&["engine"]);
        let component = engine();
        assert_eq!(
            component.current_version(&git, None).unwrap(),
            Some(Version::parse("0.1.0").unwrap())
        );
        let first = git.head_sha().unwrap();

        std::fs::write(
            temp.path().join("engine/CHANGELOG.md"),
            "# Release History\n\n### v0.2.0 / 2024-01-02\n\n* FIXED: X\n",
        )
        .unwrap();
        commit(&git, "release: engine 0.2.0");

        assert_eq!(
            component.current_version(&git, None).unwrap(),
            Some(Version::parse("0.2.0").unwrap())
        );
        assert_eq!(
            component.current_version(&git, Some(&first)).unwrap(),
            Some(Version::parse("0.1.0").unwrap())
        );
    }

    #[test]
    fn test_latest_tag_version() {
        let (_temp, git) = init_workspace(&["engine"]);
        git.create_tag("engine/v0.1.0", "HEAD").unwrap();
        git.create_tag("engine/v0.10.0", "HEAD").unwrap();
        git.create_tag("engine/v0.9.0", "HEAD").unwrap();
        git.create_tag("engine-macros/v5.0.0", "HEAD").unwrap();

        assert_eq!(
            engine().latest_tag_version(&git, "HEAD").unwrap(),
            Some(Version::parse("0.10.0").unwrap())
        );
    }

    #[test]
    fn test_change_set_filters_by_directory() {
        let (temp, git) = init_workspace(&["engine", "macros"]);
        let base = git.head_sha().unwrap();

        std::fs::write(temp.path().join("engine/src.rs"), "x").unwrap();
        commit(&git, "feat: engine feature");
        std::fs::write(temp.path().join("macros/src.rs"), "y").unwrap();
        commit(&git, "fix: macros fix");
        std::fs::write(temp.path().join("README.md"), "docs").unwrap();
        commit(&git, "docs: readme\n\ntouch-component: engine");

        let config = ChangeSetConfig::default();
        let set = engine()
            .make_change_set(&git, &config, Some(&base), "HEAD", false)
            .unwrap();
        let lines: Vec<_> = set.prefixed_lines().collect();
        assert_eq!(lines, vec!["ADDED: Engine feature", "DOCS: Readme"]);

        let set = engine()
            .make_change_set(&git, &config, Some(&base), "HEAD", true)
            .unwrap();
        assert_eq!(set.prefixed_lines().count(), 3);
    }

    #[test]
    fn test_verify_version() {
        let (temp, _git) = init_workspace(&["engine"]);
        let component = engine();

        let mut acc = Accumulator::new("verify");
        component.verify_version(temp.path(), &Version::parse("0.1.0").unwrap(), &mut acc);
        assert!(!acc.has_errors());

        let mut acc = Accumulator::new("verify");
        component.verify_version(temp.path(), &Version::parse("0.2.0").unwrap(), &mut acc);
        assert_eq!(acc.errors().len(), 2);
    }

    #[test]
    fn test_update_files_and_entry() {
        let (temp, _git) = init_workspace(&["engine"]);
        let component = engine();
        let version = Version::parse("0.2.0").unwrap();

        let mut set = ChangeSet::new(ChangeSetConfig::default());
        set.add_message("abc", "fix: crash on start (#12)").unwrap();
        set.finish().unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        component
            .update_changelog(temp.path(), &version, &set, date)
            .unwrap();
        component.update_version_file(temp.path(), &version).unwrap();

        let mut acc = Accumulator::new("verify");
        component.verify_version(temp.path(), &version, &mut acc);
        assert!(!acc.has_errors(), "{:?}", acc.errors());
        assert_eq!(
            component.changelog_entry(temp.path(), &version).unwrap(),
            "* FIXED: Crash on start"
        );
    }
}
