//! Scratch space shared by pipeline steps
//!
//! Each step that produces something (a packaged crate, built docs) gets a
//! subdirectory named after the component and the step,
//! `{root}/{component}/{step}`. Later steps of the same component look the
//! directory up by the producing step's name.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use gantry_core::Result;

enum Root {
    Explicit(PathBuf),
    Temporary(TempDir),
}

/// Per-run artifact directory
///
/// When no root is given a temporary directory is created and removed when
/// the `ArtifactDir` is dropped.
pub struct ArtifactDir {
    root: Root,
}

impl std::fmt::Debug for ArtifactDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactDir")
            .field("root", &self.root())
            .finish()
    }
}

impl ArtifactDir {
    /// Use `root`, or a fresh temporary directory when `None`
    pub fn new(root: Option<PathBuf>) -> Result<Self> {
        let root = match root {
            Some(path) => {
                std::fs::create_dir_all(&path)?;
                Root::Explicit(path)
            }
            None => Root::Temporary(tempfile::Builder::new().prefix("gantry-").tempdir()?),
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        match &self.root {
            Root::Explicit(path) => path,
            Root::Temporary(dir) => dir.path(),
        }
    }

    fn path(&self, component: &str, name: &str) -> PathBuf {
        self.root().join(component).join(name)
    }

    /// Directory for `component`'s step `name`, created on first use
    pub fn get(&self, component: &str, name: &str) -> Result<PathBuf> {
        let path = self.path(component, name);
        if !path.is_dir() {
            std::fs::create_dir_all(&path)?;
            debug!(component, artifact = name, path = %path.display(), "created artifact directory");
        }
        Ok(path)
    }

    /// Directory for `component`'s step `name`, only if it was created
    pub fn existing(&self, component: &str, name: &str) -> Option<PathBuf> {
        let path = self.path(component, name);
        path.is_dir().then_some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_creation_and_reuse() {
        let artifacts = ArtifactDir::new(None).unwrap();
        assert!(artifacts.existing("engine", "build_package").is_none());

        let first = artifacts.get("engine", "build_package").unwrap();
        std::fs::write(first.join("engine.crate"), "x").unwrap();
        let second = artifacts.get("engine", "build_package").unwrap();

        assert_eq!(first, second);
        assert!(second.join("engine.crate").exists());
        assert_eq!(artifacts.existing("engine", "build_package"), Some(first));
    }

    #[test]
    fn test_components_do_not_share_directories() {
        let artifacts = ArtifactDir::new(None).unwrap();
        let engine = artifacts.get("engine", "build_docs").unwrap();
        std::fs::write(engine.join("engine.html"), "x").unwrap();

        assert!(artifacts.existing("macros", "build_docs").is_none());
        let macros = artifacts.get("macros", "build_docs").unwrap();
        assert_ne!(engine, macros);
        assert!(!macros.join("engine.html").exists());
    }

    #[test]
    fn test_temporary_root_removed_on_drop() {
        let artifacts = ArtifactDir::new(None).unwrap();
        let root = artifacts.root().to_path_buf();
        assert!(root.is_dir());
        drop(artifacts);
        assert!(!root.exists());
    }

    #[test]
    fn test_explicit_root_kept() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("artifacts");
        let artifacts = ArtifactDir::new(Some(root.clone())).unwrap();
        artifacts.get("site", "docs").unwrap();
        drop(artifacts);
        assert!(root.join("site/docs").is_dir());
    }
}
