//! Documentation publishing to a pages branch

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use gantry_core::error::StepError;
use gantry_core::{GantryError, Result, Version};
use gantry_git::{clone_branch, GitRepo};

use super::{Step, StepContext, StepOutcome};

/// Pushes docs built by `source` to the component's pages branch
///
/// Each version lives in `{site_dir}/v{version}`; `{site_dir}/index.html`
/// redirects to the newest one.
pub struct PushPages {
    pub(super) name: String,
    pub(super) source: String,
}

impl Step for PushPages {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
        let docs = ctx
            .existing_artifact(&self.source)
            .ok_or_else(|| StepError::MissingArtifact {
                step: self.name.clone(),
                source_step: self.source.clone(),
            })?;

        let (repo, component) = (ctx.repo, ctx.component);
        let pages = component.pages();
        let site_dir = pages
            .directory
            .clone()
            .unwrap_or_else(|| component.name().to_string());
        let url = repo.git().remote_url(&repo.settings().git_remote)?;

        let checkout = tempfile::Builder::new().prefix("gantry-pages-").tempdir()?;
        clone_branch(repo.runner(), &url, &pages.branch, checkout.path())?;

        let version_dir = Path::new(&site_dir).join(format!("v{}", ctx.version));
        if checkout.path().join(&version_dir).exists() {
            return Ok(StepOutcome::Skip(format!(
                "docs for {} are already on {}",
                ctx.version, pages.branch
            )));
        }
        if ctx.dry_run {
            ctx.dry_run_success(format!(
                "would push docs to {}:{}",
                pages.branch,
                version_dir.display()
            ));
            return Ok(StepOutcome::Continue);
        }

        stage_docs(
            checkout.path(),
            &site_dir,
            ctx.version,
            &docs_root(&docs),
            &component.package_name(),
        )?;

        let site = GitRepo::open(checkout.path())?.with_runner(repo.runner().clone());
        let message = format!("docs: {} {}", component.name(), ctx.version);
        site.commit_all(&message, &repo.commit_identity())?;
        site.push_branch("origin", &pages.branch, false)?;

        info!(component = component.name(), branch = %pages.branch, "pushed docs");
        ctx.success(format!(
            "Pushed docs for {} {} to {}",
            component.name(),
            ctx.version,
            pages.branch
        ));
        Ok(StepOutcome::Continue)
    }
}

/// Where the built HTML lives inside a docs artifact
fn docs_root(artifact: &Path) -> PathBuf {
    let doc = artifact.join("doc");
    if doc.is_dir() {
        doc
    } else {
        artifact.to_path_buf()
    }
}

/// Copy `docs` into the site checkout and point the index at it
fn stage_docs(
    site_root: &Path,
    site_dir: &str,
    version: &Version,
    docs: &Path,
    package: &str,
) -> Result<PathBuf> {
    let version_name = format!("v{}", version);
    let dest = site_root.join(site_dir).join(&version_name);
    copy_tree(docs, &dest)?;

    let crate_dir = package.replace('-', "_");
    let target = if dest.join(&crate_dir).join("index.html").exists() {
        format!("{}/{}/index.html", version_name, crate_dir)
    } else {
        format!("{}/index.html", version_name)
    };
    std::fs::write(site_root.join(site_dir).join("index.html"), redirect_page(&target))?;

    debug!(dest = %dest.display(), target = %target, "staged docs");
    Ok(dest)
}

fn redirect_page(target: &str) -> String {
    format!(
        concat!(
            "<!DOCTYPE html>\n",
            "<html>\n",
            "<head>\n",
            "<meta charset=\"utf-8\">\n",
            "<meta http-equiv=\"refresh\" content=\"0; url={0}\">\n",
            "<link rel=\"canonical\" href=\"{0}\">\n",
            "</head>\n",
            "<body><a href=\"{0}\">{0}</a></body>\n",
            "</html>\n"
        ),
        target
    )
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| GantryError::other(format!("Failed to read docs: {}", e)))?;
        if entry.file_name() == ".lock" {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| GantryError::other(e.to_string()))?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_stage_docs() {
        let docs = TempDir::new().unwrap();
        std::fs::create_dir_all(docs.path().join("doc/rocket_engine")).unwrap();
        std::fs::write(docs.path().join("doc/rocket_engine/index.html"), "api").unwrap();
        std::fs::write(docs.path().join("doc/.lock"), "").unwrap();

        let site = TempDir::new().unwrap();
        let version = Version::parse("1.2.0").unwrap();
        let dest = stage_docs(
            site.path(),
            "engine",
            &version,
            &docs_root(docs.path()),
            "rocket-engine",
        )
        .unwrap();

        assert_eq!(dest, site.path().join("engine/v1.2.0"));
        assert!(dest.join("rocket_engine/index.html").exists());
        assert!(!dest.join(".lock").exists());
        let index = std::fs::read_to_string(site.path().join("engine/index.html")).unwrap();
        assert!(index.contains("url=v1.2.0/rocket_engine/index.html"));
    }

    #[test]
    fn test_redirect_falls_back_to_version_index() {
        let docs = TempDir::new().unwrap();
        std::fs::write(docs.path().join("index.html"), "site").unwrap();

        let site = TempDir::new().unwrap();
        let version = Version::parse("0.3.0").unwrap();
        stage_docs(site.path(), "site", &version, &docs_root(docs.path()), "site").unwrap();

        let index = std::fs::read_to_string(site.path().join("site/index.html")).unwrap();
        assert!(index.contains("href=\"v0.3.0/index.html\""));
        assert!(site.path().join("site/v0.3.0/index.html").exists());
    }
}
