//! GitHub release step

use tracing::info;

use gantry_core::Result;
use gantry_git::github::NewRelease;

use super::{Step, StepContext, StepOutcome};

/// Tags the release commit and creates a GitHub release
///
/// Release notes are the component's changelog entry for the version.
pub struct GithubRelease {
    pub(super) name: String,
}

impl Step for GithubRelease {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
        let (repo, component) = (ctx.repo, ctx.component);
        let tag = component.release_tag(ctx.version);
        let github = repo.github();

        if github.release_exists(&tag)? {
            return Ok(StepOutcome::Skip(format!("release {} already exists", tag)));
        }
        if ctx.dry_run {
            ctx.dry_run_success(format!("would create GitHub release {}", tag));
            return Ok(StepOutcome::Continue);
        }

        let body = component.changelog_entry(repo.root(), ctx.version)?;
        github.create_release(&NewRelease {
            tag_name: tag.clone(),
            target_commitish: ctx.release_sha.to_string(),
            name: format!("{} {}", component.name(), ctx.version),
            body,
            prerelease: false,
        })?;
        info!(tag = %tag, sha = ctx.release_sha, "created GitHub release");
        ctx.success(format!("Created GitHub release {}", tag));
        Ok(StepOutcome::Continue)
    }
}
