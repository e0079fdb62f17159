//! Cargo steps: fetch, package, document and publish a crate

use std::path::PathBuf;

use gantry_core::error::StepError;
use gantry_core::exec::argv;
use gantry_core::Result;

use super::{Step, StepContext, StepOutcome};

/// Resolves and downloads dependencies
pub struct Bundle {
    pub(super) name: String,
}

impl Step for Bundle {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
        ctx.run_in_component(&argv(["cargo", "fetch"]))?;
        ctx.success(format!("Fetched dependencies of {}", ctx.component.name()));
        Ok(StepOutcome::Continue)
    }
}

/// Packages the crate into its artifact directory
pub struct BuildPackage {
    pub(super) name: String,
}

impl Step for BuildPackage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
        let target = ctx.artifact_dir(&self.name)?;
        ctx.run_in_component(&argv([
            "cargo",
            "package",
            "--no-verify",
            "--target-dir",
            &target.display().to_string(),
        ]))?;
        ctx.success(format!(
            "Built package {} {}",
            ctx.component.package_name(),
            ctx.version
        ));
        Ok(StepOutcome::Continue)
    }
}

/// Builds API documentation into its artifact directory
pub struct BuildDocs {
    pub(super) name: String,
}

impl Step for BuildDocs {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
        let target = ctx.artifact_dir(&self.name)?;
        ctx.run_in_component(&argv([
            "cargo",
            "doc",
            "--no-deps",
            "--target-dir",
            &target.display().to_string(),
        ]))?;
        ctx.success(format!("Built docs for {}", ctx.component.name()));
        Ok(StepOutcome::Continue)
    }
}

/// Publishes the package built by `source` to the registry
pub struct ReleasePackage {
    pub(super) name: String,
    pub(super) source: String,
}

impl ReleasePackage {
    fn artifact(&self, ctx: &StepContext<'_>) -> Result<PathBuf> {
        ctx.existing_artifact(&self.source).ok_or_else(|| {
            StepError::MissingArtifact {
                step: self.name.clone(),
                source_step: self.source.clone(),
            }
            .into()
        })
    }
}

impl Step for ReleasePackage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
        let package = ctx.component.package_name();
        if ctx.index.is_published(&package, ctx.version)? {
            return Ok(StepOutcome::Skip(format!(
                "{} {} is already published",
                package, ctx.version
            )));
        }

        let target = self.artifact(ctx)?;
        if ctx.dry_run {
            ctx.dry_run_success(format!("would publish {} {}", package, ctx.version));
            return Ok(StepOutcome::Continue);
        }

        ctx.run_in_component(&argv([
            "cargo",
            "publish",
            "--no-verify",
            "--target-dir",
            &target.display().to_string(),
        ]))?;
        ctx.success(format!("Published {} {}", package, ctx.version));
        Ok(StepOutcome::Continue)
    }
}
