//! Release pipeline steps
//!
//! Each component is released by running its pipeline: an ordered list of
//! named steps. Steps that change something outside the repository check
//! first whether the change was already made, so a failed release can be
//! performed again.

mod cargo;
mod command;
mod github_release;
mod pages;

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use gantry_core::accumulate::accumulate_errors;
use gantry_core::config::{ComponentKind, StepKind, StepSettings};
use gantry_core::exec::ExecOptions;
use gantry_core::{ExecOutput, Result, Version};

use crate::artifacts::ArtifactDir;
use crate::component::Component;
use crate::package_index::PackageIndex;
use crate::performer::ComponentResult;
use crate::repository::Repository;

pub use cargo::{BuildDocs, BuildPackage, Bundle, ReleasePackage};
pub use command::RunCommand;
pub use github_release::GithubRelease;
pub use pages::PushPages;

/// What a step asks the pipeline to do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step did its work; go on
    Continue,
    /// The work was already done; go on
    Skip(String),
    /// Stop this component's pipeline
    Abort(String),
}

/// Everything a step can use while it runs
pub struct StepContext<'a> {
    pub repo: &'a Repository,
    pub component: &'a Component,
    pub version: &'a Version,
    pub release_sha: &'a str,
    pub artifacts: &'a ArtifactDir,
    pub index: &'a dyn PackageIndex,
    pub dry_run: bool,
    pub result: &'a mut ComponentResult,
}

impl StepContext<'_> {
    /// Absolute path of the component directory
    pub fn component_dir(&self) -> PathBuf {
        self.repo.root().join(self.component.directory())
    }

    /// Run a command in the component directory, failing on non-zero exit
    pub fn run_in_component(&self, argv: &[String]) -> Result<ExecOutput> {
        let options = ExecOptions::checked().with_cwd(self.component_dir());
        self.repo.runner().exec(argv, &options)
    }

    /// This component's artifact directory for step `name`, created on use
    pub fn artifact_dir(&self, name: &str) -> Result<PathBuf> {
        self.artifacts.get(self.component.name(), name)
    }

    /// This component's artifact directory for step `name`, if it exists
    pub fn existing_artifact(&self, name: &str) -> Option<PathBuf> {
        self.artifacts.existing(self.component.name(), name)
    }

    /// Record a successful action
    pub fn success(&mut self, line: impl Into<String>) {
        self.result.success(line);
    }

    /// Record what dry-run mode left out
    pub fn dry_run_success(&mut self, action: impl Into<String>) {
        self.result.success(format!("DRY RUN: {}", action.into()));
    }
}

/// One stage of a release pipeline
pub trait Step {
    /// Name, unique within the pipeline
    fn name(&self) -> &str;

    /// Run the step
    fn run(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome>;
}

/// How a pipeline run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every step ran
    Completed,
    /// A step failed or aborted; the component stopped
    Stopped,
    /// A step marked `abort_pipeline_on_error` failed; the whole run stops
    AbortRun,
}

struct ConfiguredStep {
    step: Box<dyn Step>,
    abort_pipeline_on_error: bool,
}

/// A validated, ordered list of steps for one component
pub struct Pipeline {
    steps: Vec<ConfiguredStep>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Pipeline {
    /// The component's configured pipeline, or its default one
    pub fn for_component(component: &Component, enable_docs: bool) -> Result<Self> {
        match component.configured_steps() {
            Some(steps) => Self::from_settings(component, steps),
            None => Self::from_settings(component, &default_steps(component, enable_docs)),
        }
    }

    /// Build a pipeline, reporting every configuration problem at once
    pub fn from_settings(component: &Component, settings: &[StepSettings]) -> Result<Self> {
        let heading = format!("Invalid release pipeline for {}", component.name());
        accumulate_errors(heading, |acc| {
            let mut seen: HashSet<String> = HashSet::new();
            let mut steps = Vec::new();

            for step in settings {
                let name = step.effective_name();

                if !seen.insert(name.clone()) {
                    acc.error(format!("step name {} is used more than once", name));
                }

                let crate_only = matches!(
                    step.kind,
                    StepKind::Bundle
                        | StepKind::BuildPackage
                        | StepKind::BuildDocs
                        | StepKind::ReleasePackage { .. }
                );
                if crate_only && component.kind() == ComponentKind::Basic {
                    acc.error(format!(
                        "step {} needs a crate, but {} is a {} component",
                        name,
                        component.name(),
                        component.kind()
                    ));
                }

                match &step.kind {
                    StepKind::ReleasePackage { source } | StepKind::PushPages { source } => {
                        // Sources must run earlier; `seen` holds only earlier names plus this one
                        if *source == name || !seen.contains(source) {
                            acc.error(format!(
                                "step {} takes its input from {}, which is not an earlier step",
                                name, source
                            ));
                        }
                    }
                    StepKind::Command { command } if command.is_empty() => {
                        acc.error(format!("step {} has an empty command", name));
                    }
                    _ => {}
                }

                steps.push(ConfiguredStep {
                    step: build_step(name, &step.kind),
                    abort_pipeline_on_error: step.abort_pipeline_on_error,
                });
            }

            Ok(Self { steps })
        })
    }

    /// Step names in order
    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.step.name()).collect()
    }

    /// Run every step in order, stopping at the first failure
    pub fn run(&self, ctx: &mut StepContext<'_>) -> PipelineOutcome {
        let component = ctx.component.name().to_string();
        for configured in &self.steps {
            let name = configured.step.name();
            debug!(component = %component, step = name, "running step");

            match configured.step.run(ctx) {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Skip(reason)) => {
                    info!(component = %component, step = name, reason = %reason, "step skipped");
                    ctx.success(format!("Skipped {}: {}", name, reason));
                }
                Ok(StepOutcome::Abort(reason)) => {
                    warn!(component = %component, step = name, reason = %reason, "step aborted");
                    ctx.result
                        .error(format!("Stopped at {}: {}", name, reason));
                    return PipelineOutcome::Stopped;
                }
                Err(e) => {
                    error!(component = %component, step = name, error = %e, "step failed");
                    ctx.result.error(format!("Step {} failed: {}", name, e));
                    return if configured.abort_pipeline_on_error {
                        PipelineOutcome::AbortRun
                    } else {
                        PipelineOutcome::Stopped
                    };
                }
            }
        }
        PipelineOutcome::Completed
    }
}

/// Default pipeline for a component
///
/// Basic components only get a GitHub release. Crates are fetched,
/// packaged and published; docs are built and pushed when pages are enabled
/// or docs were requested for the run.
pub fn default_steps(component: &Component, enable_docs: bool) -> Vec<StepSettings> {
    match component.kind() {
        ComponentKind::Basic => vec![StepSettings::new(StepKind::GithubRelease)],
        ComponentKind::Crate => {
            let docs = enable_docs || component.pages().enabled;
            let mut steps = vec![
                StepSettings::new(StepKind::Bundle),
                StepSettings::new(StepKind::BuildPackage),
            ];
            if docs {
                steps.push(StepSettings::new(StepKind::BuildDocs));
            }
            steps.push(StepSettings::new(StepKind::GithubRelease));
            steps.push(StepSettings::new(StepKind::ReleasePackage {
                source: StepKind::BuildPackage.default_name().to_string(),
            }));
            if docs {
                steps.push(StepSettings::new(StepKind::PushPages {
                    source: StepKind::BuildDocs.default_name().to_string(),
                }));
            }
            steps
        }
    }
}

fn build_step(name: String, kind: &StepKind) -> Box<dyn Step> {
    match kind {
        StepKind::Bundle => Box::new(Bundle { name }),
        StepKind::BuildPackage => Box::new(BuildPackage { name }),
        StepKind::BuildDocs => Box::new(BuildDocs { name }),
        StepKind::GithubRelease => Box::new(GithubRelease { name }),
        StepKind::ReleasePackage { source } => Box::new(ReleasePackage {
            name,
            source: source.clone(),
        }),
        StepKind::PushPages { source } => Box::new(PushPages {
            name,
            source: source.clone(),
        }),
        StepKind::Command { command } => Box::new(RunCommand {
            name,
            command: command.clone(),
        }),
    }
}
