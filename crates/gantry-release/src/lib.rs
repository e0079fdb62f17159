//! Gantry Release - Release requests and release pipelines
//!
//! This crate holds the release workflow proper: the component model and
//! coordination groups, the [`Repository`] façade over git and GitHub,
//! version resolution for release requests, and the [`Performer`] that runs
//! each component's release pipeline.

pub mod artifacts;
pub mod component;
pub mod groups;
pub mod package_index;
pub mod performer;
pub mod repository;
pub mod request_logic;
pub mod request_spec;
pub mod steps;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use artifacts::ArtifactDir;
pub use component::Component;
pub use groups::{CoordinationGroups, GroupId};
pub use package_index::{CratesIoIndex, PackageIndex};
pub use performer::{ComponentResult, Performer, PerformerOptions};
pub use repository::{CheckPolling, Repository};
pub use request_logic::{RequestLogic, RequestOutcome};
pub use request_spec::{parse_request, resolve_versions, RequestSpec, ResolvedUnit, VersionRequest};
pub use steps::{Pipeline, PipelineOutcome, Step, StepContext, StepOutcome};
