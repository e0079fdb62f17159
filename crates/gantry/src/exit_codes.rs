//! Exit codes for the CLI

use gantry_core::error::WorkflowError;
use gantry_core::GantryError;

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Git error
pub const GIT_ERROR: i32 = 3;

/// Version error
pub const VERSION_ERROR: i32 = 4;

/// Validation error
pub const VALIDATION_ERROR: i32 = 5;

/// A release ran but at least one component failed
pub const RELEASE_FAILED: i32 = 6;

/// Pick the exit code for an error returned by a command
pub fn for_error(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ReleaseFailed>().is_some() {
        return RELEASE_FAILED;
    }
    match err.downcast_ref::<GantryError>() {
        Some(GantryError::Config(_)) => CONFIG_ERROR,
        Some(GantryError::Git(_)) => GIT_ERROR,
        Some(GantryError::Version(_)) => VERSION_ERROR,
        Some(GantryError::Accumulated { .. })
        | Some(GantryError::Workflow(WorkflowError::ValidationFailed(_)))
        | Some(GantryError::Workflow(WorkflowError::PreConditionFailed(_))) => VALIDATION_ERROR,
        _ => ERROR,
    }
}

/// Marker error for a perform run whose report contains failures
#[derive(Debug)]
pub struct ReleaseFailed;

impl std::fmt::Display for ReleaseFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "One or more components failed to release")
    }
}

impl std::error::Error for ReleaseFailed {}
