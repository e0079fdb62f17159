//! CLI commands

mod abort;
mod check;
mod perform;
mod request;

use std::sync::Arc;

use gantry_core::SystemRunner;
use gantry_release::Repository;

pub use abort::AbortCommand;
pub use check::CheckCommand;
pub use perform::PerformCommand;
pub use request::RequestCommand;

/// Open the repository around the current directory with real tools
fn open_repository() -> anyhow::Result<Repository> {
    let cwd = std::env::current_dir()?;
    Ok(Repository::open(&cwd, Arc::new(SystemRunner::new()))?)
}
