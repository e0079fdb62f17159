//! User-defined command step

use gantry_core::Result;

use super::{Step, StepContext, StepOutcome};

/// Runs an arbitrary command in the component directory
///
/// The command may change things anywhere, so dry-run mode does not run it.
pub struct RunCommand {
    pub(super) name: String,
    pub(super) command: Vec<String>,
}

impl Step for RunCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
        let line = self.command.join(" ");
        if ctx.dry_run {
            ctx.dry_run_success(format!("would run `{}`", line));
            return Ok(StepOutcome::Continue);
        }

        ctx.run_in_component(&self.command)?;
        ctx.success(format!("Ran `{}`", line));
        Ok(StepOutcome::Continue)
    }
}
