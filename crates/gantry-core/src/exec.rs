//! Command execution
//!
//! Every external tool Gantry drives (git network operations, `gh`,
//! `cargo`) goes through a [`CommandRunner`]. The default
//! [`SystemRunner`] spawns real processes; tests substitute a scripted
//! runner so pipelines can be exercised without side effects.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;

use tracing::{debug, info};

use crate::error::{GantryError, Result};

/// Where a child's output stream goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Capture into the returned [`ExecOutput`]
    #[default]
    Capture,
    /// Pass through to the parent's stream
    Inherit,
    /// Discard
    Null,
}

impl OutputMode {
    fn stdio(self) -> Stdio {
        match self {
            Self::Capture => Stdio::piped(),
            Self::Inherit => Stdio::inherit(),
            Self::Null => Stdio::null(),
        }
    }
}

/// Options for a single command execution
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Data written to the child's stdin
    pub stdin: Option<String>,
    /// Stdout handling
    pub stdout: OutputMode,
    /// Stderr handling
    pub stderr: OutputMode,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
    /// Fail with an error when the command exits unsuccessfully
    pub check: bool,
}

impl ExecOptions {
    /// Capture output and fail on non-zero exit
    pub fn checked() -> Self {
        Self {
            check: true,
            ..Default::default()
        }
    }

    /// Feed `input` to the child's stdin
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Run in `dir`
    pub fn with_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set how stdout is handled
    pub fn with_stdout(mut self, mode: OutputMode) -> Self {
        self.stdout = mode;
        self
    }

    /// Set how stderr is handled
    pub fn with_stderr(mut self, mode: OutputMode) -> Self {
        self.stderr = mode;
        self
    }
}

/// Result of running a command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Whether the command exited successfully
    pub success: bool,
    /// Exit code if available
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ExecOutput {
    /// A successful result with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given stderr
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(1),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external commands
pub trait CommandRunner: Send + Sync {
    /// Run `argv` (program first) with the given options
    fn exec(&self, argv: &[String], options: &ExecOptions) -> Result<ExecOutput>;
}

/// A runner shared between the components that issue commands
pub type SharedRunner = std::sync::Arc<dyn CommandRunner>;

/// Build an owned argv from string slices
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts.into_iter().map(|p| p.as_ref().to_string()).collect()
}

/// Runner that spawns real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    /// Create a new system runner
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn exec(&self, argv: &[String], options: &ExecOptions) -> Result<ExecOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| GantryError::other("cannot execute an empty command"))?;
        let command_line = argv.join(" ");
        let start = Instant::now();
        debug!(command = %command_line, cwd = ?options.cwd, "executing command");

        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = &options.cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in &options.env {
            cmd.env(k, v);
        }
        cmd.stdin(if options.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(options.stdout.stdio());
        cmd.stderr(options.stderr.stdio());

        let mut child = cmd
            .spawn()
            .map_err(|e| GantryError::command(&command_line, e.to_string()))?;

        if let Some(input) = &options.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input.as_bytes())
                    .map_err(|e| GantryError::command(&command_line, e.to_string()))?;
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| GantryError::command(&command_line, e.to_string()))?;

        let result = ExecOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        info!(
            command = %command_line,
            success = result.success,
            duration_ms = start.elapsed().as_millis(),
            "command finished"
        );

        if options.check && !result.success {
            let reason = match result.exit_code {
                Some(code) => format!("exited with status {}: {}", code, result.stderr.trim()),
                None => format!("terminated by signal: {}", result.stderr.trim()),
            };
            return Err(GantryError::command(command_line, reason));
        }

        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_stdout() {
        let out = SystemRunner::new()
            .exec(&argv(["echo", "hello"]), &ExecOptions::default())
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_stdin_is_forwarded() {
        let out = SystemRunner::new()
            .exec(&argv(["cat"]), &ExecOptions::default().with_stdin("payload"))
            .unwrap();
        assert_eq!(out.stdout, "payload");
    }

    #[test]
    fn test_checked_failure_is_an_error() {
        let result = SystemRunner::new().exec(&argv(["false"]), &ExecOptions::checked());
        assert!(matches!(result, Err(GantryError::Command { .. })));

        let unchecked = SystemRunner::new()
            .exec(&argv(["false"]), &ExecOptions::default())
            .unwrap();
        assert!(!unchecked.success);
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(SystemRunner::new()
            .exec(&[], &ExecOptions::default())
            .is_err());
    }
}
