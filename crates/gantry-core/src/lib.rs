//! Gantry Core - Core library for release orchestration
//!
//! This crate provides the foundational types shared by the rest of Gantry:
//! error handling and error accumulation, repository settings, semver
//! levels and versions, and the command execution facility used for every
//! external tool invocation.

pub mod accumulate;
pub mod config;
pub mod error;
pub mod exec;
pub mod semver;
pub mod version;

pub use accumulate::Accumulator;
pub use error::{GantryError, Result};
pub use exec::{CommandRunner, ExecOptions, ExecOutput, OutputMode, SharedRunner, SystemRunner};
pub use semver::Semver;
pub use version::Version;
