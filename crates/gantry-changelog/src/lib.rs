//! Gantry Changelog - Change sets and changelog files
//!
//! This crate parses conventional commit messages into a [`ChangeSet`],
//! and reads and edits the two files every component carries: its
//! changelog and its version declaration.

pub mod change_set;
pub mod changelog;
pub mod version_file;

pub use change_set::{ChangeSet, ChangeSetConfig, Group};
pub use changelog::{current_version, entry_body, format_entry, insert_entry, update_changelog};
pub use version_file::{read_version, read_version_file, replace_version, update_version_file};
