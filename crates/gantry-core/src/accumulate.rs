//! Error accumulation
//!
//! Most validation in Gantry reports every problem at once instead of
//! stopping at the first one. An [`Accumulator`] collects error messages
//! under a heading; [`Accumulator::finish`] turns them into a single
//! [`GantryError::Accumulated`] if any were recorded.

use tracing::{error, warn};

use crate::error::{GantryError, Result};

/// Collects errors and warnings for a batch of checks
#[derive(Debug, Clone)]
pub struct Accumulator {
    heading: String,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Accumulator {
    /// Start a new accumulation scope
    pub fn new(heading: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Record an error
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!(heading = %self.heading, "{}", message);
        self.errors.push(message);
    }

    /// Record a warning
    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(heading = %self.heading, "{}", message);
        self.warnings.push(message);
    }

    /// Record the error of a failed result, returning the success value if any
    pub fn absorb<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                for message in err.messages() {
                    self.error(message);
                }
                None
            }
        }
    }

    /// Whether any errors were recorded
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Recorded errors
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Recorded warnings
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Close the scope, failing with every recorded error
    pub fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(GantryError::Accumulated {
                heading: self.heading,
                errors: self.errors,
            })
        }
    }
}

/// Run `f` inside an accumulation scope
///
/// Errors recorded on the accumulator, and an error returned by `f` itself,
/// are reported together once the closure completes.
pub fn accumulate_errors<T, F>(heading: impl Into<String>, f: F) -> Result<T>
where
    F: FnOnce(&mut Accumulator) -> Result<T>,
{
    let mut acc = Accumulator::new(heading);
    let value = f(&mut acc);
    match value {
        Ok(value) => acc.finish().map(|_| value),
        Err(err) => {
            acc.absorb::<()>(Err(err));
            Err(GantryError::Accumulated {
                heading: acc.heading,
                errors: acc.errors,
            })
        }
    }
}
