//! errors.rs - Custom error types for the dcmscrub-core library.
//!
//! Only conditions that must abort the current unit of work are errors. Missing
//! optional attributes, failed reference lookups and cardinality hazards are
//! reported as values by the components that detect them.
//!
//! License: MIT OR APACHE 2.0

use std::path::PathBuf;
use thiserror::Error;

/// All error types in the `dcmscrub-core` library.
///
/// `#[non_exhaustive]` so that new variants can be added without breaking
/// downstream matches.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ScrubError {
    #[error("Failed to read record '{}': {reason}", path.display())]
    RecordRead { path: PathBuf, reason: String },

    #[error("Failed to write record '{}': {reason}", path.display())]
    RecordWrite { path: PathBuf, reason: String },

    #[error("Malformed anonymizer script '{}': line {line} does not contain '{expected}'", path.display())]
    MalformedScript {
        path: PathBuf,
        line: usize,
        expected: String,
    },

    #[error("Record #{index} has no {attribute}; it cannot be placed along the scan axis")]
    MissingGeometry { index: usize, attribute: &'static str },

    #[error("Record #{index} has an invalid {attribute}: '{value}'")]
    InvalidGeometry {
        index: usize,
        attribute: &'static str,
        value: String,
    },

    #[error("Failed to compile classification rule '{0}': {1}")]
    RuleCompilation(String, regex::Error),

    #[error("Invalid classifier configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} is not a valid UID root")]
    InvalidUidRoot(String),

    #[error("An unexpected I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("A fatal error occurred: {0}")]
    Fatal(String),
}

impl ScrubError {
    pub(crate) fn read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ScrubError::RecordRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ScrubError::RecordWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
