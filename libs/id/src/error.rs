//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID contains characters that cannot round-trip through the state blob.
    #[error("invalid ID '{value}': {reason}")]
    InvalidFormat { value: String, reason: String },

    /// A task ID is missing its task-type segment.
    #[error("task ID '{0}' has no task type segment")]
    MissingTaskType(String),
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
