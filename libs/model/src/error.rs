//! Error types for model construction.

use thiserror::Error;

/// Errors that can occur when building model values from external input.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A constraint string could not be parsed.
    #[error("invalid constraint '{input}': {reason}")]
    InvalidConstraint { input: String, reason: String },

    /// A constraint pattern failed to compile.
    #[error("invalid constraint pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A profile failed validation.
    #[error("invalid profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
