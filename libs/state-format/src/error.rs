use thiserror::Error;

/// Snapshot encode/decode errors.
#[derive(Debug, Error)]
pub enum StateFormatError {
    /// The blob ended before a field could be read.
    #[error("truncated snapshot: needed {needed} bytes for {field}, {remaining} left")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    /// A field exceeds what a `u32` length prefix can carry.
    #[error("{field} is too large to encode ({len} bytes)")]
    TooLarge { field: &'static str, len: usize },

    /// A text field was not valid UTF-8.
    #[error("{field} is not valid utf-8")]
    InvalidUtf8 {
        field: &'static str,
        #[source]
        source: std::str::Utf8Error,
    },

    /// An ID field failed validation.
    #[error("invalid {field}: {source}")]
    InvalidId {
        field: &'static str,
        #[source]
        source: flex_id::IdError,
    },

    /// A structured-text field failed to parse.
    #[error("invalid {field}: {source}")]
    InvalidField {
        field: &'static str,
        #[source]
        source: flex_model::ModelError,
    },

    #[error("unknown constraint tag {0}")]
    UnknownConstraintTag(u32),

    /// A required field was zero-length.
    #[error("missing {0}")]
    MissingField(&'static str),

    /// ID and record counts disagree.
    #[error("snapshot has {ids} task ids but {records} task records")]
    RecordCountMismatch { ids: usize, records: usize },

    /// A lifecycle set names a task with no record.
    #[error("task {task_id} is in the {state} set but has no record")]
    OrphanedId { task_id: String, state: &'static str },

    /// A task appears in more than one lifecycle set.
    #[error("task {task_id} appears in more than one lifecycle set")]
    DuplicateMembership { task_id: String },

    #[error("{0} trailing bytes after snapshot")]
    TrailingBytes(usize),
}
