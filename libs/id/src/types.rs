//! Typed ID definitions.
//!
//! Offer, agent, framework and executor IDs are minted by the offer source
//! and treated as opaque. Task IDs are minted here.

use crate::{define_id, IdError};

// =============================================================================
// Offer Source
// =============================================================================

define_id!(OfferId);
define_id!(AgentId);
define_id!(FrameworkId);
define_id!(ExecutorId);

// =============================================================================
// Tasks
// =============================================================================

define_id!(TaskId);

/// Separator between the segments of a task ID.
pub const TASK_ID_SEPARATOR: char = '.';

impl TaskId {
    /// Generates a fresh task ID of the form `{task_type}.{profile}.{uuid}`.
    pub fn generate(task_type: &str, profile: &str) -> Result<Self, IdError> {
        if task_type.is_empty() {
            return Err(IdError::MissingTaskType(String::new()));
        }
        if task_type.contains(TASK_ID_SEPARATOR) {
            return Err(IdError::InvalidFormat {
                value: task_type.to_string(),
                reason: format!("task type may not contain '{TASK_ID_SEPARATOR}'"),
            });
        }
        Self::parse(&format!(
            "{task_type}{TASK_ID_SEPARATOR}{profile}{TASK_ID_SEPARATOR}{}",
            uuid::Uuid::new_v4()
        ))
    }

    /// Returns the task type: everything before the first `.`.
    ///
    /// IDs without a separator are their own task type.
    #[must_use]
    pub fn task_type(&self) -> &str {
        self.0
            .split(TASK_ID_SEPARATOR)
            .next()
            .unwrap_or(self.0.as_str())
    }
}

/// Validates an opaque ID string.
#[doc(hidden)]
pub fn validate(s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    if let Some(c) = s.chars().find(|c| c.is_control()) {
        return Err(IdError::InvalidFormat {
            value: s.escape_debug().to_string(),
            reason: format!("control character {:?}", c),
        });
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
