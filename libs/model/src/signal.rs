//! Task status signals delivered by the offer source.

use bytes::Bytes;
use flex_id::TaskId;

/// Lifecycle signal carried by a status update.
///
/// Signals may arrive duplicated or out of order; consumers treat each one
/// as an absolute membership assignment, never as a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleSignal {
    Staging,
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
    /// Anything else. Logged and ignored.
    Unrecognized(String),
}

impl LifecycleSignal {
    /// Parses the offer source's state name, e.g. `TASK_RUNNING` or `running`.
    pub fn from_state_name(name: &str) -> Self {
        let trimmed = name.strip_prefix("TASK_").unwrap_or(name);
        match trimmed.to_ascii_lowercase().as_str() {
            "staging" => Self::Staging,
            "starting" => Self::Starting,
            "running" => Self::Running,
            "finished" => Self::Finished,
            "failed" => Self::Failed,
            "killed" => Self::Killed,
            "lost" => Self::Lost,
            _ => Self::Unrecognized(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Staging => "staging",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Killed => "killed",
            Self::Lost => "lost",
            Self::Unrecognized(name) => name,
        }
    }

    /// True for signals after which the task no longer runs.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Killed | Self::Lost)
    }
}

impl std::fmt::Display for LifecycleSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status update: which task, what happened, and the opaque status blob.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub task_id: TaskId,
    pub signal: LifecycleSignal,
    pub data: Bytes,
}

impl StatusUpdate {
    pub fn new(task_id: TaskId, signal: LifecycleSignal, data: impl Into<Bytes>) -> Self {
        Self {
            task_id,
            signal,
            data: data.into(),
        }
    }
}
