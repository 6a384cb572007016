//! Task records.

use bytes::Bytes;
use flex_id::AgentId;

use crate::{Attribute, Constraint, ResourceProfile};

/// The five disjoint lifecycle sets a task can belong to. A task in none of
/// them is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleState {
    Pending,
    Staging,
    Active,
    Lost,
    Killable,
}

impl LifecycleState {
    /// Every state, in snapshot order.
    pub const ALL: [LifecycleState; 5] = [
        Self::Pending,
        Self::Staging,
        Self::Active,
        Self::Lost,
        Self::Killable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Staging => "staging",
            Self::Active => "active",
            Self::Lost => "lost",
            Self::Killable => "killable",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the scheduler remembers about one task.
///
/// `status` and `executor_info` are opaque blobs owned by the offer source;
/// they are stored and replayed but never interpreted here.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub profile: ResourceProfile,
    pub constraint: Constraint,
    /// Host the task was placed on, empty until launched.
    pub hostname: String,
    pub agent_id: Option<AgentId>,
    pub executor_info: Option<Bytes>,
    pub status: Option<Bytes>,
    /// Task type, used to group tasks and enforce one-per-host placement.
    pub task_type: String,
    /// Attributes last seen on this task's agent. Not persisted.
    pub agent_attributes: Vec<Attribute>,
}

impl Task {
    pub fn new(profile: ResourceProfile, constraint: Constraint, task_type: impl Into<String>) -> Self {
        Self {
            profile,
            constraint,
            hostname: String::new(),
            agent_id: None,
            executor_info: None,
            status: None,
            task_type: task_type.into(),
            agent_attributes: Vec::new(),
        }
    }

    /// True once the task has been placed on a host.
    pub fn is_placed(&self) -> bool {
        !self.hostname.is_empty()
    }

    /// Records where the task was launched.
    pub fn record_placement(
        &mut self,
        hostname: impl Into<String>,
        agent_id: AgentId,
        executor_info: Option<Bytes>,
    ) {
        self.hostname = hostname.into();
        self.agent_id = Some(agent_id);
        self.executor_info = executor_info;
    }

    /// Forgets a placement whose launch never went out.
    pub fn clear_placement(&mut self) {
        self.hostname.clear();
        self.agent_id = None;
        self.executor_info = None;
    }
}
