//! Flex-up and flex-down of task instances.

use std::sync::Arc;

use flex_id::TaskId;
use flex_model::{Constraint, LifecycleState, Task};
use tracing::info;

use crate::config::Config;
use crate::error::{SchedulerError, SchedulerResult};
use crate::profiles::ProfileRegistry;
use crate::state::TaskLifecycleStore;

/// A request for more task instances.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexUpRequest {
    pub profile: String,
    pub instances: usize,
    /// `"<attribute> LIKE <regex>"`.
    pub constraint: Option<String>,
    /// Defaults to the configured task type.
    pub task_type: Option<String>,
}

impl FlexUpRequest {
    pub fn new(profile: impl Into<String>, instances: usize) -> Self {
        Self {
            profile: profile.into(),
            instances,
            constraint: None,
            task_type: None,
        }
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }
}

/// Grows and shrinks the task pool.
pub struct FlexOperations {
    store: Arc<TaskLifecycleStore>,
    profiles: Arc<ProfileRegistry>,
    default_task_type: String,
}

impl FlexOperations {
    pub fn new(config: &Config, store: Arc<TaskLifecycleStore>, profiles: Arc<ProfileRegistry>) -> Self {
        Self {
            store,
            profiles,
            default_task_type: config.default_task_type.clone(),
        }
    }

    /// Creates pending tasks. Nothing is created if the request is invalid.
    pub fn flex_up(&self, request: &FlexUpRequest) -> SchedulerResult<Vec<TaskId>> {
        if request.instances == 0 {
            return Err(SchedulerError::InvalidRequest(
                "instances must be at least 1".to_string(),
            ));
        }
        let profile = self
            .profiles
            .get(&request.profile)
            .ok_or_else(|| SchedulerError::UnknownProfile(request.profile.clone()))?;
        let constraint = Constraint::parse_optional(request.constraint.as_deref())?;
        let task_type = request
            .task_type
            .clone()
            .unwrap_or_else(|| self.default_task_type.clone());

        let tasks = (0..request.instances)
            .map(|_| Task::new(profile.clone(), constraint.clone(), task_type.clone()))
            .collect();
        let ids = self.store.add_tasks(tasks)?;

        info!(
            profile = %request.profile,
            task_type = %task_type,
            instances = ids.len(),
            constraint = %constraint,
            "Flexed up"
        );
        Ok(ids)
    }

    /// Marks up to `count` tasks of a type killable: active first, then
    /// staging, then pending.
    pub fn flex_down(&self, task_type: &str, count: usize) -> Vec<TaskId> {
        let mut marked = Vec::new();
        for state in [
            LifecycleState::Active,
            LifecycleState::Staging,
            LifecycleState::Pending,
        ] {
            for id in self.store.ids_in_for_type(state, task_type) {
                if marked.len() == count {
                    break;
                }
                if self.store.make_killable(&id) {
                    marked.push(id);
                }
            }
        }

        info!(task_type = %task_type, requested = count, marked = marked.len(), "Flexed down");
        marked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flex_model::{ModelError, ResourceProfile};

    fn ops() -> (FlexOperations, Arc<TaskLifecycleStore>) {
        let store = Arc::new(TaskLifecycleStore::in_memory());
        let profiles = Arc::new(ProfileRegistry::new(0.0, 0.0));
        profiles.register(ResourceProfile::new("small", 1.0, 1024.0)).unwrap();
        (
            FlexOperations::new(&Config::default(), store.clone(), profiles),
            store,
        )
    }

    #[test]
    fn test_flex_up_creates_pending_tasks() {
        let (ops, store) = ops();
        let ids = ops
            .flex_up(&FlexUpRequest::new("small", 3).with_constraint("hostname LIKE host-.*"))
            .unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(store.ids_in(LifecycleState::Pending).len(), 3);
        let task = store.task(&ids[0]).unwrap();
        assert_eq!(task.task_type, "nm");
        assert_eq!(task.constraint.to_string(), "hostname LIKE host-.*");
    }

    #[test]
    fn test_flex_up_rejects_bad_requests() {
        let (ops, store) = ops();

        assert!(matches!(
            ops.flex_up(&FlexUpRequest::new("huge", 1)),
            Err(SchedulerError::UnknownProfile(_))
        ));
        assert!(matches!(
            ops.flex_up(&FlexUpRequest::new("small", 1).with_constraint("a LIKE b LIKE c")),
            Err(SchedulerError::Model(ModelError::InvalidConstraint { .. }))
        ));
        assert!(matches!(
            ops.flex_up(&FlexUpRequest::new("small", 1).with_constraint("hostname LIKE [")),
            Err(SchedulerError::Model(ModelError::InvalidPattern { .. }))
        ));
        assert!(matches!(
            ops.flex_up(&FlexUpRequest::new("small", 0)),
            Err(SchedulerError::InvalidRequest(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_flex_up_task_type_override() {
        let (ops, store) = ops();
        let ids = ops
            .flex_up(&FlexUpRequest::new("small", 1).with_task_type("jhs"))
            .unwrap();
        assert!(ids[0].as_str().starts_with("jhs.small."));
        assert_eq!(store.task(&ids[0]).unwrap().task_type, "jhs");
    }

    #[test]
    fn test_flex_down_prefers_active_then_staging() {
        let (ops, store) = ops();
        let ids = ops.flex_up(&FlexUpRequest::new("small", 4)).unwrap();
        store.make_active(&ids[2]);
        store.make_staging(&ids[3]);

        let marked = ops.flex_down("nm", 3);
        assert_eq!(marked.len(), 3);
        assert_eq!(marked[0], ids[2]);
        assert_eq!(marked[1], ids[3]);
        assert_eq!(store.ids_in(LifecycleState::Killable).len(), 3);
        assert_eq!(store.ids_in(LifecycleState::Pending).len(), 1);

        assert_eq!(ops.flex_down("jhs", 5), Vec::<TaskId>::new());
    }
}
