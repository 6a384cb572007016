//! The task store.
//!
//! Each task is in at most one of five lifecycle sets: pending, staging,
//! active, lost, killable. A task in none of them is known but idle; a
//! removed task is absent. Moving a task to a set takes it out of every
//! other set, so any transition is legal and repeated or reordered status
//! signals converge to the same state.
//!
//! Every mutation writes a snapshot to the [`StateStore`] before returning.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use flex_id::{AgentId, FrameworkId, TaskId};
use flex_model::{Attribute, LifecycleState, Task};
use flex_state_format::StateSnapshot;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::store::{MemoryStateStore, StateStore};
use crate::error::{SchedulerError, SchedulerResult};

struct Entry {
    task: Task,
    state: Option<LifecycleState>,
    /// Status sequence number of the last attached status; 0 if none was
    /// attached since startup. Not persisted.
    status_seq: u64,
}

impl Entry {
    fn new(task: Task, state: Option<LifecycleState>) -> Self {
        Self {
            task,
            state,
            status_seq: 0,
        }
    }
}

#[derive(Default)]
struct Inner {
    framework_id: Option<FrameworkId>,
    tasks: HashMap<TaskId, Entry>,
    status_seq: u64,
}

impl Inner {
    fn from_snapshot(snapshot: StateSnapshot) -> Self {
        let StateSnapshot {
            framework_id,
            tasks,
            membership,
        } = snapshot;
        let tasks = tasks
            .into_iter()
            .map(|(id, task)| {
                let state = membership.get(&id).copied();
                (id, Entry::new(task, state))
            })
            .collect();
        Self {
            framework_id,
            tasks,
            status_seq: 0,
        }
    }

    fn snapshot(&self) -> StateSnapshot {
        let mut snapshot = StateSnapshot::new();
        snapshot.framework_id = self.framework_id.clone();
        for (id, entry) in &self.tasks {
            snapshot.tasks.insert(id.clone(), entry.task.clone());
            if let Some(state) = entry.state {
                snapshot.membership.insert(id.clone(), state);
            }
        }
        snapshot
    }

    fn ids_where<F>(&self, predicate: F) -> BTreeSet<TaskId>
    where
        F: Fn(&Entry) -> bool,
    {
        self.tasks
            .iter()
            .filter(|(_, entry)| predicate(entry))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Task records and lifecycle membership.
pub struct TaskLifecycleStore {
    inner: Mutex<Inner>,
    store: Arc<dyn StateStore>,
}

impl TaskLifecycleStore {
    /// Opens the task store, restoring from the latest saved blob.
    ///
    /// A missing, unreadable or undecodable blob starts the store empty.
    pub fn open(store: Arc<dyn StateStore>) -> Self {
        let inner = restore(store.as_ref());
        Self {
            inner: Mutex::new(inner),
            store,
        }
    }

    /// A store backed by a fresh [`MemoryStateStore`].
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryStateStore::new()))
    }

    // =========================================================================
    // Framework identity
    // =========================================================================

    pub fn framework_id(&self) -> Option<FrameworkId> {
        self.inner.lock().framework_id.clone()
    }

    /// Records the framework identity. It can be set once; setting the same
    /// value again is a no-op.
    pub fn set_framework_id(&self, framework_id: FrameworkId) -> SchedulerResult<()> {
        let mut inner = self.inner.lock();
        match &inner.framework_id {
            Some(existing) if *existing == framework_id => return Ok(()),
            Some(existing) => {
                return Err(SchedulerError::FrameworkIdConflict {
                    existing: existing.to_string(),
                    requested: framework_id.to_string(),
                })
            }
            None => {}
        }
        info!(framework_id = %framework_id, "Framework registered");
        inner.framework_id = Some(framework_id);
        self.persist(&inner);
        Ok(())
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Creates tasks with fresh IDs and places them in pending.
    pub fn add_tasks(&self, tasks: Vec<Task>) -> SchedulerResult<Vec<TaskId>> {
        let mut created = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = TaskId::generate(&task.task_type, &task.profile.name)?;
            created.push((id, task));
        }
        if created.is_empty() {
            return Ok(Vec::new());
        }

        let mut inner = self.inner.lock();
        let mut ids = Vec::with_capacity(created.len());
        for (id, task) in created {
            info!(task_id = %id, profile = %task.profile.name, "Task added");
            inner
                .tasks
                .insert(id.clone(), Entry::new(task, Some(LifecycleState::Pending)));
            ids.push(id);
        }
        self.persist(&inner);
        Ok(ids)
    }

    /// Inserts or replaces a task record. Lifecycle membership is untouched;
    /// a new task belongs to no set until it is moved into one.
    pub fn upsert(&self, task_id: TaskId, task: Task) {
        let mut inner = self.inner.lock();
        match inner.tasks.get_mut(&task_id) {
            Some(entry) => entry.task = task,
            None => {
                inner.tasks.insert(task_id, Entry::new(task, None));
            }
        }
        self.persist(&inner);
    }

    pub fn make_pending(&self, task_id: &TaskId) -> bool {
        self.transition(task_id, LifecycleState::Pending)
    }

    pub fn make_staging(&self, task_id: &TaskId) -> bool {
        self.transition(task_id, LifecycleState::Staging)
    }

    pub fn make_active(&self, task_id: &TaskId) -> bool {
        self.transition(task_id, LifecycleState::Active)
    }

    pub fn make_lost(&self, task_id: &TaskId) -> bool {
        self.transition(task_id, LifecycleState::Lost)
    }

    pub fn make_killable(&self, task_id: &TaskId) -> bool {
        self.transition(task_id, LifecycleState::Killable)
    }

    /// Moves a task into `state`, out of every other set.
    ///
    /// Returns false, changing nothing, if the task is unknown.
    pub fn transition(&self, task_id: &TaskId, state: LifecycleState) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.tasks.get_mut(task_id) else {
            warn!(task_id = %task_id, to = %state, "Transition for unknown task ignored");
            return false;
        };
        let from = entry.state.replace(state);
        if from != Some(state) {
            info!(
                task_id = %task_id,
                from = from.map(LifecycleState::as_str).unwrap_or("none"),
                to = %state,
                "Task transitioned"
            );
        }
        self.persist(&inner);
        true
    }

    /// Moves every lost task back to pending for re-placement.
    pub fn requeue_lost(&self) -> Vec<TaskId> {
        let mut inner = self.inner.lock();
        let mut requeued = Vec::new();
        for (id, entry) in inner.tasks.iter_mut() {
            if entry.state == Some(LifecycleState::Lost) {
                entry.state = Some(LifecycleState::Pending);
                requeued.push(id.clone());
            }
        }
        if !requeued.is_empty() {
            requeued.sort();
            info!(count = requeued.len(), "Requeued lost tasks");
            self.persist(&inner);
        }
        requeued
    }

    /// Deletes a task from every set and from the record map.
    pub fn remove(&self, task_id: &TaskId) -> Option<Task> {
        let mut inner = self.inner.lock();
        let removed = inner.tasks.remove(task_id).map(|entry| entry.task);
        match &removed {
            Some(_) => info!(task_id = %task_id, "Task removed"),
            None => debug!(task_id = %task_id, "Remove for unknown task"),
        }
        self.persist(&inner);
        removed
    }

    /// Replaces the opaque status blob. Membership is untouched.
    pub fn attach_status(&self, task_id: &TaskId, status: Bytes) -> bool {
        let mut inner = self.inner.lock();
        let seq = inner.status_seq + 1;
        let Some(entry) = inner.tasks.get_mut(task_id) else {
            warn!(task_id = %task_id, "Status for unknown task ignored");
            return false;
        };
        entry.task.status = Some(status);
        entry.status_seq = seq;
        inner.status_seq = seq;
        self.persist(&inner);
        true
    }

    /// Records where a task was launched.
    pub fn record_placement(
        &self,
        task_id: &TaskId,
        hostname: &str,
        agent_id: AgentId,
        executor_info: Option<Bytes>,
    ) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.tasks.get_mut(task_id) else {
            warn!(task_id = %task_id, "Placement for unknown task ignored");
            return false;
        };
        entry.task.record_placement(hostname, agent_id, executor_info);
        self.persist(&inner);
        true
    }

    /// Places a task and moves it to staging, but only if it is still
    /// pending. Checking and placing happen under one lock, so a task that
    /// was marked killable or removed meanwhile is never claimed.
    pub fn claim_pending(
        &self,
        task_id: &TaskId,
        hostname: &str,
        agent_id: AgentId,
        executor_info: Option<Bytes>,
    ) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.tasks.get_mut(task_id) else {
            debug!(task_id = %task_id, "Claim for unknown task refused");
            return false;
        };
        if entry.state != Some(LifecycleState::Pending) {
            debug!(
                task_id = %task_id,
                state = entry.state.map(LifecycleState::as_str).unwrap_or("none"),
                "Claim for task that is no longer pending refused"
            );
            return false;
        }
        entry.task.record_placement(hostname, agent_id, executor_info);
        entry.state = Some(LifecycleState::Staging);
        info!(task_id = %task_id, hostname = %hostname, "Task claimed for launch");
        self.persist(&inner);
        true
    }

    /// Undoes a claim whose launch failed.
    ///
    /// The placement is forgotten. A task still in staging goes back to
    /// pending; one moved elsewhere meanwhile keeps its new state.
    pub fn release_claim(&self, task_id: &TaskId) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.tasks.get_mut(task_id) else {
            return false;
        };
        entry.task.clear_placement();
        if entry.state == Some(LifecycleState::Staging) {
            entry.state = Some(LifecycleState::Pending);
        }
        info!(task_id = %task_id, "Task claim released");
        self.persist(&inner);
        true
    }

    /// Refreshes the attribute snapshot of every task on an agent.
    ///
    /// Attributes are not part of the snapshot, so nothing is persisted.
    pub fn record_agent_attributes(&self, agent_id: &AgentId, attributes: &[Attribute]) -> usize {
        let mut inner = self.inner.lock();
        let mut updated = 0;
        for entry in inner.tasks.values_mut() {
            if entry.task.agent_id.as_ref() == Some(agent_id) {
                entry.task.agent_attributes = attributes.to_vec();
                updated += 1;
            }
        }
        updated
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn task(&self, task_id: &TaskId) -> Option<Task> {
        self.inner
            .lock()
            .tasks
            .get(task_id)
            .map(|entry| entry.task.clone())
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.inner.lock().tasks.contains_key(task_id)
    }

    /// The set a task is in, `None` if it is in none or unknown.
    pub fn state_of(&self, task_id: &TaskId) -> Option<LifecycleState> {
        self.inner
            .lock()
            .tasks
            .get(task_id)
            .and_then(|entry| entry.state)
    }

    pub fn ids_in(&self, state: LifecycleState) -> BTreeSet<TaskId> {
        self.inner.lock().ids_where(|e| e.state == Some(state))
    }

    pub fn ids_in_for_type(&self, state: LifecycleState, task_type: &str) -> BTreeSet<TaskId> {
        self.inner
            .lock()
            .ids_where(|e| e.state == Some(state) && e.task.task_type == task_type)
    }

    /// Tasks in a set, ordered by ID.
    pub fn tasks_in(&self, state: LifecycleState) -> BTreeMap<TaskId, Task> {
        self.inner
            .lock()
            .tasks
            .iter()
            .filter(|(_, entry)| entry.state == Some(state))
            .map(|(id, entry)| (id.clone(), entry.task.clone()))
            .collect()
    }

    /// Tasks placed on an agent, in any state.
    pub fn tasks_on_agent(&self, agent_id: &AgentId) -> BTreeMap<TaskId, Task> {
        self.inner
            .lock()
            .tasks
            .iter()
            .filter(|(_, entry)| entry.task.agent_id.as_ref() == Some(agent_id))
            .map(|(id, entry)| (id.clone(), entry.task.clone()))
            .collect()
    }

    /// True if a staging or active task of `task_type` runs on `hostname`.
    /// Hostnames compare case-insensitively.
    pub fn is_host_occupied(&self, task_type: &str, hostname: &str) -> bool {
        self.inner.lock().tasks.values().any(|entry| {
            matches!(
                entry.state,
                Some(LifecycleState::Staging | LifecycleState::Active)
            ) && entry.task.task_type == task_type
                && entry.task.hostname.eq_ignore_ascii_case(hostname)
        })
    }

    /// True if an active zero-profile task runs on `hostname`, which puts
    /// the host under elastic sharing.
    pub fn has_elastic_task_on(&self, hostname: &str) -> bool {
        self.inner.lock().tasks.values().any(|entry| {
            entry.state == Some(LifecycleState::Active)
                && entry.task.hostname == hostname
                && entry.task.profile.is_zero()
        })
    }

    /// Every non-empty status blob, for reconciliation with the offer source.
    pub fn task_statuses(&self) -> Vec<(TaskId, Bytes)> {
        self.statuses_where(|_| true)
    }

    /// The current status sequence number. Every attached status gets a
    /// higher one.
    pub fn status_mark(&self) -> u64 {
        self.inner.lock().status_seq
    }

    /// Non-empty statuses not replaced since `mark` was taken.
    pub fn statuses_since_unchanged(&self, mark: u64) -> Vec<(TaskId, Bytes)> {
        self.statuses_where(|entry| entry.status_seq <= mark)
    }

    fn statuses_where<F>(&self, predicate: F) -> Vec<(TaskId, Bytes)>
    where
        F: Fn(&Entry) -> bool,
    {
        let inner = self.inner.lock();
        let mut statuses: Vec<(TaskId, Bytes)> = inner
            .tasks
            .iter()
            .filter(|(_, entry)| predicate(entry))
            .filter_map(|(id, entry)| {
                entry
                    .task
                    .status
                    .as_ref()
                    .filter(|s| !s.is_empty())
                    .map(|s| (id.clone(), s.clone()))
            })
            .collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        statuses
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.inner.lock().snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().tasks.is_empty()
    }

    /// Writes the current state. Called with the lock held so writes land
    /// in mutation order.
    fn persist(&self, inner: &Inner) {
        if let Err(e) = self.write_snapshot(inner) {
            error!(error = %e, "Failed to persist scheduler state");
        }
    }

    fn write_snapshot(&self, inner: &Inner) -> SchedulerResult<()> {
        let blob = inner.snapshot().encode()?;
        self.store.store(&blob)?;
        Ok(())
    }

    /// Writes the current state and reports whether the write landed.
    pub fn checkpoint(&self) -> SchedulerResult<()> {
        let inner = self.inner.lock();
        self.write_snapshot(&inner)
    }
}

fn restore(store: &dyn StateStore) -> Inner {
    let blob = match store.load() {
        Ok(Some(blob)) => blob,
        Ok(None) => {
            debug!("No saved scheduler state");
            return Inner::default();
        }
        Err(e) => {
            error!(error = %e, "Failed to load scheduler state, starting empty");
            return Inner::default();
        }
    };

    match StateSnapshot::decode(&blob) {
        Ok(snapshot) => {
            info!(
                tasks = snapshot.tasks.len(),
                framework_id = snapshot.framework_id.as_ref().map(|f| f.as_str()).unwrap_or(""),
                "Restored scheduler state"
            );
            Inner::from_snapshot(snapshot)
        }
        Err(e) => {
            error!(error = %e, "Failed to decode scheduler state, starting empty");
            Inner::default()
        }
    }
}
