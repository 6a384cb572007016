use std::collections::BTreeMap;

use bytes::Bytes;
use flex_id::{AgentId, FrameworkId, TaskId};
use flex_model::{Constraint, ConstraintKind, LifecycleState, LikeConstraint, ResourceProfile, Task};
use tracing::debug;

use crate::codec::{Reader, Writer};
use crate::StateFormatError;

/// A point-in-time copy of the task store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    pub framework_id: Option<FrameworkId>,
    pub tasks: BTreeMap<TaskId, Task>,
    /// Lifecycle set of each task that is in one. Tasks missing here are
    /// known but in no set.
    pub membership: BTreeMap<TaskId, LifecycleState>,
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.framework_id.is_none() && self.tasks.is_empty() && self.membership.is_empty()
    }

    /// IDs in one lifecycle set, in sorted order.
    pub fn ids_in(&self, state: LifecycleState) -> Vec<&TaskId> {
        self.membership
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(id, _)| id)
            .collect()
    }

    /// Encodes the snapshot into the binary blob.
    pub fn encode(&self) -> Result<Bytes, StateFormatError> {
        let mut w = Writer::new();

        let fwid = self.framework_id.as_ref().map(|f| f.as_bytes()).unwrap_or_default();
        w.put_bytes("framework id", fwid)?;

        w.put_u32("task count", self.tasks.len())?;
        for id in self.tasks.keys() {
            w.put_bytes("task id", id.as_bytes())?;
        }

        w.put_u32("record count", self.tasks.len())?;
        for task in self.tasks.values() {
            let record = encode_record(task)?;
            w.put_bytes("task record", &record)?;
        }

        for state in LifecycleState::ALL {
            let ids = self.ids_in(state);
            w.put_u32("set count", ids.len())?;
            for id in ids {
                w.put_bytes("task id", id.as_bytes())?;
            }
        }

        let bytes = w.finish();
        debug!(
            tasks = self.tasks.len(),
            bytes = bytes.len(),
            "Encoded state snapshot"
        );
        Ok(bytes)
    }

    /// Decodes a blob produced by [`StateSnapshot::encode`].
    ///
    /// An empty blob is an empty snapshot.
    pub fn decode(bytes: &[u8]) -> Result<Self, StateFormatError> {
        if bytes.is_empty() {
            return Ok(Self::new());
        }

        let mut r = Reader::new(bytes);
        let mut snapshot = Self::new();

        let fwid = r.get_str("framework id")?;
        if !fwid.is_empty() {
            snapshot.framework_id = Some(
                FrameworkId::parse(fwid)
                    .map_err(|source| StateFormatError::InvalidId { field: "framework id", source })?,
            );
        }

        let id_count = r.get_len("task count")?;
        let mut ids = Vec::with_capacity(id_count.min(r.remaining()));
        for _ in 0..id_count {
            ids.push(read_task_id(&mut r)?);
        }

        let record_count = r.get_len("record count")?;
        if record_count != id_count {
            return Err(StateFormatError::RecordCountMismatch {
                ids: id_count,
                records: record_count,
            });
        }
        for id in ids {
            let record = r.get_bytes("task record")?;
            let task = decode_record(&id, record)?;
            snapshot.tasks.insert(id, task);
        }

        for state in LifecycleState::ALL {
            let count = r.get_len("set count")?;
            for _ in 0..count {
                let id = read_task_id(&mut r)?;
                if !snapshot.tasks.contains_key(&id) {
                    return Err(StateFormatError::OrphanedId {
                        task_id: id.to_string(),
                        state: state.as_str(),
                    });
                }
                if snapshot.membership.insert(id.clone(), state).is_some() {
                    return Err(StateFormatError::DuplicateMembership {
                        task_id: id.to_string(),
                    });
                }
            }
        }

        if r.remaining() > 0 {
            return Err(StateFormatError::TrailingBytes(r.remaining()));
        }

        debug!(tasks = snapshot.tasks.len(), "Decoded state snapshot");
        Ok(snapshot)
    }
}

fn read_task_id(r: &mut Reader<'_>) -> Result<TaskId, StateFormatError> {
    let raw = r.get_str("task id")?;
    TaskId::parse(raw).map_err(|source| StateFormatError::InvalidId { field: "task id", source })
}

fn encode_record(task: &Task) -> Result<Vec<u8>, StateFormatError> {
    let mut w = Writer::new();

    let profile = task
        .profile
        .to_json()
        .map_err(|source| StateFormatError::InvalidField { field: "profile", source })?;
    w.put_bytes("profile", profile.as_bytes())?;

    w.put_tag(task.constraint.kind().tag());
    let body = match &task.constraint {
        Constraint::None => Vec::new(),
        Constraint::Like(like) => serde_json::to_vec(like).map_err(|e| StateFormatError::InvalidField {
            field: "constraint",
            source: e.into(),
        })?,
    };
    w.put_bytes("constraint", &body)?;

    w.put_bytes("hostname", task.hostname.as_bytes())?;
    let agent = task.agent_id.as_ref().map(|a| a.as_bytes()).unwrap_or_default();
    w.put_bytes("agent id", agent)?;
    w.put_bytes("status", task.status.as_deref().unwrap_or_default())?;
    w.put_bytes("executor info", task.executor_info.as_deref().unwrap_or_default())?;
    w.put_bytes("task type", task.task_type.as_bytes())?;

    Ok(w.finish().to_vec())
}

fn decode_record(id: &TaskId, record: &[u8]) -> Result<Task, StateFormatError> {
    let mut r = Reader::new(record);

    let profile = r.get_str("profile")?;
    if profile.is_empty() {
        return Err(StateFormatError::MissingField("profile"));
    }
    let profile = ResourceProfile::from_json(profile)
        .map_err(|source| StateFormatError::InvalidField { field: "profile", source })?;

    let tag = r.get_u32("constraint tag")?;
    let kind = ConstraintKind::from_tag(tag).ok_or(StateFormatError::UnknownConstraintTag(tag))?;
    let body = r.get_bytes("constraint")?;
    let constraint = match kind {
        ConstraintKind::None => Constraint::None,
        ConstraintKind::Like if body.is_empty() => Constraint::None,
        ConstraintKind::Like => {
            let like: LikeConstraint =
                serde_json::from_slice(body).map_err(|e| StateFormatError::InvalidField {
                    field: "constraint",
                    source: e.into(),
                })?;
            Constraint::Like(like)
        }
    };

    let hostname = r.get_str("hostname")?.to_string();

    let agent = r.get_str("agent id")?;
    let agent_id = if agent.is_empty() {
        None
    } else {
        Some(
            AgentId::parse(agent)
                .map_err(|source| StateFormatError::InvalidId { field: "agent id", source })?,
        )
    };

    let status = non_empty(r.get_bytes("status")?);
    let executor_info = non_empty(r.get_bytes("executor info")?);

    let task_type = match r.get_str("task type")? {
        "" => id.task_type().to_string(),
        t => t.to_string(),
    };

    if r.remaining() > 0 {
        return Err(StateFormatError::TrailingBytes(r.remaining()));
    }

    Ok(Task {
        profile,
        constraint,
        hostname,
        agent_id,
        executor_info,
        status,
        task_type,
        agent_attributes: Vec::new(),
    })
}

fn non_empty(bytes: &[u8]) -> Option<Bytes> {
    (!bytes.is_empty()).then(|| Bytes::copy_from_slice(bytes))
}
