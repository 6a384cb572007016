//! Launch requests produced toward the offer source.

use std::collections::BTreeMap;

use bytes::Bytes;
use flex_id::{AgentId, ExecutorId, TaskId};
use serde::{Deserialize, Serialize};

use crate::{ModelError, Resource};

/// The executor a task runs under, with the resources it holds itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorInfo {
    pub executor_id: ExecutorId,
    pub name: String,
    pub resources: Vec<Resource>,
}

impl ExecutorInfo {
    /// Encodes the executor for the task record, where it is kept as an
    /// opaque blob.
    pub fn to_bytes(&self) -> Result<Bytes, ModelError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A request to run one task against one or more offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLaunch {
    pub task_id: TaskId,
    pub name: String,
    pub agent_id: AgentId,
    /// Resource fragments consumed for the task itself.
    pub resources: Vec<Resource>,
    /// Assigned port per requested port name.
    pub ports: BTreeMap<String, u64>,
    pub executor: ExecutorInfo,
}

impl TaskLaunch {
    /// Sum of the scalar fragments with the given name, task and executor.
    pub fn scalar_total(&self, name: &str) -> f64 {
        self.resources
            .iter()
            .chain(self.executor.resources.iter())
            .filter(|r| r.name == name)
            .filter_map(Resource::as_scalar)
            .sum()
    }
}
