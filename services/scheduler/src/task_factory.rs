//! Turning a matched (task, offer) pair into a launch request.

use std::collections::BTreeMap;

use flex_id::{ExecutorId, FrameworkId, TaskId};
use flex_model::{ExecutorInfo, ResourceOffer, Task, TaskLaunch, RESOURCE_CPUS, RESOURCE_MEM, RESOURCE_PORTS};
use tracing::debug;

use crate::error::SchedulerResult;
use crate::ledger::ResourceLedger;

/// Name given to every executor.
pub const EXECUTOR_NAME: &str = "flex_executor";

/// What a factory needs to know about the placement.
#[derive(Debug, Clone, Copy)]
pub struct LaunchContext<'a> {
    pub framework_id: &'a FrameworkId,
    pub task_id: &'a TaskId,
    pub task: &'a Task,
    pub offer: &'a ResourceOffer,
}

/// Builds launch requests for one task type.
///
/// Implementations consume exactly what they put in the request from the
/// ledger. An error skips this pairing only.
pub trait TaskFactory: Send + Sync {
    fn create_launch(
        &self,
        ledger: &mut ResourceLedger,
        ctx: &LaunchContext<'_>,
    ) -> SchedulerResult<TaskLaunch>;
}

/// The factory used for task types with no factory of their own.
#[derive(Debug, Clone)]
pub struct DefaultTaskFactory {
    framework_name: String,
}

impl DefaultTaskFactory {
    pub fn new(framework_name: impl Into<String>) -> Self {
        Self {
            framework_name: framework_name.into(),
        }
    }

    pub fn executor_id(ctx: &LaunchContext<'_>) -> SchedulerResult<ExecutorId> {
        Ok(ExecutorId::parse(&format!(
            "{EXECUTOR_NAME}{}{}{}",
            ctx.framework_id, ctx.offer.id, ctx.offer.agent_id
        ))?)
    }
}

impl TaskFactory for DefaultTaskFactory {
    fn create_launch(
        &self,
        ledger: &mut ResourceLedger,
        ctx: &LaunchContext<'_>,
    ) -> SchedulerResult<TaskLaunch> {
        let profile = &ctx.task.profile;

        // The task's share is the aggregate minus the executor's.
        let mut resources = ledger.consume_scalar(RESOURCE_CPUS, profile.cpus)?;
        resources.extend(ledger.consume_scalar(RESOURCE_MEM, profile.memory)?);

        let port_names: Vec<&String> = profile.ports.keys().collect();
        let assigned = ledger.consume_ports(&profile.port_values())?;
        let mut ports = BTreeMap::new();
        for (name, value) in port_names.into_iter().zip(&assigned) {
            ports.insert(name.clone(), value.value);
            resources.push(ledger.value_fragment(RESOURCE_PORTS, *value));
        }

        let mut executor_resources = ledger.consume_scalar(RESOURCE_CPUS, profile.executor_cpus)?;
        executor_resources.extend(ledger.consume_scalar(RESOURCE_MEM, profile.executor_memory)?);

        let executor = ExecutorInfo {
            executor_id: Self::executor_id(ctx)?,
            name: EXECUTOR_NAME.to_string(),
            resources: executor_resources,
        };

        debug!(
            task_id = %ctx.task_id,
            offer_id = %ctx.offer.id,
            ports = ?ports,
            "Built launch request"
        );

        Ok(TaskLaunch {
            task_id: ctx.task_id.clone(),
            name: format!("{}-{}", self.framework_name, ctx.task_id),
            agent_id: ctx.offer.agent_id.clone(),
            resources,
            ports,
            executor,
        })
    }
}
