use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{TaskInstance, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "manual__{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Success,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        })
    }
}

/// One manual trigger of a DAG. Task instances are kept in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagRun {
    pub run_id: RunId,
    pub dag_id: String,
    pub triggered_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub tasks: Vec<TaskInstance>,
}

impl DagRun {
    pub fn new<'a>(
        dag_id: impl Into<String>,
        task_ids: impl IntoIterator<Item = &'a str>,
        retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: RunId::new(),
            dag_id: dag_id.into(),
            triggered_at: now,
            finished_at: None,
            tasks: task_ids
                .into_iter()
                .map(|id| TaskInstance::new(id, retries))
                .collect(),
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskInstance> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut TaskInstance> {
        self.tasks.iter_mut().find(|t| t.task_id == task_id)
    }

    /// Failed as soon as any task failed, success once every task succeeded.
    pub fn state(&self) -> RunState {
        if self
            .tasks
            .iter()
            .any(|t| matches!(t.state, TaskState::Failed | TaskState::UpstreamFailed))
        {
            RunState::Failed
        } else if self.tasks.iter().all(|t| t.state == TaskState::Success) {
            RunState::Success
        } else {
            RunState::Running
        }
    }

    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.finished_at = Some(now);
    }

    pub fn count_in(&self, state: TaskState) -> usize {
        self.tasks.iter().filter(|t| t.state == state).count()
    }
}
