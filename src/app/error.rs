use crate::domain::InvalidTransition;
use crate::ports::{DbError, RegistryError, ResultStoreError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("Failed to publish result: {0}")]
    ResultStore(#[from] ResultStoreError),
    #[error("Unexpected result from `{query}`: {reason}")]
    UnexpectedResult { query: String, reason: String },
    #[error("Task was cancelled")]
    Cancelled,
}

impl TaskError {
    /// Cancellation is final; everything else goes through the retry policy.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    #[error("Task id `{0}` is declared more than once")]
    DuplicateTask(String),
    #[error("Task `{task}` depends on unknown task `{upstream}`")]
    UnknownDependency { task: String, upstream: String },
    #[error("Dependency cycle involving: {}", .0.join(", "))]
    Cycle(Vec<String>),
    #[error("Task `{0}` not found in DAG")]
    UnknownTask(String),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}
