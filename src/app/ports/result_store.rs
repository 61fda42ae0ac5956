use crate::domain::{QueryResult, RunId};

pub const RETURN_VALUE_KEY: &str = "return_value";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultStoreError {
    #[error("Write error: {0}")]
    WriteError(String),
    #[error("Read error: {0}")]
    ReadError(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Where tasks publish results for inspection after the run.
#[cfg_attr(test, mockall::automock)]
pub trait ResultStore: Send + Sync {
    fn publish(
        &self,
        run_id: &RunId,
        task_id: &str,
        key: &str,
        result: &QueryResult,
    ) -> Result<(), ResultStoreError>;

    fn fetch(
        &self,
        run_id: &RunId,
        task_id: &str,
        key: &str,
    ) -> Result<Option<QueryResult>, ResultStoreError>;
}
