//! The units of work a DAG is made of.

mod inspect;
mod probe;
mod sql;

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::RunId;
use crate::error::TaskError;
use crate::ports::{Reporter, ResultStore};

pub use inspect::PrintConnectionInfo;
pub use probe::TestConnection;
pub use sql::SqlTask;

/// What an attempt gets to see of the run it belongs to.
#[derive(Clone)]
pub struct TaskContext {
    pub run_id: RunId,
    pub try_number: u32,
    pub reporter: Arc<dyn Reporter>,
    pub result_store: Arc<dyn ResultStore>,
}

#[async_trait]
pub trait Task: Send + Sync {
    fn task_id(&self) -> &str;

    async fn execute(&self, ctx: &TaskContext) -> Result<(), TaskError>;
}
