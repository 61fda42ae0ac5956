pub mod connection;
pub mod dag_run;
pub mod diagnostic;
pub mod query_result;
pub mod task;

pub use connection::{ConnectionId, ConnectionProfile, SslMode};
pub use dag_run::{DagRun, RunId, RunState};
pub use diagnostic::DiagnosticRow;
pub use query_result::QueryResult;
pub use task::{InvalidTransition, TaskInstance, TaskState};
