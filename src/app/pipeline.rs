//! The `test_postgres_external_connection` DAG.

use std::sync::Arc;
use std::time::Duration;

use crate::dag::{Dag, DagBuilder, DefaultArgs};
use crate::domain::ConnectionId;
use crate::error::DagError;
use crate::ports::{ConnectionRegistry, SessionFactory, SqlExecutor};
use crate::tasks::{PrintConnectionInfo, SqlTask, TestConnection};

pub const DAG_ID: &str = "test_postgres_external_connection";
pub const DESCRIPTION: &str = "Test connection to external PostgreSQL database";
pub const TAGS: [&str; 3] = ["test", "postgres", "connection"];

/// Connection inspected and probed directly.
pub const DEFAULT_INSPECT_CONN: &str = "postgres_external_docker";
/// Connection the SQL tasks run against.
pub const DEFAULT_SQL_CONN: &str = "postgres_external";

pub const TASK_ORDER: [&str; 6] = [
    "print_connection_info",
    "test_connection_with_hook",
    "create_test_table",
    "insert_test_data",
    "query_test_data",
    "cleanup_test_table",
];

/// The task whose query result is published under `return_value`.
pub const PUBLISHING_TASK: &str = "query_test_data";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub inspect_conn: ConnectionId,
    pub sql_conn: ConnectionId,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl PipelineConfig {
    pub fn new(inspect_conn: ConnectionId, sql_conn: ConnectionId) -> Self {
        let defaults = DefaultArgs::default();
        Self {
            inspect_conn,
            sql_conn,
            retries: defaults.retries,
            retry_delay: defaults.retry_delay,
        }
    }
}

/// Adapters the DAG's tasks talk to.
#[derive(Clone)]
pub struct Ports {
    pub registry: Arc<dyn ConnectionRegistry>,
    pub sessions: Arc<dyn SessionFactory>,
    pub executor: Arc<dyn SqlExecutor>,
}

type SqlTaskCtor = fn(ConnectionId, Arc<dyn ConnectionRegistry>, Arc<dyn SqlExecutor>) -> SqlTask;

pub fn connection_test_dag(ports: &Ports, config: &PipelineConfig) -> Result<Dag, DagError> {
    let registry = &ports.registry;
    let sql_task = |make: SqlTaskCtor| {
        make(
            config.sql_conn.clone(),
            Arc::clone(registry),
            Arc::clone(&ports.executor),
        )
    };

    DagBuilder::new(DAG_ID)
        .description(DESCRIPTION)
        .tags(TAGS)
        .default_args(DefaultArgs {
            retries: config.retries,
            retry_delay: config.retry_delay,
            ..DefaultArgs::default()
        })
        .task(PrintConnectionInfo::new(
            Arc::clone(registry),
            config.inspect_conn.clone(),
        ))
        .task(TestConnection::new(
            Arc::clone(registry),
            Arc::clone(&ports.sessions),
            config.inspect_conn.clone(),
        ))
        .task(sql_task(SqlTask::create_test_table))
        .task(sql_task(SqlTask::insert_test_data))
        .task(sql_task(SqlTask::query_test_data))
        .task(sql_task(SqlTask::cleanup_test_table))
        .chain(&TASK_ORDER)
        .build()
}
