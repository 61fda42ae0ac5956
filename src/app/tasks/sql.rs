use std::sync::Arc;

use async_trait::async_trait;

use super::{Task, TaskContext};
use crate::domain::diagnostic::{CLEANUP_SQL, CREATE_TABLE_SQL, INSERT_ROW_SQL, SELECT_RECENT_SQL};
use crate::domain::{ConnectionId, QueryResult};
use crate::error::TaskError;
use crate::ports::{ConnectionRegistry, RETURN_VALUE_KEY, Reporter, SqlExecutor};

/// Runs one fixed statement on a registry connection, optionally publishing
/// the result set under `return_value`.
pub struct SqlTask {
    task_id: &'static str,
    sql: &'static str,
    publish: bool,
    conn_id: ConnectionId,
    registry: Arc<dyn ConnectionRegistry>,
    executor: Arc<dyn SqlExecutor>,
}

impl SqlTask {
    pub fn new(
        task_id: &'static str,
        sql: &'static str,
        conn_id: ConnectionId,
        registry: Arc<dyn ConnectionRegistry>,
        executor: Arc<dyn SqlExecutor>,
    ) -> Self {
        Self {
            task_id,
            sql,
            publish: false,
            conn_id,
            registry,
            executor,
        }
    }

    pub fn publish_result(mut self) -> Self {
        self.publish = true;
        self
    }

    pub fn create_test_table(
        conn_id: ConnectionId,
        registry: Arc<dyn ConnectionRegistry>,
        executor: Arc<dyn SqlExecutor>,
    ) -> Self {
        Self::new("create_test_table", CREATE_TABLE_SQL, conn_id, registry, executor)
    }

    pub fn insert_test_data(
        conn_id: ConnectionId,
        registry: Arc<dyn ConnectionRegistry>,
        executor: Arc<dyn SqlExecutor>,
    ) -> Self {
        Self::new("insert_test_data", INSERT_ROW_SQL, conn_id, registry, executor)
    }

    pub fn query_test_data(
        conn_id: ConnectionId,
        registry: Arc<dyn ConnectionRegistry>,
        executor: Arc<dyn SqlExecutor>,
    ) -> Self {
        Self::new("query_test_data", SELECT_RECENT_SQL, conn_id, registry, executor)
            .publish_result()
    }

    pub fn cleanup_test_table(
        conn_id: ConnectionId,
        registry: Arc<dyn ConnectionRegistry>,
        executor: Arc<dyn SqlExecutor>,
    ) -> Self {
        Self::new("cleanup_test_table", CLEANUP_SQL, conn_id, registry, executor)
    }

    pub fn sql(&self) -> &str {
        self.sql
    }
}

#[async_trait]
impl Task for SqlTask {
    fn task_id(&self) -> &str {
        self.task_id
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let profile = self.registry.get(&self.conn_id)?;
        tracing::info!(
            task_id = self.task_id,
            conn_id = %self.conn_id,
            dsn = %profile.to_masked_dsn(),
            "Executing: {}",
            self.sql
        );

        let result = self.executor.execute(&profile, self.sql).await?;
        tracing::info!(
            task_id = self.task_id,
            rows = result.row_count,
            elapsed_ms = result.execution_time_ms,
            "statement finished"
        );
        report_rows(ctx.reporter.as_ref(), &result);

        if self.publish {
            ctx.result_store
                .publish(&ctx.run_id, self.task_id, RETURN_VALUE_KEY, &result)?;
            tracing::info!(task_id = self.task_id, key = RETURN_VALUE_KEY, "result published");
        }
        Ok(())
    }
}

fn report_rows(out: &dyn Reporter, result: &QueryResult) {
    if result.columns.is_empty() {
        return;
    }
    out.line(&result.columns.join(" | "));
    for row in &result.rows {
        out.line(&row.join(" | "));
    }
    out.line(&format!("({})", result.row_count_display()));
}
