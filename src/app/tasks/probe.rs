use std::sync::Arc;

use async_trait::async_trait;

use super::{Task, TaskContext};
use crate::domain::ConnectionId;
use crate::domain::diagnostic::{
    CURRENT_DATABASE_SQL, CURRENT_USER_SQL, PUBLIC_TABLES_SQL, VERSION_SQL,
};
use crate::error::TaskError;
use crate::ports::{ConnectionRegistry, DatabaseSession, DbError, Reporter, SessionFactory};

pub const TASK_ID: &str = "test_connection_with_hook";

/// Opens a live session and runs read-only probes on it.
pub struct TestConnection {
    registry: Arc<dyn ConnectionRegistry>,
    sessions: Arc<dyn SessionFactory>,
    conn_id: ConnectionId,
}

impl TestConnection {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        sessions: Arc<dyn SessionFactory>,
        conn_id: ConnectionId,
    ) -> Self {
        Self {
            registry,
            sessions,
            conn_id,
        }
    }
}

#[async_trait]
impl Task for TestConnection {
    fn task_id(&self) -> &str {
        TASK_ID
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let profile = self.registry.get(&self.conn_id)?;
        tracing::info!(dsn = %profile.to_masked_dsn(), "opening session");

        let mut session = match self.sessions.open(&profile).await {
            Ok(session) => session,
            Err(e) => {
                if let DbError::ConnectionFailed(info) = &e {
                    tracing::error!(
                        kind = ?info.kind,
                        hint = info.hint(),
                        "could not open session"
                    );
                }
                return Err(e.into());
            }
        };
        let probed = run_probes(session.as_mut(), ctx.reporter.as_ref()).await;
        // Close before looking at the outcome so a failed probe can't leak the session.
        let closed = session.close().await;

        probed?;
        closed?;
        ctx.reporter.line("Connection test completed successfully!");
        Ok(())
    }
}

async fn run_probes(
    session: &mut dyn DatabaseSession,
    out: &dyn Reporter,
) -> Result<(), TaskError> {
    let version = scalar(session, VERSION_SQL).await?;
    out.line(&format!("PostgreSQL Version: {version}"));

    let database = scalar(session, CURRENT_DATABASE_SQL).await?;
    out.line(&format!("Connected to database: {database}"));

    let user = scalar(session, CURRENT_USER_SQL).await?;
    out.line(&format!("Connected as user: {user}"));

    let tables = session.query(PUBLIC_TABLES_SQL).await?;
    let names = tables.column_values("table_name");
    out.line(&format!("Tables in public schema: {}", format_table_list(&names)));

    Ok(())
}

async fn scalar(session: &mut dyn DatabaseSession, sql: &str) -> Result<String, TaskError> {
    let result = session.query(sql).await?;
    result
        .scalar()
        .map(ToString::to_string)
        .ok_or_else(|| TaskError::UnexpectedResult {
            query: sql.to_string(),
            reason: "no rows returned".to_string(),
        })
}

fn format_table_list(names: &[&str]) -> String {
    if names.is_empty() {
        return "No tables yet".to_string();
    }
    let quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
    format!("[{}]", quoted.join(", "))
}
