use std::sync::Arc;

use async_trait::async_trait;

use super::{Task, TaskContext};
use crate::domain::ConnectionId;
use crate::error::TaskError;
use crate::ports::ConnectionRegistry;

pub const TASK_ID: &str = "print_connection_info";

/// Prints the registry entry of one connection without connecting to it.
pub struct PrintConnectionInfo {
    registry: Arc<dyn ConnectionRegistry>,
    conn_id: ConnectionId,
}

impl PrintConnectionInfo {
    pub fn new(registry: Arc<dyn ConnectionRegistry>, conn_id: ConnectionId) -> Self {
        Self { registry, conn_id }
    }
}

#[async_trait]
impl Task for PrintConnectionInfo {
    fn task_id(&self) -> &str {
        TASK_ID
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let profile = match self.registry.get(&self.conn_id) {
            Ok(profile) => profile,
            Err(e) => {
                ctx.reporter.line(&format!("Error getting connection: {e}"));
                tracing::error!(conn_id = %self.conn_id, error = %e, "connection lookup failed");
                return Err(e.into());
            }
        };

        let out = &ctx.reporter;
        out.line(&format!("Connection ID: {}", profile.id));
        out.line(&format!("Host: {}", profile.host));
        out.line(&format!("Port: {}", profile.port_display()));
        out.line(&format!("Schema/Database: {}", profile.database));
        out.line(&format!("Login: {}", profile.username));
        out.line("Connection retrieved successfully!");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectionProfile, RunId, SslMode};
    use crate::ports::RegistryError;
    use crate::ports::connection_registry::MockConnectionRegistry;
    use crate::test_support::{MemoryReporter, MemoryResultStore};

    fn conn_id() -> ConnectionId {
        ConnectionId::new("postgres_external_docker").unwrap()
    }

    fn context(reporter: Arc<MemoryReporter>) -> TaskContext {
        TaskContext {
            run_id: RunId::new(),
            try_number: 1,
            reporter,
            result_store: Arc::new(MemoryResultStore::default()),
        }
    }

    #[tokio::test]
    async fn prints_all_fields_for_known_connection() {
        let mut registry = MockConnectionRegistry::new();
        registry.expect_get().times(1).returning(|id| {
            Ok(ConnectionProfile::new(
                id.clone(),
                "pg.internal",
                None,
                "analytics",
                "airflow",
                "secret",
                SslMode::Prefer,
            ))
        });
        let reporter = Arc::new(MemoryReporter::default());
        let task = PrintConnectionInfo::new(Arc::new(registry), conn_id());

        task.execute(&context(Arc::clone(&reporter))).await.unwrap();

        assert_eq!(
            reporter.lines(),
            vec![
                "Connection ID: postgres_external_docker",
                "Host: pg.internal",
                "Port: None",
                "Schema/Database: analytics",
                "Login: airflow",
                "Connection retrieved successfully!",
            ]
        );
    }

    #[tokio::test]
    async fn never_prints_password() {
        let mut registry = MockConnectionRegistry::new();
        registry.expect_get().returning(|id| {
            Ok(ConnectionProfile::new(
                id.clone(),
                "h",
                Some(5432),
                "d",
                "u",
                "hunter2",
                SslMode::Prefer,
            ))
        });
        let reporter = Arc::new(MemoryReporter::default());
        let task = PrintConnectionInfo::new(Arc::new(registry), conn_id());

        task.execute(&context(Arc::clone(&reporter))).await.unwrap();

        assert!(reporter.lines().iter().all(|l| !l.contains("hunter2")));
    }

    #[tokio::test]
    async fn unknown_connection_is_reported_and_reraised() {
        let mut registry = MockConnectionRegistry::new();
        registry
            .expect_get()
            .times(1)
            .returning(|id| Err(RegistryError::NotFound(id.to_string())));
        let reporter = Arc::new(MemoryReporter::default());
        let task = PrintConnectionInfo::new(Arc::new(registry), conn_id());

        let err = task
            .execute(&context(Arc::clone(&reporter)))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TaskError::Registry(RegistryError::NotFound(
                "postgres_external_docker".to_string()
            ))
        );
        assert_eq!(
            reporter.lines(),
            vec!["Error getting connection: The conn_id `postgres_external_docker` isn't defined"]
        );
    }
}
