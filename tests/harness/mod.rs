use std::sync::Arc;
use std::time::Duration;

use pgprobe::app::dag::Dag;
use pgprobe::app::pipeline::{
    DEFAULT_INSPECT_CONN, DEFAULT_SQL_CONN, PipelineConfig, Ports, connection_test_dag,
};
use pgprobe::app::ports::{ConnectionRegistry, ResultStore};
use pgprobe::app::runner::DagRunner;
use pgprobe::app::test_support::{FakeDatabase, MemoryReporter, MemoryResultStore, StaticRegistry};
use pgprobe::domain::ConnectionId;

/// The connection test DAG wired to an in-memory database.
pub struct Fixture {
    pub db: FakeDatabase,
    pub reporter: Arc<MemoryReporter>,
    pub store: Arc<MemoryResultStore>,
    pub dag: Dag,
}

impl Fixture {
    pub fn new(retries: u32) -> Self {
        Self::with_registry(StaticRegistry::connection_test(), retries)
    }

    pub fn with_registry(registry: StaticRegistry, retries: u32) -> Self {
        let db = FakeDatabase::new();
        let registry: Arc<dyn ConnectionRegistry> = Arc::new(registry);
        let ports = Ports {
            registry,
            sessions: Arc::new(db.clone()),
            executor: Arc::new(db.clone()),
        };
        let config = PipelineConfig {
            retries,
            retry_delay: Duration::from_secs(60),
            ..PipelineConfig::new(
                ConnectionId::new(DEFAULT_INSPECT_CONN).unwrap(),
                ConnectionId::new(DEFAULT_SQL_CONN).unwrap(),
            )
        };

        Self {
            db,
            reporter: Arc::new(MemoryReporter::default()),
            store: Arc::new(MemoryResultStore::default()),
            dag: connection_test_dag(&ports, &config).unwrap(),
        }
    }

    pub fn runner(&self) -> DagRunner {
        self.runner_with_store(Arc::clone(&self.store) as Arc<dyn ResultStore>)
    }

    pub fn runner_with_store(&self, store: Arc<dyn ResultStore>) -> DagRunner {
        DagRunner::new(Arc::clone(&self.reporter) as _, store)
    }

    pub fn output_contains(&self, line: &str) -> bool {
        self.reporter.lines().iter().any(|l| l == line)
    }
}
