//! In-memory port implementations for tests.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::diagnostic::{
    CLEANUP_SQL, CREATE_TABLE_SQL, CURRENT_DATABASE_SQL, CURRENT_USER_SQL, INSERT_ROW_SQL,
    INSERTED_STATUS, INSERTED_TEST_NAME, PUBLIC_TABLES_SQL, RECENT_LIMIT, SELECT_RECENT_SQL,
    TABLE_NAME, VERSION_SQL,
};
use crate::domain::{ConnectionId, ConnectionProfile, QueryResult, RunId, SslMode};
use crate::ports::{
    ConnectionRegistry, DatabaseSession, DbError, RegistryError, Reporter, ResultStore,
    ResultStoreError, SessionFactory, SqlExecutor,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[derive(Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<String>>,
}

impl MemoryReporter {
    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }
}

impl Reporter for MemoryReporter {
    fn line(&self, text: &str) {
        lock(&self.lines).push(text.to_string());
    }
}

#[derive(Default)]
pub struct MemoryResultStore {
    entries: Mutex<HashMap<(RunId, String, String), QueryResult>>,
}

impl MemoryResultStore {
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultStore for MemoryResultStore {
    fn publish(
        &self,
        run_id: &RunId,
        task_id: &str,
        key: &str,
        result: &QueryResult,
    ) -> Result<(), ResultStoreError> {
        lock(&self.entries).insert(
            (*run_id, task_id.to_string(), key.to_string()),
            result.clone(),
        );
        Ok(())
    }

    fn fetch(
        &self,
        run_id: &RunId,
        task_id: &str,
        key: &str,
    ) -> Result<Option<QueryResult>, ResultStoreError> {
        Ok(lock(&self.entries)
            .get(&(*run_id, task_id.to_string(), key.to_string()))
            .cloned())
    }
}

/// Registry over a fixed set of profiles.
#[derive(Default)]
pub struct StaticRegistry {
    profiles: BTreeMap<ConnectionId, ConnectionProfile>,
}

impl StaticRegistry {
    pub fn with(mut self, profile: ConnectionProfile) -> Self {
        self.profiles.insert(profile.id.clone(), profile);
        self
    }

    /// Registry holding both ids the connection test uses, pointing at one database.
    pub fn connection_test() -> Self {
        ["postgres_external_docker", "postgres_external"]
            .into_iter()
            .fold(Self::default(), |registry, id| {
                registry.with(sample_profile(id))
            })
    }
}

pub fn sample_profile(id: &str) -> ConnectionProfile {
    ConnectionProfile::new(
        ConnectionId::new(id).unwrap_or_else(|e| panic!("invalid test connection id {id}: {e}")),
        "localhost",
        Some(5432),
        "airflow_test",
        "airflow",
        "airflow",
        SslMode::Disable,
    )
}

impl ConnectionRegistry for StaticRegistry {
    fn get(&self, id: &ConnectionId) -> Result<ConnectionProfile, RegistryError> {
        self.profiles
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    fn list(&self) -> Result<Vec<ConnectionProfile>, RegistryError> {
        Ok(self.profiles.values().cloned().collect())
    }

    fn storage_path(&self) -> PathBuf {
        PathBuf::from("<memory>")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredRow {
    id: i64,
    test_name: String,
    test_timestamp: String,
    status: String,
}

#[derive(Default)]
struct FakeState {
    table_exists: bool,
    rows: Vec<StoredRow>,
    clock: u32,
    statements: Vec<String>,
    failures: HashMap<String, u32>,
    sessions_opened: u32,
    sessions_closed: u32,
    refuse_connections: bool,
}

/// A `connection_test`-only database: understands exactly the statements the
/// connection test issues and records what it was asked to do.
#[derive(Clone, Default)]
pub struct FakeDatabase {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` executions of `sql` fail with a query error.
    pub fn fail_next(&self, sql: &str, times: u32) {
        lock(&self.state).failures.insert(sql.to_string(), times);
    }

    pub fn refuse_connections(&self) {
        lock(&self.state).refuse_connections = true;
    }

    pub fn statements(&self) -> Vec<String> {
        lock(&self.state).statements.clone()
    }

    pub fn table_exists(&self) -> bool {
        lock(&self.state).table_exists
    }

    pub fn row_count(&self) -> usize {
        lock(&self.state).rows.len()
    }

    pub fn sessions(&self) -> (u32, u32) {
        let state = lock(&self.state);
        (state.sessions_opened, state.sessions_closed)
    }

    fn connect(&self, profile: &ConnectionProfile) -> Result<(), DbError> {
        if lock(&self.state).refuse_connections {
            return Err(DbError::ConnectionFailed(
                crate::connection_error::ConnectionErrorInfo::new(format!(
                    r#"psql: error: connection to server at "{}", port {} failed: Connection refused"#,
                    profile.host,
                    profile.effective_port()
                )),
            ));
        }
        Ok(())
    }

    fn run(&self, sql: &str) -> Result<QueryResult, DbError> {
        let mut state = lock(&self.state);
        state.statements.push(sql.to_string());

        if let Some(left) = state.failures.get_mut(sql)
            && *left > 0
        {
            *left -= 1;
            return Err(DbError::QueryFailed(format!("injected failure for {sql}")));
        }

        let single = |column: &str, value: &str| {
            QueryResult::new(sql, vec![column.to_string()], vec![vec![value.to_string()]], 0)
        };

        match sql {
            VERSION_SQL => Ok(single("version", "PostgreSQL 16.4 (fake)")),
            CURRENT_DATABASE_SQL => Ok(single("current_database", "airflow_test")),
            CURRENT_USER_SQL => Ok(single("current_user", "airflow")),
            PUBLIC_TABLES_SQL => {
                let rows = if state.table_exists {
                    vec![vec![TABLE_NAME.to_string()]]
                } else {
                    Vec::new()
                };
                Ok(QueryResult::new(sql, vec!["table_name".to_string()], rows, 0))
            }
            CREATE_TABLE_SQL => {
                state.table_exists = true;
                Ok(QueryResult::command(sql, 0))
            }
            INSERT_ROW_SQL => {
                if !state.table_exists {
                    return Err(missing_table());
                }
                state.clock += 1;
                let row = StoredRow {
                    id: state.rows.len() as i64 + 1,
                    test_name: INSERTED_TEST_NAME.to_string(),
                    test_timestamp: format!("2026-01-01 00:00:{:02}", state.clock),
                    status: INSERTED_STATUS.to_string(),
                };
                state.rows.push(row);
                Ok(QueryResult::command(sql, 0))
            }
            SELECT_RECENT_SQL => {
                if !state.table_exists {
                    return Err(missing_table());
                }
                let mut rows = state.rows.clone();
                rows.sort_by(|a, b| b.test_timestamp.cmp(&a.test_timestamp));
                let rows = rows
                    .into_iter()
                    .take(RECENT_LIMIT)
                    .map(|r| vec![r.id.to_string(), r.test_name, r.test_timestamp, r.status])
                    .collect();
                Ok(QueryResult::new(
                    sql,
                    ["id", "test_name", "test_timestamp", "status"]
                        .map(String::from)
                        .to_vec(),
                    rows,
                    0,
                ))
            }
            CLEANUP_SQL => Ok(single(
                "message",
                "Cleanup task completed (table preserved for inspection)",
            )),
            other => Err(DbError::QueryFailed(format!(
                "ERROR:  syntax error at or near \"{}\"",
                other.split_whitespace().next().unwrap_or_default()
            ))),
        }
    }
}

fn missing_table() -> DbError {
    DbError::QueryFailed(format!(r#"ERROR:  relation "{TABLE_NAME}" does not exist"#))
}

#[async_trait]
impl SqlExecutor for FakeDatabase {
    async fn execute(
        &self,
        profile: &ConnectionProfile,
        sql: &str,
    ) -> Result<QueryResult, DbError> {
        self.connect(profile)?;
        self.run(sql)
    }
}

#[async_trait]
impl SessionFactory for FakeDatabase {
    async fn open(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<Box<dyn DatabaseSession>, DbError> {
        self.connect(profile)?;
        lock(&self.state).sessions_opened += 1;
        Ok(Box::new(FakeSession {
            db: self.clone(),
            open: true,
        }))
    }
}

struct FakeSession {
    db: FakeDatabase,
    open: bool,
}

#[async_trait]
impl DatabaseSession for FakeSession {
    async fn query(&mut self, sql: &str) -> Result<QueryResult, DbError> {
        if !self.open {
            return Err(DbError::Closed);
        }
        self.db.run(sql)
    }

    async fn close(&mut self) -> Result<(), DbError> {
        if !self.open {
            return Err(DbError::Closed);
        }
        self.open = false;
        lock(&self.db.state).sessions_closed += 1;
        Ok(())
    }
}
