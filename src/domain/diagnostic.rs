//! The `connection_test` table and the statements issued against it.
//!
//! Statement text is sent verbatim; do not reformat.

use serde::{Deserialize, Serialize};

use crate::query_result::QueryResult;

pub const TABLE_NAME: &str = "connection_test";

pub const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS connection_test (id SERIAL PRIMARY KEY, test_name VARCHAR(100), test_timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP, status VARCHAR(50));";

pub const INSERT_ROW_SQL: &str = "INSERT INTO connection_test (test_name, status) VALUES ('Airflow Connection Test', 'SUCCESS');";

pub const SELECT_RECENT_SQL: &str =
    "SELECT * FROM connection_test ORDER BY test_timestamp DESC LIMIT 5;";

pub const CLEANUP_SQL: &str =
    "SELECT 'Cleanup task completed (table preserved for inspection)' as message;";

pub const INSERTED_TEST_NAME: &str = "Airflow Connection Test";
pub const INSERTED_STATUS: &str = "SUCCESS";
pub const RECENT_LIMIT: usize = 5;

pub const VERSION_SQL: &str = "SELECT version();";
pub const CURRENT_DATABASE_SQL: &str = "SELECT current_database();";
pub const CURRENT_USER_SQL: &str = "SELECT current_user;";
pub const PUBLIC_TABLES_SQL: &str =
    "SELECT table_name FROM information_schema.tables WHERE table_schema = 'public';";

/// One row of `connection_test`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRow {
    pub id: i64,
    pub test_name: Option<String>,
    pub test_timestamp: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiagnosticRowError {
    #[error("Result has no column {0}")]
    MissingColumn(&'static str),
    #[error("Invalid id {0:?}")]
    InvalidId(String),
}

impl DiagnosticRow {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(INSERTED_STATUS)
    }

    /// Reads rows from a `SELECT * FROM connection_test` result. psql prints
    /// NULL as an empty cell, which maps to `None`.
    pub fn from_result(result: &QueryResult) -> Result<Vec<Self>, DiagnosticRowError> {
        let column = |name: &'static str| {
            result
                .column_index(name)
                .ok_or(DiagnosticRowError::MissingColumn(name))
        };
        let id_idx = column("id")?;
        let name_idx = column("test_name")?;
        let ts_idx = column("test_timestamp")?;
        let status_idx = column("status")?;

        let cell = |row: &[String], idx: usize| {
            row.get(idx)
                .filter(|value| !value.is_empty())
                .cloned()
        };

        result
            .rows
            .iter()
            .map(|row| {
                let raw_id = row.get(id_idx).map(String::as_str).unwrap_or_default();
                let id = raw_id
                    .parse()
                    .map_err(|_| DiagnosticRowError::InvalidId(raw_id.to_string()))?;
                Ok(Self {
                    id,
                    test_name: cell(row, name_idx),
                    test_timestamp: cell(row, ts_idx),
                    status: cell(row, status_idx),
                })
            })
            .collect()
    }
}
