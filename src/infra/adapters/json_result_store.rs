use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::app::ports::{ResultStore, ResultStoreError};
use crate::domain::{DagRun, QueryResult, RunId};

const RUN_FILE_NAME: &str = "dag_run.json";

/// Published values as pretty JSON under `<root>/<run_id>/<task_id>.<key>.json`.
pub struct JsonResultStore {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct PublishedResult {
    task_id: String,
    key: String,
    published_at: DateTime<Utc>,
    query: String,
    columns: Vec<String>,
    /// Rows keyed by column name, for whoever reads the file by hand.
    rows: Vec<Map<String, Value>>,
    row_count: usize,
    execution_time_ms: u64,
}

impl PublishedResult {
    fn into_result(self) -> QueryResult {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(|column| match row.get(column) {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    })
                    .collect()
            })
            .collect();
        QueryResult::new(self.query, self.columns, rows, self.execution_time_ms)
    }
}

impl JsonResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    pub fn entry_path(&self, run_id: &RunId, task_id: &str, key: &str) -> PathBuf {
        self.run_dir(run_id).join(format!("{task_id}.{key}.json"))
    }

    /// Writes the run summary next to its published results.
    pub fn write_run(&self, run: &DagRun) -> Result<PathBuf, ResultStoreError> {
        let dir = self.run_dir(&run.run_id);
        fs::create_dir_all(&dir).map_err(|e| ResultStoreError::WriteError(e.to_string()))?;

        let path = dir.join(RUN_FILE_NAME);
        let content = serde_json::to_string_pretty(run)
            .map_err(|e| ResultStoreError::WriteError(e.to_string()))?;
        fs::write(&path, content).map_err(|e| ResultStoreError::WriteError(e.to_string()))?;
        Ok(path)
    }
}

impl ResultStore for JsonResultStore {
    fn publish(
        &self,
        run_id: &RunId,
        task_id: &str,
        key: &str,
        result: &QueryResult,
    ) -> Result<(), ResultStoreError> {
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir).map_err(|e| ResultStoreError::WriteError(e.to_string()))?;

        let published = PublishedResult {
            task_id: task_id.to_string(),
            key: key.to_string(),
            published_at: Utc::now(),
            query: result.query.clone(),
            columns: result.columns.clone(),
            rows: result.rows_as_objects(),
            row_count: result.row_count,
            execution_time_ms: result.execution_time_ms,
        };
        let content = serde_json::to_string_pretty(&published)
            .map_err(|e| ResultStoreError::WriteError(e.to_string()))?;

        let path = self.entry_path(run_id, task_id, key);
        fs::write(&path, content).map_err(|e| ResultStoreError::WriteError(e.to_string()))?;
        tracing::debug!(path = %path.display(), "result published");
        Ok(())
    }

    fn fetch(
        &self,
        run_id: &RunId,
        task_id: &str,
        key: &str,
    ) -> Result<Option<QueryResult>, ResultStoreError> {
        let path = self.entry_path(run_id, task_id, key);
        if !path.exists() {
            return Ok(None);
        }

        let content =
            fs::read_to_string(&path).map_err(|e| ResultStoreError::ReadError(e.to_string()))?;
        let published: PublishedResult = serde_json::from_str(&content)
            .map_err(|e| ResultStoreError::InvalidFormat(e.to_string()))?;
        Ok(Some(published.into_result()))
    }
}
