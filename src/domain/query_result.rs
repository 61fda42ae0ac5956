use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of one SQL statement. Cells are kept as the text psql printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    /// The SQL statement that was executed
    pub query: String,
    /// Column names from the result set (empty for commands without rows)
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new(
        query: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
        execution_time_ms: u64,
    ) -> Self {
        let row_count = rows.len();
        Self {
            query: query.into(),
            columns,
            rows,
            row_count,
            execution_time_ms,
        }
    }

    /// Result of a statement that produced no result set (DDL, INSERT).
    pub fn command(query: impl Into<String>, execution_time_ms: u64) -> Self {
        Self::new(query, Vec::new(), Vec::new(), execution_time_ms)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// First column of the first row, as returned by scalar queries.
    pub fn scalar(&self) -> Option<&str> {
        self.rows.first()?.first().map(String::as_str)
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Vec<&str> {
        let Some(idx) = self.column_index(name) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|row| row.get(idx).map(String::as_str))
            .collect()
    }

    /// Rows keyed by column name, the shape published to the result store.
    pub fn rows_as_objects(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(column, cell)| (column.clone(), Value::String(cell.clone())))
                    .collect()
            })
            .collect()
    }

    pub fn row_count_display(&self) -> String {
        if self.row_count == 1 {
            "1 row".to_string()
        } else {
            format!("{} rows", self.row_count)
        }
    }
}
