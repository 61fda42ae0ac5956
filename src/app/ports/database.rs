use async_trait::async_trait;

use crate::connection_error::ConnectionErrorInfo;
use crate::domain::{ConnectionProfile, QueryResult};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),
    #[error("{}: {}", .0.summary(), .0.masked_details)]
    ConnectionFailed(ConnectionErrorInfo),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Operation timed out")]
    Timeout,
    #[error("Session already closed")]
    Closed,
}

/// Opens live sessions against a connection profile.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, profile: &ConnectionProfile)
    -> Result<Box<dyn DatabaseSession>, DbError>;
}

/// One open connection. Callers must `close` it on every path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatabaseSession: Send {
    async fn query(&mut self, sql: &str) -> Result<QueryResult, DbError>;

    async fn close(&mut self) -> Result<(), DbError>;
}

/// Runs one statement on a short-lived connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(
        &self,
        profile: &ConnectionProfile,
        sql: &str,
    ) -> Result<QueryResult, DbError>;
}
