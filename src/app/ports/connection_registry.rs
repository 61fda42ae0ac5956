use std::path::PathBuf;

use crate::domain::connection::{ConnectionId, ConnectionProfile};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Config version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("Read error: {0}")]
    ReadError(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Invalid connection URI for {id}: {reason}")]
    InvalidUri { id: String, reason: String },
    #[error("IO error: {0}")]
    IoError(String),
    #[error("The conn_id `{0}` isn't defined")]
    NotFound(String),
    #[error("Connections `{first}` and `{second}` share the override variable {var}")]
    AmbiguousEnvName {
        first: String,
        second: String,
        var: String,
    },
}

/// Named connection credentials, looked up by id.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionRegistry: Send + Sync {
    fn get(&self, id: &ConnectionId) -> Result<ConnectionProfile, RegistryError>;

    /// Every known connection, sorted by id.
    fn list(&self) -> Result<Vec<ConnectionProfile>, RegistryError>;

    fn storage_path(&self) -> PathBuf;
}
