use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::connection::{ConnectionId, ConnectionProfile, SslMode};

pub const CURRENT_VERSION: u32 = 1;

/// On-disk shape of `connections.toml`:
///
/// ```toml
/// version = 1
///
/// [connections.postgres_external]
/// host = "localhost"
/// port = 5432
/// database = "airflow_test"
/// username = "airflow"
/// password = "airflow"
/// ssl_mode = "prefer"
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistryFile {
    pub version: u32,
    #[serde(default)]
    pub connections: BTreeMap<ConnectionId, RegistryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub database: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub ssl_mode: SslMode,
}

impl RegistryFile {
    pub fn empty() -> Self {
        Self {
            version: CURRENT_VERSION,
            connections: BTreeMap::new(),
        }
    }

    pub fn profile(&self, id: &ConnectionId) -> Option<ConnectionProfile> {
        self.connections
            .get(id)
            .map(|entry| entry.to_profile(id.clone()))
    }

    pub fn profiles(&self) -> Vec<ConnectionProfile> {
        self.connections
            .iter()
            .map(|(id, entry)| entry.to_profile(id.clone()))
            .collect()
    }
}

impl RegistryEntry {
    pub fn to_profile(&self, id: ConnectionId) -> ConnectionProfile {
        ConnectionProfile::new(
            id,
            self.host.clone(),
            self.port,
            self.database.clone(),
            self.username.clone(),
            self.password.clone(),
            self.ssl_mode,
        )
    }
}
