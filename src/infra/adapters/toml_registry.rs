use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::app::ports::{ConnectionRegistry, RegistryError};
use crate::config::connection_uri::parse_connection_uri;
use crate::config::dirs::default_config_dir;
use crate::config::registry_file::{CURRENT_VERSION, RegistryFile};
use crate::domain::connection::{ConnectionId, ConnectionProfile};

const CONFIG_FILE_NAME: &str = "connections.toml";
pub const CONFIG_DIR_ENV: &str = "PGPROBE_CONFIG_DIR";
pub const CONN_ENV_PREFIX: &str = "PGPROBE_CONN_";

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Registry backed by `connections.toml`. A `PGPROBE_CONN_<ID>` variable
/// holding a postgres URI takes precedence over the file entry.
pub struct TomlConnectionRegistry {
    config_dir: PathBuf,
    env: EnvLookup,
}

impl TomlConnectionRegistry {
    /// `$PGPROBE_CONFIG_DIR`, else `<platform config dir>/pgprobe`.
    pub fn new() -> Result<Self, RegistryError> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => default_config_dir()
                .ok_or_else(|| RegistryError::IoError("Could not find config directory".into()))?,
        };
        Ok(Self::with_config_dir(config_dir))
    }

    pub fn with_config_dir(config_dir: PathBuf) -> Self {
        Self {
            config_dir,
            env: Arc::new(|key| std::env::var(key).ok()),
        }
    }

    /// Replaces the process environment as the source of URI overrides.
    pub fn with_env(
        mut self,
        env: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.env = Arc::new(env);
        self
    }

    fn config_file_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    fn load(&self) -> Result<RegistryFile, RegistryError> {
        let path = self.config_file_path();

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no connections file, registry is empty");
            return Ok(RegistryFile::empty());
        }

        let content =
            fs::read_to_string(&path).map_err(|e| RegistryError::ReadError(e.to_string()))?;

        let file: RegistryFile =
            toml::from_str(&content).map_err(|e| RegistryError::InvalidFormat(e.to_string()))?;

        if file.version != CURRENT_VERSION {
            return Err(RegistryError::VersionMismatch {
                found: file.version,
                expected: CURRENT_VERSION,
            });
        }

        check_env_names(&file)?;
        Ok(file)
    }

    fn env_override(&self, id: &ConnectionId) -> Result<Option<ConnectionProfile>, RegistryError> {
        let key = format!("{CONN_ENV_PREFIX}{}", id.env_suffix());
        match (self.env)(&key) {
            Some(uri) if !uri.trim().is_empty() => {
                tracing::debug!(conn_id = %id, env = %key, "connection taken from environment");
                parse_connection_uri(id, &uri).map(Some)
            }
            _ => Ok(None),
        }
    }
}

/// `-` and `.` fold to `_` and case is ignored in override variable names, so
/// ids like `a-b` and `A_B` would share one override.
fn check_env_names(file: &RegistryFile) -> Result<(), RegistryError> {
    let mut seen: HashMap<String, &ConnectionId> = HashMap::new();
    for id in file.connections.keys() {
        if let Some(first) = seen.insert(id.env_suffix(), id) {
            return Err(RegistryError::AmbiguousEnvName {
                first: first.to_string(),
                second: id.to_string(),
                var: format!("{CONN_ENV_PREFIX}{}", id.env_suffix()),
            });
        }
    }
    Ok(())
}

impl ConnectionRegistry for TomlConnectionRegistry {
    fn get(&self, id: &ConnectionId) -> Result<ConnectionProfile, RegistryError> {
        if let Some(profile) = self.env_override(id)? {
            return Ok(profile);
        }

        self.load()?
            .profile(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    fn list(&self) -> Result<Vec<ConnectionProfile>, RegistryError> {
        let mut profiles = self.load()?.profiles();
        for profile in &mut profiles {
            if let Some(overridden) = self.env_override(&profile.id)? {
                *profile = overridden;
            }
        }
        Ok(profiles)
    }

    fn storage_path(&self) -> PathBuf {
        self.config_file_path()
    }
}
