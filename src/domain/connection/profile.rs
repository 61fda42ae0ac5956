use serde::{Deserialize, Serialize};

use super::id::ConnectionId;
use super::ssl_mode::SslMode;

pub const DEFAULT_PORT: u16 = 5432;

/// Credentials of one registry entry. `port` stays optional because the
/// registry may leave it unset; consumers decide on the fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub id: ConnectionId,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    pub username: String,
    pub password: String,
    pub ssl_mode: SslMode,
}

impl ConnectionProfile {
    pub fn new(
        id: ConnectionId,
        host: impl Into<String>,
        port: Option<u16>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        ssl_mode: SslMode,
    ) -> Self {
        Self {
            id,
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            password: password.into(),
            ssl_mode,
        }
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Port as the registry holds it: the number, or `None` when unset.
    pub fn port_display(&self) -> String {
        self.port
            .map_or_else(|| "None".to_string(), |port| port.to_string())
    }

    /// For logging - password replaced with ****
    pub fn to_masked_dsn(&self) -> String {
        format!(
            "postgres://{}:****@{}:{}/{}?sslmode={}",
            urlencoding::encode(&self.username),
            self.host,
            self.effective_port(),
            self.database,
            self.ssl_mode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_profile(port: Option<u16>) -> ConnectionProfile {
        ConnectionProfile::new(
            ConnectionId::new("postgres_external").unwrap(),
            "localhost",
            port,
            "testdb",
            "testuser",
            "testpass",
            SslMode::Prefer,
        )
    }

    mod port {
        use super::*;

        #[test]
        fn unset_port_falls_back_to_5432() {
            let profile = make_test_profile(None);
            assert_eq!(profile.effective_port(), 5432);
        }

        #[test]
        fn explicit_port_is_kept() {
            let profile = make_test_profile(Some(6543));
            assert_eq!(profile.effective_port(), 6543);
        }

        #[test]
        fn port_display_shows_none_when_unset() {
            assert_eq!(make_test_profile(None).port_display(), "None");
            assert_eq!(make_test_profile(Some(5433)).port_display(), "5433");
        }
    }

    mod to_masked_dsn {
        use super::*;

        #[test]
        fn hides_password() {
            let masked = make_test_profile(None).to_masked_dsn();
            assert!(masked.contains("****"));
            assert!(!masked.contains("testpass"));
        }
    }
}
