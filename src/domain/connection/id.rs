use std::fmt;

use serde::{Deserialize, Serialize};

const MAX_LENGTH: usize = 250;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionIdError {
    #[error("Connection id cannot be empty")]
    Empty,
    #[error("Connection id too long: {len} chars (max {max})")]
    TooLong { len: usize, max: usize },
    #[error("Connection id contains invalid character {ch:?} (allowed: letters, digits, '_', '-', '.')")]
    InvalidChar { ch: char },
}

/// Registry key of a connection, e.g. `postgres_external`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Result<Self, ConnectionIdError> {
        let id = id.into();
        let trimmed = id.trim();

        if trimmed.is_empty() {
            return Err(ConnectionIdError::Empty);
        }

        let char_count = trimmed.chars().count();
        if char_count > MAX_LENGTH {
            return Err(ConnectionIdError::TooLong {
                len: char_count,
                max: MAX_LENGTH,
            });
        }

        if let Some(ch) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
        {
            return Err(ConnectionIdError::InvalidChar { ch });
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Suffix used by environment-provided connections (`PGPROBE_CONN_<ID>`).
    pub fn env_suffix(&self) -> String {
        self.0
            .chars()
            .map(|c| match c {
                '-' | '.' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ConnectionId {
    type Err = ConnectionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for ConnectionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ConnectionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ConnectionId::new(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    mod new {
        use super::*;

        #[rstest]
        #[case("postgres_external", true)]
        #[case("postgres_external_docker", true)]
        #[case("warehouse-prod.eu", true)]
        #[case("  postgres_external  ", true)] // trimmed
        #[case("", false)]
        #[case("   ", false)]
        #[case("postgres external", false)] // inner whitespace
        #[case("pg/ext", false)]
        fn validation(#[case] input: &str, #[case] should_succeed: bool) {
            assert_eq!(ConnectionId::new(input).is_ok(), should_succeed);
        }

        #[test]
        fn exactly_max_chars_returns_ok() {
            let id = "a".repeat(250);
            assert!(ConnectionId::new(id).is_ok());
        }

        #[test]
        fn over_max_chars_returns_too_long_error() {
            let result = ConnectionId::new("a".repeat(251));
            assert_eq!(
                result,
                Err(ConnectionIdError::TooLong { len: 251, max: 250 })
            );
        }

        #[test]
        fn reports_first_invalid_char() {
            let result = ConnectionId::new("pg:ext");
            assert_eq!(result, Err(ConnectionIdError::InvalidChar { ch: ':' }));
        }
    }

    mod env_suffix {
        use super::*;

        #[rstest]
        #[case("postgres_external", "POSTGRES_EXTERNAL")]
        #[case("postgres_external_docker", "POSTGRES_EXTERNAL_DOCKER")]
        #[case("warehouse-prod.eu", "WAREHOUSE_PROD_EU")]
        fn uppercases_and_normalizes(#[case] input: &str, #[case] expected: &str) {
            let id = ConnectionId::new(input).unwrap();
            assert_eq!(id.env_suffix(), expected);
        }
    }

    #[test]
    fn display_shows_inner_value() {
        let id = ConnectionId::new("postgres_external").unwrap();
        assert_eq!(format!("{}", id), "postgres_external");
    }
}
