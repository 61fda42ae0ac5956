use std::sync::OnceLock;

use regex::Regex;

static URL_RE: OnceLock<Regex> = OnceLock::new();
static PARAM_RE: OnceLock<Regex> = OnceLock::new();
static ENV_RE: OnceLock<Regex> = OnceLock::new();

/// Cause of a failed session start, read from psql's stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionErrorKind {
    PsqlNotFound,
    HostUnreachable,
    ConnectionRefused,
    AuthFailed,
    DatabaseNotFound,
    SslUnsupported,
    Timeout,
    #[default]
    Unknown,
}

impl ConnectionErrorKind {
    pub fn classify(stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        let has = |needle: &str| lower.contains(needle);

        if has("command not found") || has("not found: psql") || has("not recognized") {
            return Self::PsqlNotFound;
        }

        if has("could not translate host name")
            || has("name or service not known")
            || has("nodename nor servname provided")
            || has("no such host")
        {
            return Self::HostUnreachable;
        }

        if has("connection refused") || has("no route to host") {
            return Self::ConnectionRefused;
        }

        if has("password authentication failed")
            || has("authentication failed")
            || (has("fatal:") && has("password"))
        {
            return Self::AuthFailed;
        }

        if has("does not exist") && (has("database") || has("fatal:")) {
            return Self::DatabaseNotFound;
        }

        if has("server does not support ssl") || has("ssl is not enabled") {
            return Self::SslUnsupported;
        }

        if has("timeout expired") || has("timed out") {
            return Self::Timeout;
        }

        Self::Unknown
    }

    pub fn summary(self) -> &'static str {
        match self {
            Self::PsqlNotFound => "psql command not found",
            Self::HostUnreachable => "Could not resolve host",
            Self::ConnectionRefused => "Connection refused",
            Self::AuthFailed => "Authentication failed",
            Self::DatabaseNotFound => "Database does not exist",
            Self::SslUnsupported => "Server does not support SSL",
            Self::Timeout => "Connection timed out",
            Self::Unknown => "Connection failed",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            Self::PsqlNotFound => "Install the PostgreSQL client or pass --psql",
            Self::HostUnreachable => "Check the host of the registry entry",
            Self::ConnectionRefused => "Check that the server is running and the port is right",
            Self::AuthFailed => "Check login and password of the registry entry",
            Self::DatabaseNotFound => "Check the schema/database of the registry entry",
            Self::SslUnsupported => "Lower ssl_mode of the registry entry or enable SSL on the server",
            Self::Timeout => "Check network connectivity",
            Self::Unknown => "See details for more information",
        }
    }
}

/// Classified connection failure. Only `masked_details` may be logged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionErrorInfo {
    pub kind: ConnectionErrorKind,
    pub raw_details: String,
    pub masked_details: String,
}

impl ConnectionErrorInfo {
    pub fn new(raw_stderr: impl Into<String>) -> Self {
        let raw_details = raw_stderr.into();
        let kind = ConnectionErrorKind::classify(&raw_details);
        Self::with_kind(kind, raw_details)
    }

    pub fn with_kind(kind: ConnectionErrorKind, raw_stderr: impl Into<String>) -> Self {
        let raw_details = raw_stderr.into().trim().to_string();
        let masked_details = mask_password(&raw_details);

        Self {
            kind,
            raw_details,
            masked_details,
        }
    }

    pub fn summary(&self) -> &'static str {
        self.kind.summary()
    }

    pub fn hint(&self) -> &'static str {
        self.kind.hint()
    }
}

/// Replaces passwords in DSNs, `password=` params and `PGPASSWORD=` with ****.
pub fn mask_password(text: &str) -> String {
    let url_re = URL_RE
        .get_or_init(|| Regex::new(r"(?i)(postgres(?:ql)?://[^:/@\s]+:)[^@\s]+(@)").unwrap());
    let result = url_re.replace_all(text, "${1}****${2}");

    let param_re = PARAM_RE.get_or_init(|| Regex::new(r"(?i)(password=)[^\s&]+").unwrap());
    let result = param_re.replace_all(&result, "${1}****");

    let env_re = ENV_RE.get_or_init(|| Regex::new(r"(PGPASSWORD=)[^\s]+").unwrap());
    env_re.replace_all(&result, "${1}****").into_owned()
}
