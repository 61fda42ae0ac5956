use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::app::connection_error::{ConnectionErrorInfo, mask_password};
use crate::app::ports::{DatabaseSession, DbError, SessionFactory, SqlExecutor};
use crate::domain::{ConnectionProfile, QueryResult};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// psql exit status for "connection to the server went bad".
const EXIT_CONNECTION_BAD: i32 = 2;

#[derive(Debug, Clone)]
pub struct PsqlConfig {
    pub binary: PathBuf,
    pub timeout: Duration,
}

impl Default for PsqlConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("psql"),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PsqlConfig {
    /// Credentials travel through libpq environment variables so the password
    /// never shows up in the process list.
    fn command(&self, profile: &ConnectionProfile) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-X") // Ignore .psqlrc to avoid unexpected output
            .arg("-w") // Never prompt for a password
            .arg("-q") // No command tags, only result sets
            .arg("-v")
            .arg("ON_ERROR_STOP=1")
            .arg("--csv")
            .arg("-h")
            .arg(&profile.host)
            .arg("-p")
            .arg(profile.effective_port().to_string())
            .arg("-U")
            .arg(&profile.username)
            .arg("-d")
            .arg(&profile.database)
            .env("PGPASSWORD", &profile.password)
            .env("PGSSLMODE", profile.ssl_mode.as_str())
            .env("PGCONNECT_TIMEOUT", self.timeout.as_secs().max(1).to_string())
            .env("PGAPPNAME", "pgprobe")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn(&self, cmd: &mut Command) -> Result<Child, DbError> {
        cmd.spawn()
            .map_err(|e| DbError::CommandNotFound(format!("{}: {e}", self.binary.display())))
    }
}

/// Turns psql's `--csv` output into a result. Empty output means the
/// statement returned no result set.
pub fn parse_csv_output(
    query: &str,
    stdout: &str,
    execution_time_ms: u64,
) -> Result<QueryResult, DbError> {
    if stdout.trim().is_empty() {
        return Ok(QueryResult::command(query, execution_time_ms));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(stdout.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| DbError::ParseError(format!("CSV parse error: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DbError::ParseError(format!("CSV parse error: {e}")))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(QueryResult::new(query, columns, rows, execution_time_ms))
}

fn failure(status: ExitStatus, stderr: &str) -> DbError {
    let stderr = stderr.trim();
    if status.code() == Some(EXIT_CONNECTION_BAD) {
        return DbError::ConnectionFailed(ConnectionErrorInfo::new(stderr));
    }
    if stderr.is_empty() {
        return DbError::QueryFailed(format!("psql exited with {status}"));
    }
    DbError::QueryFailed(mask_password(stderr))
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// One psql process per statement.
#[derive(Debug, Clone, Default)]
pub struct PsqlExecutor {
    config: PsqlConfig,
}

impl PsqlExecutor {
    pub fn new(config: PsqlConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SqlExecutor for PsqlExecutor {
    async fn execute(
        &self,
        profile: &ConnectionProfile,
        sql: &str,
    ) -> Result<QueryResult, DbError> {
        let start = Instant::now();
        tracing::debug!(dsn = %profile.to_masked_dsn(), "running statement through psql");

        let mut cmd = self.config.command(profile);
        cmd.arg("-c").arg(sql).stdin(Stdio::null());
        let mut child = self.config.spawn(&mut cmd)?;

        // Read stdout/stderr BEFORE wait() to prevent pipe buffer deadlock
        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();

        let (status, stdout, stderr) = timeout(self.config.timeout, async {
            let (stdout, stderr) = tokio::join!(read_all(stdout_handle), read_all(stderr_handle));
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stdout?, stderr?))
        })
        .await
        .map_err(|_| DbError::Timeout)?
        .map_err(|e| DbError::QueryFailed(e.to_string()))?;

        let elapsed = start.elapsed().as_millis() as u64;

        if !status.success() {
            return Err(failure(status, &stderr));
        }

        parse_csv_output(sql, &stdout, elapsed)
    }
}

/// Opens long-lived psql processes fed through stdin.
#[derive(Debug, Clone, Default)]
pub struct PsqlSessionFactory {
    config: PsqlConfig,
}

impl PsqlSessionFactory {
    pub fn new(config: PsqlConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for PsqlSessionFactory {
    async fn open(&self, profile: &ConnectionProfile) -> Result<Box<dyn DatabaseSession>, DbError> {
        tracing::debug!(dsn = %profile.to_masked_dsn(), "opening psql session");

        let mut cmd = self.config.command(profile);
        cmd.stdin(Stdio::piped());
        let mut child = self.config.spawn(&mut cmd)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(DbError::QueryFailed("psql pipes unavailable".to_string()));
        };
        // Drained in the background so notices can never fill the pipe.
        let stderr = tokio::spawn(read_all(child.stderr.take()));

        let mut session = PsqlSession {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            stderr: Some(stderr),
            timeout: self.config.timeout,
            sequence: 0,
            closed: false,
        };

        // An empty round trip proves the server accepted the connection.
        session.round_trip("").await?;
        Ok(Box::new(session))
    }
}

/// A running psql. Each statement is followed by `\echo <marker>` so the end
/// of its output can be found on stdout.
pub struct PsqlSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<std::io::Result<String>>>,
    timeout: Duration,
    sequence: u64,
    closed: bool,
}

impl PsqlSession {
    fn next_marker(&mut self) -> String {
        self.sequence += 1;
        format!("__pgprobe_end_{}_{}__", std::process::id(), self.sequence)
    }

    async fn round_trip(&mut self, sql: &str) -> Result<String, DbError> {
        let marker = self.next_marker();
        let mut script = String::new();
        let sql = sql.trim();
        if !sql.is_empty() {
            script.push_str(sql);
            if !sql.ends_with(';') {
                script.push(';');
            }
            script.push('\n');
        }
        script.push_str(&format!("\\echo {marker}\n"));

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(DbError::Closed);
        };
        if stdin.write_all(script.as_bytes()).await.is_err() || stdin.flush().await.is_err() {
            return Err(self.exited().await);
        }

        let outcome = timeout(self.timeout, read_until(&mut self.stdout, &marker)).await;
        match outcome {
            Ok(Ok(Some(output))) => Ok(output),
            Ok(Ok(None)) => Err(self.exited().await),
            Ok(Err(e)) => {
                self.abort().await;
                Err(DbError::QueryFailed(e.to_string()))
            }
            Err(_) => {
                self.abort().await;
                Err(DbError::Timeout)
            }
        }
    }

    /// psql stopped talking: collect its status and stderr.
    async fn exited(&mut self) -> DbError {
        self.stdin = None;
        let waited = timeout(self.timeout, self.child.wait()).await;
        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return DbError::QueryFailed(e.to_string()),
            Err(_) => {
                self.abort().await;
                return DbError::Timeout;
            }
        };
        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.ok().and_then(Result::ok).unwrap_or_default(),
            None => String::new(),
        };
        failure(status, &stderr)
    }

    async fn abort(&mut self) {
        self.stdin = None;
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, "failed to kill psql");
        }
    }
}

async fn read_until(
    stdout: &mut BufReader<ChildStdout>,
    marker: &str,
) -> std::io::Result<Option<String>> {
    let mut output = String::new();
    let mut line = String::new();
    loop {
        line.clear();
        if stdout.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        if line.trim_end_matches(['\r', '\n']) == marker {
            return Ok(Some(output));
        }
        output.push_str(&line);
    }
}

#[async_trait]
impl DatabaseSession for PsqlSession {
    async fn query(&mut self, sql: &str) -> Result<QueryResult, DbError> {
        let start = Instant::now();
        let output = self.round_trip(sql).await?;
        parse_csv_output(sql, &output, start.elapsed().as_millis() as u64)
    }

    async fn close(&mut self) -> Result<(), DbError> {
        if self.closed {
            return Err(DbError::Closed);
        }
        self.closed = true;

        let Some(mut stdin) = self.stdin.take() else {
            // Already dead or killed.
            return Ok(());
        };
        if stdin.write_all(b"\\q\n").await.is_ok() {
            let _ = stdin.flush().await;
        }
        drop(stdin);

        let waited = timeout(self.timeout, self.child.wait()).await;
        match waited {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DbError::QueryFailed(e.to_string())),
            Err(_) => {
                self.abort().await;
                Err(DbError::Timeout)
            }
        }
    }
}
