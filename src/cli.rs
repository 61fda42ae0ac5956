use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::app::pipeline::{DEFAULT_INSPECT_CONN, DEFAULT_SQL_CONN, PipelineConfig};
use crate::domain::ConnectionId;
use crate::infra::adapters::PsqlConfig;

/// Manually triggered connectivity check for an external PostgreSQL database
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Trigger one run of the connection test
    Run,
    /// Run a single task in isolation, without upstream check or retries
    Task { task_id: String },
    /// List the tasks of the connection test with their upstream
    Tasks,
    /// Inspect the connection registry (passwords masked)
    #[command(subcommand)]
    Connections(ConnectionsCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionsCommand {
    /// List every registered connection
    List,
    /// Show one connection
    Get { id: ConnectionId },
}

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Directory holding connections.toml
    #[arg(long, env = "PGPROBE_CONFIG_DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Directory published results are written to
    #[arg(long, env = "PGPROBE_RESULTS_DIR", global = true)]
    pub results_dir: Option<PathBuf>,

    /// Connection printed and probed by the first two tasks
    #[arg(long, env = "PGPROBE_INSPECT_CONN", default_value = DEFAULT_INSPECT_CONN, global = true)]
    pub inspect_conn: ConnectionId,

    /// Connection the SQL tasks run against
    #[arg(long, env = "PGPROBE_SQL_CONN", default_value = DEFAULT_SQL_CONN, global = true)]
    pub sql_conn: ConnectionId,

    /// Retries per task after a failed attempt
    #[arg(long, default_value_t = 1, global = true)]
    pub retries: u32,

    /// Wait between a failed attempt and its retry
    #[arg(long, default_value_t = 60, global = true)]
    pub retry_delay_secs: u64,

    /// Timeout for each psql invocation
    #[arg(long, env = "PGPROBE_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub timeout_secs: u64,

    /// psql binary to run
    #[arg(long, env = "PGPROBE_PSQL", default_value = "psql", global = true)]
    pub psql: PathBuf,
}

impl Settings {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            retries: self.retries,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            ..PipelineConfig::new(self.inspect_conn.clone(), self.sql_conn.clone())
        }
    }

    pub fn psql_config(&self) -> PsqlConfig {
        PsqlConfig {
            binary: self.psql.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pgprobe").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn settings_override_pipeline_defaults() {
        let cli = parse(&[
            "run",
            "--sql-conn",
            "warehouse",
            "--retries",
            "3",
            "--retry-delay-secs",
            "5",
            "--timeout-secs",
            "7",
            "--psql",
            "/opt/pg/bin/psql",
        ]);

        let pipeline = cli.settings.pipeline_config();
        let psql = cli.settings.psql_config();

        assert_eq!(cli.command, Command::Run);
        assert_eq!(pipeline.sql_conn.as_str(), "warehouse");
        assert_eq!(pipeline.retries, 3);
        assert_eq!(pipeline.retry_delay, Duration::from_secs(5));
        assert_eq!(psql.timeout, Duration::from_secs(7));
        assert_eq!(psql.binary, PathBuf::from("/opt/pg/bin/psql"));
    }

    #[test]
    fn task_takes_an_id() {
        let cli = parse(&["task", "create_test_table"]);

        assert_eq!(
            cli.command,
            Command::Task {
                task_id: "create_test_table".to_string()
            }
        );
    }

    #[test]
    fn connections_get_validates_id() {
        let cli = parse(&["connections", "get", "postgres_external"]);
        assert!(matches!(
            cli.command,
            Command::Connections(ConnectionsCommand::Get { .. })
        ));

        let err = Cli::try_parse_from(["pgprobe", "connections", "get", "bad id"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
