use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pgprobe::app::dag::Dag;
use pgprobe::app::pipeline::{PUBLISHING_TASK, Ports, connection_test_dag};
use pgprobe::app::ports::{ConnectionRegistry, RETURN_VALUE_KEY, ResultStore};
use pgprobe::app::runner::DagRunner;
use pgprobe::cli::{Cli, Command, ConnectionsCommand, Settings};
use pgprobe::domain::{DagRun, RunState};
use pgprobe::error;
use pgprobe::infra::adapters::{
    JsonResultStore, PsqlExecutor, PsqlSessionFactory, TomlConnectionRegistry, WriterReporter,
};
use pgprobe::infra::config::dirs::default_results_dir;
use pgprobe::report;

const DEFAULT_LOG_FILTER: &str = "pgprobe=info,pgprobe_app=info,pgprobe_infra=info";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    error::install_hooks()?;
    init_tracing();

    let cli = Cli::parse();
    let registry: Arc<dyn ConnectionRegistry> = Arc::new(match &cli.settings.config_dir {
        Some(dir) => TomlConnectionRegistry::with_config_dir(dir.clone()),
        None => TomlConnectionRegistry::new()?,
    });
    tracing::debug!(path = %registry.storage_path().display(), "connection registry");

    let mut out = io::stdout();
    match cli.command {
        Command::Run => trigger(&cli.settings, registry, None).await,
        Command::Task { task_id } => trigger(&cli.settings, registry, Some(task_id)).await,
        Command::Tasks => {
            let dag = build_dag(&cli.settings, registry)?;
            report::write_task_list(&mut out, &dag)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Connections(ConnectionsCommand::List) => {
            let profiles = registry.list()?;
            if profiles.is_empty() {
                writeln!(out, "No connections in {}", registry.storage_path().display())?;
            } else {
                report::write_connections(&mut out, &profiles)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Connections(ConnectionsCommand::Get { id }) => {
            report::write_connection(&mut out, &registry.get(&id)?)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn build_dag(settings: &Settings, registry: Arc<dyn ConnectionRegistry>) -> Result<Dag> {
    let psql = settings.psql_config();
    let ports = Ports {
        registry,
        sessions: Arc::new(PsqlSessionFactory::new(psql.clone())),
        executor: Arc::new(PsqlExecutor::new(psql)),
    };
    Ok(connection_test_dag(&ports, &settings.pipeline_config())?)
}

/// Runs the whole DAG, or only `task_id` when given.
async fn trigger(
    settings: &Settings,
    registry: Arc<dyn ConnectionRegistry>,
    task_id: Option<String>,
) -> Result<ExitCode> {
    let dag = build_dag(settings, registry)?;
    let results_dir = match &settings.results_dir {
        Some(dir) => dir.clone(),
        None => default_results_dir()
            .ok_or_else(|| eyre!("Could not find data directory, pass --results-dir"))?,
    };
    let store = Arc::new(JsonResultStore::new(results_dir));

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling run");
                cancel.cancel();
            }
        }
    });

    let runner = DagRunner::new(
        Arc::new(WriterReporter::stdout()),
        Arc::clone(&store) as Arc<dyn ResultStore>,
    )
    .with_cancellation(cancel);

    let run = match task_id {
        Some(task_id) => runner.run_task(&dag, &task_id).await?,
        None => runner.run(&dag).await?,
    };
    let run_file = store.write_run(&run)?;
    tracing::info!(path = %run_file.display(), "run summary written");

    print_outcome(&run, store.as_ref())?;

    Ok(if run.state() == RunState::Success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_outcome(run: &DagRun, store: &JsonResultStore) -> Result<()> {
    let mut out = io::stdout();
    writeln!(out)?;
    report::write_run_summary(&mut out, run)?;

    if let Some(result) = store.fetch(&run.run_id, PUBLISHING_TASK, RETURN_VALUE_KEY)? {
        writeln!(
            out,
            "\n{PUBLISHING_TASK} {RETURN_VALUE_KEY} ({}):",
            store.entry_path(&run.run_id, PUBLISHING_TASK, RETURN_VALUE_KEY).display()
        )?;
        report::write_query_result(&mut out, &result)?;
    }
    Ok(())
}
