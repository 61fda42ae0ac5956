//! Plain-text tables the CLI prints after a command.

use std::io::{self, Write};

use crate::app::dag::Dag;
use crate::domain::{ConnectionProfile, DagRun, QueryResult, TaskState};

const TALLIED_STATES: [TaskState; 3] = [
    TaskState::Success,
    TaskState::Failed,
    TaskState::UpstreamFailed,
];

fn write_table<W: Write>(out: &mut W, header: &[&str], rows: &[Vec<String>]) -> io::Result<()> {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render = |cells: &mut dyn Iterator<Item = &str>| {
        let line = cells
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        line.trim_end().to_string()
    };

    writeln!(out, "{}", render(&mut header.iter().copied()))?;
    for row in rows {
        writeln!(out, "{}", render(&mut row.iter().map(String::as_str)))?;
    }
    Ok(())
}

pub fn write_run_summary<W: Write>(out: &mut W, run: &DagRun) -> io::Result<()> {
    writeln!(out, "DAG run {} of {}: {}", run.run_id, run.dag_id, run.state())?;

    let rows: Vec<Vec<String>> = run
        .tasks
        .iter()
        .map(|ti| {
            vec![
                ti.task_id.clone(),
                ti.state.to_string(),
                format!("{}/{}", ti.try_number, ti.max_tries),
                ti.duration_ms()
                    .map_or_else(|| "-".to_string(), |ms| format!("{ms} ms")),
                ti.error.clone().unwrap_or_default(),
            ]
        })
        .collect();
    write_table(out, &["TASK", "STATE", "TRIES", "DURATION", "ERROR"], &rows)?;

    let tally: Vec<String> = TALLIED_STATES
        .into_iter()
        .map(|state| format!("{} {state}", run.count_in(state)))
        .collect();
    writeln!(out, "{}", tally.join(", "))
}

pub fn write_query_result<W: Write>(out: &mut W, result: &QueryResult) -> io::Result<()> {
    let header: Vec<&str> = result.columns.iter().map(String::as_str).collect();
    write_table(out, &header, &result.rows)?;
    writeln!(out, "({})", result.row_count_display())
}

pub fn write_task_list<W: Write>(out: &mut W, dag: &Dag) -> io::Result<()> {
    writeln!(out, "{}: {}", dag.dag_id, dag.description)?;

    let rows: Vec<Vec<String>> = dag
        .task_ids()
        .iter()
        .map(|id| {
            let upstream = dag.upstream_of(id);
            vec![
                id.clone(),
                if upstream.is_empty() {
                    "-".to_string()
                } else {
                    upstream.join(", ")
                },
            ]
        })
        .collect();
    write_table(out, &["TASK", "UPSTREAM"], &rows)
}

pub fn write_connections<W: Write>(out: &mut W, profiles: &[ConnectionProfile]) -> io::Result<()> {
    let rows: Vec<Vec<String>> = profiles
        .iter()
        .map(|p| {
            vec![
                p.id.to_string(),
                p.host.clone(),
                p.port_display(),
                p.database.clone(),
                p.username.clone(),
                p.ssl_mode.to_string(),
            ]
        })
        .collect();
    write_table(out, &["ID", "HOST", "PORT", "DATABASE", "LOGIN", "SSL"], &rows)
}

pub fn write_connection<W: Write>(out: &mut W, profile: &ConnectionProfile) -> io::Result<()> {
    writeln!(out, "Connection ID: {}", profile.id)?;
    writeln!(out, "Host: {}", profile.host)?;
    writeln!(out, "Port: {}", profile.port_display())?;
    writeln!(out, "Schema/Database: {}", profile.database)?;
    writeln!(out, "Login: {}", profile.username)?;
    writeln!(out, "SSL mode: {}", profile.ssl_mode)?;
    writeln!(out, "URI: {}", profile.to_masked_dsn())
}
