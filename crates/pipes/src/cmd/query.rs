//! Query command - Stream rows of a Pipes table
//!
//! Rows are written to stdout as pretty JSON (default) or one compact JSON
//! object per line.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use pipes_connectors::{ExecutionContext, Flow, PipesConfig, Query, Row, Table, available_tables};
use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON array
    Json,
    /// One JSON object per line
    Compact,
}

/// Query command arguments
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Table name (see `pipes tables`)
    #[arg(value_name = "TABLE")]
    table: String,

    /// Key column value, repeatable (e.g., -w identity_handle=acme)
    #[arg(short = 'w', long = "where", value_name = "KEY=VALUE", value_parser = parse_qual)]
    quals: Vec<(String, String)>,

    /// Maximum number of rows
    #[arg(short = 'n', long)]
    limit: Option<u64>,

    /// API token (or set STEAMPIPE_CLOUD_TOKEN / PIPES_TOKEN)
    #[arg(short, long)]
    token: Option<String>,

    /// API host (or set STEAMPIPE_CLOUD_HOST / PIPES_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    output: OutputFormat,
}

/// Run the query command
pub async fn run(args: QueryArgs, config_path: Option<&Path>) -> Result<()> {
    let table = Table::from_name(&args.table)
        .with_context(|| format!("available tables: {}", available_tables().join(", ")))?;
    let query = build_query(table, &args)?;

    let mut config = match config_path {
        Some(path) => PipesConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PipesConfig::default(),
    };
    if args.token.is_some() {
        config.token = args.token.clone();
    }
    if args.host.is_some() {
        config.host = args.host.clone();
    }

    let ctx = ExecutionContext::from_config(&config).context("failed to create Pipes client")?;

    info!(
        table = %table,
        quals = query.quals.len(),
        limit = ?query.limit,
        "running query"
    );

    let mut out = std::io::stdout();
    let mut collected: Vec<Value> = Vec::new();
    let mut write_error: Option<std::io::Error> = None;

    let stats = ctx
        .execute(table, &query, |row| match args.output {
            OutputFormat::Json => {
                collected.push(Value::Object(row));
                Flow::Continue
            }
            OutputFormat::Compact => match write_compact(&mut out, row) {
                Ok(()) => Flow::Continue,
                Err(e) => {
                    write_error = Some(e);
                    Flow::Stop
                }
            },
        })
        .await
        .with_context(|| format!("failed to query {}", table))?;

    if let Some(e) = write_error {
        return Err(e).context("failed to write rows");
    }
    if args.output == OutputFormat::Json {
        writeln!(out, "{}", serde_json::to_string_pretty(&collected)?)
            .context("failed to write rows")?;
    }

    info!(
        table = %table,
        rows = stats.rows,
        pages = stats.pages,
        "query finished"
    );
    Ok(())
}

fn write_compact(out: &mut impl Write, row: Row) -> std::io::Result<()> {
    let line = serde_json::to_string(&Value::Object(row))?;
    writeln!(out, "{}", line)
}

/// Turn CLI quals into a query, rejecting columns the table cannot use
fn build_query(table: Table, args: &QueryArgs) -> Result<Query> {
    let mut query = Query::new();
    for (column, value) in &args.quals {
        let known = table.get_keys().contains(&column.as_str())
            || table.list_quals().contains(&column.as_str());
        if !known {
            let mut columns: Vec<&str> = table.get_keys().to_vec();
            columns.extend(table.list_quals().iter().filter(|c| !table.get_keys().contains(*c)));
            anyhow::bail!(
                "{} is not a key column of {} (key columns: {})",
                column,
                table,
                if columns.is_empty() {
                    "none".to_string()
                } else {
                    columns.join(", ")
                }
            );
        }
        query = query.with_qual(column.clone(), value.clone());
    }
    if let Some(limit) = args.limit {
        query = query.with_limit(limit);
    }
    Ok(query)
}

fn parse_qual(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}
