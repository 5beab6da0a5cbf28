//! Scenarun - declarative scenario runner for APIs and databases.
//!
//! Runs YAML books of HTTP, SQL and shell steps and reports how many
//! scenarios passed.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::style::Stylize;
use serde_json::{Map, Value};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use scenarun::book::{discover_books, parse_book, parse_duration};
use scenarun::config::OutputFormat;
use scenarun::operator::output;
use scenarun::result::shorten_path;
use scenarun::{Config, Operators, Options};

/// Declarative scenario runner for API and database testing
#[derive(Parser)]
#[command(name = "scenarun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a config file (defaults to ./scenarun.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run books
    Run {
        /// Book files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Stop at the first failing scenario
        #[arg(long)]
        fail_fast: bool,

        /// Print step progress
        #[arg(short, long)]
        debug: bool,

        /// Report format (text, json)
        #[arg(short, long)]
        format: Option<OutputFormat>,

        /// Set a variable (KEY=VALUE, repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Delay between steps (e.g. 500ms, 2s)
        #[arg(long)]
        interval: Option<String>,
    },

    /// List books and their descriptions
    List {
        /// Book files or directories
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Run { paths, fail_fast, debug, format, vars, interval } => {
            let settings = RunSettings {
                fail_fast: fail_fast || config.run.fail_fast,
                debug: debug || config.run.debug,
                format: format.unwrap_or(config.output.format),
                verbose: config.output.verbose,
                vars: parse_vars(&vars)?,
                interval: match interval {
                    Some(s) => Some(parse_duration(&s)?),
                    None => config.interval()?,
                },
            };
            let passed = cmd_run(&paths, &settings)?;
            if !passed {
                std::process::exit(1);
            }
        }
        Commands::List { paths } => {
            cmd_list(&paths)?;
        }
    }

    Ok(())
}

/// Run flags after merging the CLI with the config file.
struct RunSettings {
    fail_fast: bool,
    debug: bool,
    format: OutputFormat,
    verbose: bool,
    vars: Map<String, Value>,
    interval: Option<Duration>,
}

/// Run every book under `paths`. Returns whether all scenarios passed.
fn cmd_run(paths: &[PathBuf], settings: &RunSettings) -> Result<bool> {
    // Debug and dump output share stderr with logs; stdout carries only the report.
    let progress = output(io::stderr());
    let mut ops = Operators::load(paths, || {
        let mut opts = Options::new()
            .vars(settings.vars.clone())
            .debug(settings.debug)
            .fail_fast(settings.fail_fast)
            .output(progress.clone());
        if let Some(interval) = settings.interval {
            opts = opts.interval(interval);
        }
        opts
    })?;

    if ops.is_empty() {
        anyhow::bail!("No books found in {}", display_paths(paths));
    }
    tracing::debug!(count = ops.len(), "Loaded books");

    let rt = tokio::runtime::Runtime::new()?;
    let aborted = rt.block_on(ops.run_n()).err();

    let mut out = io::stdout().lock();
    match settings.format {
        OutputFormat::Json => ops.result().out_json(&mut out)?,
        OutputFormat::Text => ops.result().out(&mut out, settings.verbose)?,
    }
    out.flush()?;

    if let Some(e) = aborted {
        eprintln!("{} {e}", "Aborted:".red());
    }
    Ok(!ops.result().has_failure())
}

/// List every book under `paths`.
fn cmd_list(paths: &[PathBuf]) -> Result<()> {
    let books = discover_books(paths)?;
    for path in &books {
        let book = parse_book(path).with_context(|| format!("failed to load {}", path.display()))?;
        let desc = if book.desc.is_empty() { "-".to_string() } else { book.desc };
        println!("{} - {}", shorten_path(path).cyan(), desc);
    }
    println!("\nTotal: {} books", books.len());
    Ok(())
}

/// Parse `KEY=VALUE` pairs. Values are read as YAML scalars so numbers and
/// booleans keep their type.
fn parse_vars(vars: &[String]) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for var in vars {
        let (key, raw) = var
            .split_once('=')
            .with_context(|| format!("invalid variable '{var}', expected KEY=VALUE"))?;
        let value = match serde_yaml::from_str::<Value>(raw) {
            Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::String(_))) => v,
            _ => Value::String(raw.to_string()),
        };
        map.insert(key.trim().to_string(), value);
    }
    Ok(map)
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
}
