//! harmonizer: migrate Dune queries to DuneSQL.
//!
//! # Usage
//!
//! ```bash
//! harmonizer --from postgres --chain ethereum "SELECT * FROM erc20.tokens"
//! harmonizer --from spark --file query.sql
//! cat query.sql | harmonizer --from postgres --syntax-only
//! ```

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use colored::*;
use tracing_subscriber::EnvFilter;

use harmonizer::config::Config;
use harmonizer::prelude::*;

#[derive(Parser)]
#[command(name = "harmonizer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Migrate PostgreSQL and Spark SQL queries to DuneSQL", long_about = None)]
#[command(after_help = "EXAMPLES:
    harmonizer --chain ethereum \"SELECT * FROM dex.trades\"
    harmonizer --from spark --file query.sql
    harmonizer --chain ethereum --table erc20.tokens=tokens.erc20 < query.sql")]
struct Cli {
    /// Query text; read from --file or stdin when absent
    query: Option<String>,

    /// Engine the query was written for
    #[arg(long, value_enum, default_value = "postgres")]
    from: CliSource,

    /// Dataset for Postgres table migration
    #[arg(long, env = "HARMONIZER_CHAIN")]
    chain: Option<String>,

    /// Translate syntax only, keep table names
    #[arg(long)]
    syntax_only: bool,

    /// JSON schema with column types
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Extra table rename, as old=new
    #[arg(long = "table", value_parser = parse_rename)]
    tables: Vec<(String, String)>,

    /// Single-line output
    #[arg(long)]
    compact: bool,

    /// Read the query from a file
    #[arg(short, long, conflicts_with = "query")]
    file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliSource {
    Postgres,
    Spark,
}

impl From<CliSource> for SourceDialect {
    fn from(val: CliSource) -> Self {
        match val {
            CliSource::Postgres => SourceDialect::Postgres,
            CliSource::Spark => SourceDialect::Spark,
        }
    }
}

fn parse_rename(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() => {
            Ok((from.trim().to_string(), to.trim().to_string()))
        }
        _ => Err(format!("expected old=new, got '{}'", arg)),
    }
}

fn read_query(cli: &Cli) -> Result<String> {
    if let Some(query) = &cli.query {
        return Ok(query.clone());
    }
    if let Some(path) = &cli.file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()));
    }
    let mut query = String::new();
    std::io::stdin()
        .read_to_string(&mut query)
        .context("reading stdin")?;
    if query.trim().is_empty() {
        bail!("no query given");
    }
    Ok(query)
}

fn options(cli: &Cli, config: Config) -> Result<Translation> {
    let mut options = Translation::new(cli.from.into())
        .syntax_only(cli.syntax_only)
        .pretty(!cli.compact);
    if let Some(chain) = cli.chain.clone().or(config.chain) {
        options = options.chain(chain);
    }
    if let Some(path) = cli.schema.clone().or(config.schema) {
        let schema = Schema::from_path(&path)
            .with_context(|| format!("loading schema {}", path.display()))?;
        options = options.schema(schema);
    }
    // Config renames are ignored outside Postgres dataset migration.
    if matches!(options.source, SourceDialect::Postgres) && !options.syntax_only {
        options.table_overrides.extend(config.tables);
    }
    for (from, to) in &cli.tables {
        options = options.table(from, to);
    }
    Ok(options)
}

fn run(cli: &Cli) -> Result<()> {
    let config = Config::load().context("loading config")?;
    let options = options(cli, config)?;
    let query = read_query(cli)?;
    let sql = translate(&query, &options)?;
    println!("{}", sql);
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let default = if cli.verbose { "harmonizer=debug" } else { "harmonizer=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
