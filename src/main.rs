use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use sheetkpi::{
    connector::http_client, ConfigResolver, FileStore, SheetCache, SheetsConnector,
};
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Financial KPIs and tables from a spreadsheet, printed as JSON.
#[derive(Parser, Debug)]
#[command(name = "sheetkpi", version, about)]
struct Cli {
    /// Persistent cache file
    #[arg(long, env = "SHEETS_CACHE_FILE", default_value = ".sheets-cache.json")]
    cache_file: PathBuf,

    /// Flat JSON object of configuration values, used when the environment
    /// does not set them
    #[arg(long)]
    config: Option<PathBuf>,

    /// Session cookie forwarded to the backend proxy
    #[arg(long, env = "SHEETS_SESSION_COOKIE")]
    session_cookie: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Per-year financial series for the configured source
    Dataset {
        #[arg(long)]
        force: bool,
        /// Include per-year totals (rent excluded)
        #[arg(long)]
        totals: bool,
    },
    /// A range as header, normalized header and rows
    Table {
        range: String,
        #[arg(long)]
        force: bool,
    },
    /// Drop cached entries: everything, or one table range
    Clear {
        #[arg(long)]
        range: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // ─── 2) resolve configuration ────────────────────────────────────
    let mut resolver = ConfigResolver::from_env();
    if let Some(path) = &cli.config {
        let injected = ConfigResolver::load_injected(path)?;
        info!(path = %path.display(), keys = injected.len(), "loaded injected config");
        resolver = resolver.with_injected(injected);
    }

    // ─── 3) cache store & client ─────────────────────────────────────
    let store = FileStore::open(&cli.cache_file)
        .with_context(|| format!("opening cache file {}", cli.cache_file.display()))?;
    let cache = SheetCache::with_system_clock(Arc::new(store));
    let client = http_client().context("building HTTP client")?;
    let mut connector = SheetsConnector::new(resolver, cache, client);
    if let Some(cookie) = cli.session_cookie {
        connector = connector.with_session_cookie(cookie);
    }
    let cfg = connector.config();
    info!(mode = ?cfg.mode, ttl_ms = cfg.cache_ttl_ms, "connector ready");

    // ─── 4) run command ──────────────────────────────────────────────
    let out = match cli.command {
        Command::Dataset { force, totals } => {
            let data = connector
                .load_dataset(force)
                .await
                .context("loading dataset")?;
            if totals {
                let totals = data.totals();
                let mut value = serde_json::to_value(&data)?;
                value["totals"] = json!(totals);
                value
            } else {
                serde_json::to_value(&data)?
            }
        }
        Command::Table { range, force } => {
            let table = connector
                .load_table(&range, force)
                .await
                .with_context(|| format!("loading table {range}"))?;
            serde_json::to_value(&table)?
        }
        Command::Clear { range: Some(range) } => {
            connector.clear_table(&range);
            json!({ "cleared": range })
        }
        Command::Clear { range: None } => {
            let removed = connector.clear_all();
            json!({ "cleared": removed })
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
