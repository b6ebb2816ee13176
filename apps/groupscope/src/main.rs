use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use groupscope_clickhouse::ClickHouseClient;
use groupscope_config::AppConfig;
use groupscope_events::{Backend, EventsQuery, GroupEventsEngine, MemoryRowStore, TimeRange};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "groupscope", about = "Query the events of a single issue group")]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// List matching events of a group, newest first.
    Query(QueryArgs),
    /// Check that the analytical store answers.
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Primary,
    Analytical,
}

impl From<BackendArg> for Backend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Primary => Backend::Primary,
            BackendArg::Analytical => Backend::Analytical,
        }
    }
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// JSON row snapshot holding groups, environments and events.
    #[arg(long, value_name = "FILE")]
    snapshot: PathBuf,
    #[arg(long)]
    group: u64,
    /// Search query, e.g. `foo:bar hello`.
    #[arg(long)]
    query: Option<String>,
    #[arg(long)]
    event_id: Option<String>,
    #[arg(long)]
    environment: Option<String>,
    #[arg(long, value_name = "PERIOD")]
    stats_period: Option<String>,
    #[arg(long)]
    start: Option<DateTime<Utc>>,
    #[arg(long)]
    end: Option<DateTime<Utc>>,
    #[arg(long)]
    limit: Option<u16>,
    #[arg(long, default_value_t = false)]
    force_analytical: bool,
    /// Turn on the deployment-wide analytical toggle for this run.
    #[arg(long, default_value_t = false)]
    analytical_enabled: bool,
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,
}

impl QueryArgs {
    fn to_request(&self) -> EventsQuery {
        EventsQuery {
            group_id: self.group,
            query: self.query.clone(),
            event_id: self.event_id.clone(),
            environment: self.environment.clone(),
            time_range: TimeRange {
                start: self.start,
                end: self.end,
                period: self.stats_period.clone(),
            },
            force_analytical: self.force_analytical,
            backend_override: self.backend.map(Backend::from),
            limit: self.limit,
        }
    }
}

fn load_cfg(raw_path: Option<PathBuf>) -> Result<AppConfig> {
    let path = groupscope_config::resolve_config_path(raw_path);
    if !path.exists() {
        info!(path = %path.display(), "no config file found, using defaults");
        return Ok(AppConfig::default());
    }
    groupscope_config::load_config(&path)
        .with_context(|| format!("failed to load config {}", path.display()))
}

async fn cmd_query(cfg: &AppConfig, args: &QueryArgs) -> Result<()> {
    let rows = MemoryRowStore::load_snapshot(&args.snapshot)?;
    let engine = GroupEventsEngine::from_config(cfg, Arc::new(rows))?;
    if args.analytical_enabled {
        engine.options().set_analytical_enabled(true);
    }

    let events = engine.query_events(args.to_request()).await?;
    println!("{}", serde_json::to_string_pretty(&events)?);
    Ok(())
}

async fn cmd_ping(cfg: &AppConfig) -> Result<()> {
    let client = ClickHouseClient::new(cfg.clickhouse.clone())?;
    client
        .ping()
        .await
        .with_context(|| format!("clickhouse at {} is unreachable", cfg.clickhouse.url))?;
    let version = client.version().await?;
    println!("ok: clickhouse {version} at {}", cfg.clickhouse.url);
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_cfg(cli.config.clone())?;

    match &cli.command {
        CliCommand::Query(args) => cmd_query(&cfg, args).await,
        CliCommand::Ping => cmd_ping(&cfg).await,
    }
}
