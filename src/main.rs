use anyhow::Context;
use clap::{Parser, Subcommand};
use georss_loader::config::Config;
use georss_loader::db::SqliteStore;
use georss_loader::destination::TableRef;
use georss_loader::infra::http_client::ReqwestFetcher;
use georss_loader::pipeline::{Loader, Pipeline};
use georss_loader::run_lock::RunLock;
use georss_loader::{logging, parser};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "georss_loader")]
#[command(about = "Loads a GeoRSS incident feed into a spatial table")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the feed and replace the destination table contents (default)
    Run,
    /// Fetch and sanitize the feed into the local file only
    Fetch,
    /// Load the local feed file into the destination without fetching
    Load {
        /// Feed file to load instead of the configured local path
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Print the records parsed from the local feed file as JSON lines
    Show {
        #[arg(long)]
        source: Option<PathBuf>,
    },
}

impl Commands {
    /// Only runs that write the table replace the previous run's log.
    fn starts_fresh_log(&self) -> bool {
        matches!(self, Commands::Run | Commands::Load { .. })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let command = cli.command.unwrap_or(Commands::Run);
    let _guard = logging::init_logging(&config.log_path, command.starts_fresh_log())
        .with_context(|| format!("opening log file {}", config.log_path.display()))?;

    let result = match command {
        Commands::Run => run(&config).await,
        Commands::Fetch => fetch(&config).await,
        Commands::Load { source } => load(&config, source),
        Commands::Show { source } => show(&config, source),
    };

    if let Err(e) = &result {
        error!("Run failed: {:#}", e);
    }
    result
}

async fn run(config: &Config) -> anyhow::Result<()> {
    let fetcher = ReqwestFetcher::new(config.request_timeout())?;
    let destination = TableRef::parse(&config.destination_table)?;
    let store = SqliteStore::open(destination.database_path())?;

    let report = Pipeline::run(config, &fetcher, &store).await?;
    info!(
        run_token = %report.run_token,
        records = report.load.records,
        skipped = report.load.skipped,
        "Run complete"
    );
    Ok(())
}

async fn fetch(config: &Config) -> anyhow::Result<()> {
    let fetcher = ReqwestFetcher::new(config.request_timeout())?;
    let fetched = Pipeline::fetch(config, &fetcher).await?;
    println!(
        "{} (HTTP {}, {} bytes, sha256 {})",
        fetched.path.display(),
        fetched.status,
        fetched.bytes,
        fetched.sha256
    );
    Ok(())
}

fn load(config: &Config, source: Option<PathBuf>) -> anyhow::Result<()> {
    let source = source.unwrap_or_else(|| config.local_feed_path.clone());
    let destination = TableRef::parse(&config.destination_table)?;
    let _lock = RunLock::acquire(&config.lock_path, config.lock_stale_after()?)?;
    let store = SqliteStore::open(destination.database_path())?;

    let summary = Loader::from_config(&store, config).load(&source, &destination)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn show(config: &Config, source: Option<PathBuf>) -> anyhow::Result<()> {
    let source = source.unwrap_or_else(|| config.local_feed_path.clone());
    let text = parser::read_feed_file(&source)?;
    let doc = parser::parse_document(&text)?;
    let mut records = parser::records(&doc);
    for record in records.by_ref() {
        println!("{}", serde_json::to_string(&record)?);
    }
    info!(skipped = records.skipped(), "Listed records from {}", source.display());
    Ok(())
}
