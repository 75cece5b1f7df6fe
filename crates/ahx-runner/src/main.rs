//! # ahx
//!
//! Entry point for every process of the auction-house pipeline.
//!
//! Loads the JSON configuration, connects the messaging bus and the blob
//! store, then runs one of the subcommands until Ctrl+C or completion.
//!
//! # Usage
//!
//! ```bash
//! ahx --config config.json --cache-dir /var/cache/ahx api
//! NATS_HOST=nats ahx --config config.json --cache-dir /var/cache/ahx live-auctions
//! ahx --config config.json --cache-dir /var/cache/ahx prune-store
//! ```

mod app;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

/// Auction-house collector and query processes.
#[derive(Parser)]
#[command(name = "ahx", about = "Auction-house collector and query processes")]
struct Cli {
    /// Configuration file path (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Root directory for embedded databases and local blobs.
    #[arg(long, env = "CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,

    /// NATS host; the in-process bus is used when unset.
    #[arg(long, env = "NATS_HOST")]
    nats_host: Option<String>,

    #[arg(long, env = "NATS_PORT", default_value_t = 4222)]
    nats_port: u16,

    #[arg(long, env = "CLIENT_ID")]
    client_id: Option<String>,

    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// GCS project; prefixes bucket names.
    #[arg(long, env = "PROJECT_ID")]
    project_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Query surface plus the periodic collector.
    Api,
    /// Query surface and test subjects, without the collector.
    ApiTest,
    /// Fetch every item seen in live auctions, then missing icons.
    SyncItems,
    /// Serve live-auction queries and ingest `liveAuctionsIntake`.
    LiveAuctions,
    /// Serve price history queries and ingest `pricelistHistoriesIntake`.
    PricelistHistories,
    /// Delete history shards and raw snapshots past retention.
    PruneStore,
}

impl Command {
    fn name(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::ApiTest => "api-test",
            Self::SyncItems => "sync-items",
            Self::LiveAuctions => "live-auctions",
            Self::PricelistHistories => "pricelist-histories",
            Self::PruneStore => "prune-store",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize logging
    ahx_core::logging::init_logging(&cli.log_level, cli.log_dir.as_deref(), cli.command.name(), cli.log_json);

    info!(
        "ahx {} starting, config={}, log_level={}",
        cli.command.name(),
        cli.config.display(),
        cli.log_level
    );

    // 2. Load configuration and wire shared services
    let app = app::App::init(&cli).await?;

    // 3. Run the subcommand
    match cli.command {
        Command::Api => app.run_api(false).await,
        Command::ApiTest => app.run_api(true).await,
        Command::SyncItems => app.run_sync_items().await,
        Command::LiveAuctions => app.run_live_auctions().await,
        Command::PricelistHistories => app.run_pricelist_histories().await,
        Command::PruneStore => app.run_prune_store().await,
    }
}
