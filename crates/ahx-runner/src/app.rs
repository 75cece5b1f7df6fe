//! Process wiring shared by the subcommands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ahx_api::{ApiState, ListenerSet, handlers};
use ahx_collect::collector::IngestSink;
use ahx_collect::realms::{discover_realms, load_status_over_bus};
use ahx_collect::{AccessTokenSource, BlizzardClient, ClientCredentials, Collector, ReqwestDownloader, Ticker};
use ahx_core::bus::{LocalBus, Messenger, NatsBus, subjects};
use ahx_core::config::{AppConfig, IngestMode, load_config};
use ahx_core::time_util::{now_unix, retention_cutoff};
use ahx_core::types::{RealmKey, RegionTable, StatusTable};
use ahx_store::{BlobBackend, BlobStore, ItemsStore, LiveAuctionsStore, PricelistHistoryStore};
use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use crate::{Cli, Command};

pub struct App {
    config: Arc<AppConfig>,
    cache_dir: PathBuf,
    regions: Arc<RegionTable>,
    status: Arc<StatusTable>,
    blobs: Arc<BlobStore>,
    bus: Arc<dyn Messenger>,
    client: Arc<BlizzardClient>,
    tokens: Arc<dyn AccessTokenSource>,
}

impl App {
    /// Load config, apply CLI overrides, connect the bus and open the blob store.
    pub async fn init(cli: &Cli) -> Result<Self> {
        let mut config =
            load_config(&cli.config).with_context(|| format!("loading config {}", cli.config.display()))?;
        if let Some(id) = &cli.client_id {
            config.client_id = id.clone();
        }
        if let Some(secret) = &cli.client_secret {
            config.client_secret = secret.clone();
        }

        let cache_dir = cli
            .cache_dir
            .clone()
            .or_else(|| config.cache_dir.clone())
            .context("--cache-dir is required")?;
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("creating cache dir {}", cache_dir.display()))?;
        info!("config loaded, {} region(s), cache_dir={}", config.regions.len(), cache_dir.display());

        let backend = if cli.command == Command::ApiTest {
            BlobBackend::Memory
        } else if config.use_gcloud {
            BlobBackend::Gcs { project_id: cli.project_id.clone() }
        } else {
            BlobBackend::Local(cache_dir.join("blobs"))
        };
        info!("blob backend: {backend:?}");

        let bus: Arc<dyn Messenger> = match &cli.nats_host {
            Some(host) => Arc::new(NatsBus::connect(host, cli.nats_port).await?),
            None => {
                info!("NATS_HOST unset, using the in-process bus");
                Arc::new(LocalBus::new())
            }
        };

        let downloader = Arc::new(ReqwestDownloader::new()?);
        let tokens = Arc::new(ClientCredentials::new(
            downloader.client().clone(),
            &config.oauth_url,
            &config.client_id,
            &config.client_secret,
        ));
        let client = Arc::new(BlizzardClient::new(downloader, &config.api_scheme));

        Ok(Self {
            regions: Arc::new(RegionTable::new(config.regions.clone())),
            config: Arc::new(config),
            cache_dir,
            status: Arc::new(StatusTable::new()),
            blobs: Arc::new(BlobStore::new(backend)),
            bus,
            client,
            tokens,
        })
    }

    // -----------------------------------------------------------------------
    // Subcommands
    // -----------------------------------------------------------------------

    /// `api` and `api-test`.
    pub async fn run_api(&self, test_mode: bool) -> Result<()> {
        let item_classes = match self.discover().await {
            Ok(classes) => classes,
            Err(e) if test_mode => {
                warn!("realm discovery failed, serving an empty status table: {e:#}");
                serde_json::Value::Null
            }
            Err(e) => return Err(e),
        };

        let items = Arc::new(ItemsStore::open(&self.cache_dir)?);
        let mut state = self.state().with_items(Arc::clone(&items)).with_item_classes(item_classes);

        let local = test_mode || self.config.ingest == IngestMode::Local;
        let stores = if local {
            let live = self.open_live()?;
            let history = self.open_history()?;
            state = state.with_live(Arc::clone(&live)).with_history(Arc::clone(&history));
            Some((live, history))
        } else {
            None
        };

        let state = Arc::new(state);
        let mut table = handlers::core_handlers(&state);
        if stores.is_some() {
            table.extend(handlers::live_auction_handlers(&state));
            table.extend(handlers::history_handlers(&state));
        }
        if test_mode {
            table.extend(handlers::test_handlers(&state));
        }
        let listeners = ListenerSet::start(Arc::clone(&self.bus), table).await?;

        let mut tickers = Vec::new();
        if !test_mode {
            let sink = match &stores {
                Some((live, history)) => IngestSink::Local { live: Arc::clone(live), history: Arc::clone(history) },
                None => IngestSink::Distributed,
            };
            let collector = self.collector(items, sink);
            tickers.push(Ticker::spawn(
                "collector",
                Duration::from_secs(self.config.collect_interval_secs),
                move || collector.run_once(),
            ));
            if let Some((_, history)) = &stores {
                tickers.push(self.pruner(Arc::clone(history)));
            }
        }

        serve_until_ctrl_c(listeners, tickers).await
    }

    pub async fn run_live_auctions(&self) -> Result<()> {
        load_status_over_bus(&*self.bus, &self.regions, &self.status).await?;
        let live = self.open_live()?;
        let state = Arc::new(self.state().with_live(live));

        let mut table = handlers::live_auction_handlers(&state);
        table.extend(handlers::intake_handlers(&state, subjects::LIVE_AUCTIONS_INTAKE));
        let listeners = ListenerSet::start(Arc::clone(&self.bus), table).await?;
        serve_until_ctrl_c(listeners, Vec::new()).await
    }

    pub async fn run_pricelist_histories(&self) -> Result<()> {
        load_status_over_bus(&*self.bus, &self.regions, &self.status).await?;
        let history = self.open_history()?;
        let state = Arc::new(self.state().with_history(Arc::clone(&history)));

        let mut table = handlers::history_handlers(&state);
        table.extend(handlers::intake_handlers(&state, subjects::PRICELIST_HISTORIES_INTAKE));
        let listeners = ListenerSet::start(Arc::clone(&self.bus), table).await?;
        serve_until_ctrl_c(listeners, vec![self.pruner(history)]).await
    }

    pub async fn run_sync_items(&self) -> Result<()> {
        self.discover().await?;
        let live = self.open_live()?;
        let items = Arc::new(ItemsStore::open(&self.cache_dir)?);
        let collector = self.collector(items, IngestSink::Distributed);

        let (new_items, new_icons) =
            tokio::task::spawn_blocking(move || collector.sync_all_items(&live)).await.context("item sync task")??;
        info!("sync-items done, {new_items} new items, {new_icons} new icons");
        Ok(())
    }

    pub async fn run_prune_store(&self) -> Result<()> {
        let now = now_unix();
        let weeks = self.config.pricelist_history_retention_weeks;

        let history = PricelistHistoryStore::open(&self.cache_dir, weeks)?;
        let shards = history.prune(now)?;
        let raw = self.blobs.prune_raw_auctions(retention_cutoff(now, weeks)).await?;
        info!("prune-store done, {} history shards and {raw} raw snapshots removed", shards.len());
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Discover realms upstream and fetch the item class tree for `boot`.
    async fn discover(&self) -> Result<serde_json::Value> {
        let token = self.tokens.token().await.context("refreshing access token")?;
        discover_realms(&self.config, &self.regions, &self.client, &token, &self.blobs, &self.status).await?;

        let primary = self.regions.primary().context("no primary region")?;
        match self.client.fetch_item_classes(primary, &token).await {
            Ok(classes) => Ok(classes),
            Err(e) => {
                warn!("item classes unavailable: {e}");
                Ok(serde_json::Value::Null)
            }
        }
    }

    fn state(&self) -> ApiState {
        ApiState::new(
            Arc::clone(&self.config),
            Arc::clone(&self.regions),
            Arc::clone(&self.status),
            Arc::clone(&self.blobs),
        )
    }

    fn whitelisted_realms(&self) -> Vec<RealmKey> {
        self.status
            .all_realms()
            .into_iter()
            .filter(|r| self.config.is_whitelisted(&r.region_name, &r.slug))
            .map(|r| r.key())
            .collect()
    }

    fn open_live(&self) -> Result<Arc<LiveAuctionsStore>> {
        let live = LiveAuctionsStore::new(&self.cache_dir);
        live.open_realms(&self.whitelisted_realms())?;
        Ok(Arc::new(live))
    }

    fn open_history(&self) -> Result<Arc<PricelistHistoryStore>> {
        Ok(Arc::new(PricelistHistoryStore::open(&self.cache_dir, self.config.pricelist_history_retention_weeks)?))
    }

    fn collector(&self, items: Arc<ItemsStore>, sink: IngestSink) -> Collector {
        Collector {
            config: Arc::clone(&self.config),
            regions: Arc::clone(&self.regions),
            status: Arc::clone(&self.status),
            client: Arc::clone(&self.client),
            tokens: Arc::clone(&self.tokens),
            blobs: Arc::clone(&self.blobs),
            items,
            sink,
            bus: Arc::clone(&self.bus),
            rt: Handle::current(),
        }
    }

    fn pruner(&self, history: Arc<PricelistHistoryStore>) -> Ticker {
        Ticker::spawn("pruner", Duration::from_secs(self.config.prune_interval_secs), move || {
            match history.prune(now_unix()) {
                Ok(removed) if !removed.is_empty() => info!("[pruner] removed {} history shards", removed.len()),
                Ok(_) => {}
                Err(e) => error!("[pruner] prune failed: {e}"),
            }
        })
    }
}

async fn serve_until_ctrl_c(mut listeners: ListenerSet, tickers: Vec<Ticker>) -> Result<()> {
    info!(
        "{} subjects served, {} tickers running, press Ctrl+C to stop",
        listeners.len(),
        tickers.len()
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    for ticker in tickers {
        ticker.stop().await;
    }
    listeners.stop().await;

    info!("all listeners stopped, goodbye");
    Ok(())
}
