//! Collector: one iteration of the ingestion pipeline.
//!
//! ```text
//! realms ─► [fetch ×4] ─Fetched─► [store ×4] ─Stored─► collect()
//!                                    │
//!                                    ├─ raw snapshot blob
//!                                    └─ local:       live auctions + price history
//!                                       distributed: intake message (after the loop)
//!
//! observed item ids ─► [items ×8] ─► ItemsStore + item blobs
//! missing icons     ─► [icons ×8] ─► icon blobs ─► icon_url, one persist
//! ```
//!
//! Every stage is a [`work`] pool over unbuffered crossbeam channels; a
//! stage's post-work hook drops its output sender so the next stage sees
//! end-of-stream. A realm appears once per iteration, so exactly one store
//! worker writes its files.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use ahx_core::bus::{Messenger, subjects};
use ahx_core::config::{AppConfig, IngestMode};
use ahx_core::types::{
    AuctionsResponse, IntakeRequest, Item, ItemId, Realm, RealmKey, Region, RegionTable, StatusTable,
};
use ahx_core::work;
use ahx_store::ingest::{ingest_live_auctions, ingest_pricelist_history};
use ahx_store::{BlobStore, ItemsStore, LiveAuctionsStore, PricelistHistoryStore};
use anyhow::{Context, Result};
use crossbeam_channel::bounded;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::error::FetchError;
use crate::upstream::auth::AccessTokenSource;
use crate::upstream::{AuctionsFetch, BlizzardClient};

pub const FETCH_WORKERS: usize = 4;
pub const STORE_WORKERS: usize = 4;
pub const ITEM_WORKERS: usize = 8;
pub const ICON_WORKERS: usize = 8;

/// Where derived views are written.
#[derive(Clone)]
pub enum IngestSink {
    Local { live: Arc<LiveAuctionsStore>, history: Arc<PricelistHistoryStore> },
    /// Derived views are written by intake processes.
    Distributed,
}

impl IngestSink {
    pub fn mode(&self) -> IngestMode {
        match self {
            Self::Local { .. } => IngestMode::Local,
            Self::Distributed => IngestMode::Distributed,
        }
    }
}

/// Per-iteration metrics, logged and published on `appMetrics`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectMetrics {
    pub duration_ms: u64,
    pub realms_total: usize,
    pub realms_included: usize,
    pub realms_excluded: usize,
    pub realms_updated: usize,
    pub new_items: usize,
    pub new_icons: usize,
}

struct Fetched {
    realm: RealmKey,
    target_time: i64,
    snapshot: AuctionsResponse,
}

struct Stored {
    realm: RealmKey,
    target_time: i64,
    item_ids: BTreeSet<ItemId>,
}

struct IconResolved {
    icon: String,
    url: String,
    item_ids: Vec<ItemId>,
    downloaded: bool,
}

/// Cheap to clone; pool workers each hold a clone.
#[derive(Clone)]
pub struct Collector {
    pub config: Arc<AppConfig>,
    pub regions: Arc<RegionTable>,
    pub status: Arc<StatusTable>,
    pub client: Arc<BlizzardClient>,
    pub tokens: Arc<dyn AccessTokenSource>,
    pub blobs: Arc<BlobStore>,
    pub items: Arc<ItemsStore>,
    pub sink: IngestSink,
    pub bus: Arc<dyn Messenger>,
    /// Runtime used to drive async I/O from pool threads.
    pub rt: Handle,
}

impl Collector {
    /// Run one full iteration. Blocking; call from a non-async thread.
    pub fn collect(&self) -> Result<CollectMetrics> {
        let started = Instant::now();
        let token = self.rt.block_on(self.tokens.token()).context("refreshing access token")?;

        let mut metrics = CollectMetrics::default();
        let mut intake = IntakeRequest::default();

        for region in self.regions.iter() {
            let realms = self.status.realms(&region.name).unwrap_or_default();
            let total = realms.len();
            let included: Vec<Realm> = realms
                .into_iter()
                .filter(|r| self.config.is_whitelisted(&r.region_name, &r.slug))
                .collect();
            metrics.realms_total += total;
            metrics.realms_included += included.len();
            metrics.realms_excluded += total - included.len();

            let stored = match self.ingest_region(region, included, &token) {
                Ok(stored) => stored,
                Err(e) => {
                    error!(region = %region.name, "[collector] snapshot pipeline did not start: {e}");
                    Vec::new()
                }
            };

            let mut item_ids = BTreeSet::new();
            for s in stored {
                if self.status.advance_last_downloaded(&s.realm, s.target_time) {
                    metrics.realms_updated += 1;
                }
                intake.insert(&s.realm.region, &s.realm.slug, s.target_time);
                item_ids.extend(s.item_ids);
            }

            match self.sync_items(item_ids, &token) {
                Ok(n) => metrics.new_items += n,
                Err(e) => error!(region = %region.name, "[collector] item sync failed: {e:#}"),
            }
        }

        if self.sink.mode() == IngestMode::Distributed && !intake.is_empty() {
            self.publish_intake(&intake);
        }

        match self.sync_icons() {
            Ok(n) => metrics.new_icons = n,
            Err(e) => error!("[collector] icon sync failed: {e:#}"),
        }

        metrics.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            duration_ms = metrics.duration_ms,
            realms_total = metrics.realms_total,
            realms_included = metrics.realms_included,
            realms_excluded = metrics.realms_excluded,
            realms_updated = metrics.realms_updated,
            new_items = metrics.new_items,
            new_icons = metrics.new_icons,
            "[collector] iteration complete"
        );
        self.publish_metrics(&metrics);
        Ok(metrics)
    }

    /// Ticker entry point: one iteration, failures logged.
    pub fn run_once(&self) {
        if let Err(e) = self.collect() {
            warn!("[collector] iteration skipped: {e:#}");
        }
    }

    // -----------------------------------------------------------------------
    // Snapshot pipeline
    // -----------------------------------------------------------------------

    fn ingest_region(&self, region: &Region, realms: Vec<Realm>, token: &str) -> std::io::Result<Vec<Stored>> {
        if realms.is_empty() {
            return Ok(Vec::new());
        }

        let (job_tx, job_rx) = bounded::<Realm>(0);
        let (fetched_tx, fetched_rx) = bounded::<Fetched>(0);
        let (stored_tx, stored_rx) = bounded::<Stored>(0);

        let fetch_pool = {
            let this = self.clone();
            let region = region.clone();
            let token = token.to_string();
            let out = fetched_tx.clone();
            work::spawn_named(
                "fetch",
                FETCH_WORKERS,
                move || {
                    while let Ok(realm) = job_rx.recv() {
                        match this.fetch_realm(&region, &realm, &token) {
                            Ok(Some(fetched)) => {
                                if out.send(fetched).is_err() {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => warn!(region = %region.name, realm = %realm.slug, "[collector] fetch failed: {e}"),
                        }
                    }
                },
                move || drop(fetched_tx),
            )?
        };

        let store_pool = {
            let this = self.clone();
            let out = stored_tx.clone();
            work::spawn_named(
                "store",
                STORE_WORKERS,
                move || {
                    while let Ok(fetched) = fetched_rx.recv() {
                        let key = fetched.realm.clone();
                        match this.store_snapshot(fetched) {
                            Ok(stored) => {
                                if out.send(stored).is_err() {
                                    break;
                                }
                            }
                            Err(e) => error!(region = %key.region, realm = %key.slug, "[collector] store failed: {e}"),
                        }
                    }
                },
                move || drop(stored_tx),
            )?
        };

        let feeder = std::thread::spawn(move || {
            for realm in realms {
                if job_tx.send(realm).is_err() {
                    break;
                }
            }
        });

        let stored: Vec<Stored> = stored_rx.iter().collect();
        if feeder.join().is_err() {
            error!("[collector] realm feeder panicked");
        }
        fetch_pool.join();
        store_pool.join();

        info!("[collector] {}: {} fresh snapshots stored", region.name, stored.len());
        Ok(stored)
    }

    fn fetch_realm(&self, region: &Region, realm: &Realm, token: &str) -> Result<Option<Fetched>, FetchError> {
        match self.rt.block_on(self.client.fetch_auctions(region, realm, token))? {
            AuctionsFetch::Unchanged => Ok(None),
            AuctionsFetch::Fresh { target_time, snapshot } => {
                debug!(
                    region = %region.name,
                    realm = %realm.slug,
                    "[collector] {} auctions at {target_time}",
                    snapshot.auctions.len()
                );
                Ok(Some(Fetched { realm: realm.key(), target_time, snapshot }))
            }
        }
    }

    fn store_snapshot(&self, fetched: Fetched) -> Result<Stored, FetchError> {
        let Fetched { realm, target_time, snapshot } = fetched;
        self.rt.block_on(self.blobs.write_raw_auctions(&realm, target_time, &snapshot))?;

        let item_ids = match &self.sink {
            IngestSink::Local { live, history } => {
                let minis = ingest_live_auctions(live, &realm, &snapshot)?;
                ingest_pricelist_history(history, &realm, target_time, &minis)?;
                minis.item_ids().into_iter().collect()
            }
            IngestSink::Distributed => snapshot.auctions.iter().map(|a| a.item).collect(),
        };

        Ok(Stored { realm, target_time, item_ids })
    }

    fn publish_intake(&self, intake: &IntakeRequest) {
        let payload = match serde_json::to_vec(intake) {
            Ok(p) => p,
            Err(e) => {
                error!("[collector] intake encode failed: {e}");
                return;
            }
        };
        for subject in [subjects::LIVE_AUCTIONS_INTAKE, subjects::PRICELIST_HISTORIES_INTAKE] {
            if let Err(e) = self.rt.block_on(self.bus.publish(subject, payload.clone())) {
                error!("[collector] publish {subject} failed: {e}");
            }
        }
    }

    fn publish_metrics(&self, metrics: &CollectMetrics) {
        match serde_json::to_vec(metrics) {
            Ok(payload) => {
                if let Err(e) = self.rt.block_on(self.bus.publish(subjects::APP_METRICS, payload)) {
                    warn!("[collector] metrics publish failed: {e}");
                }
            }
            Err(e) => warn!("[collector] metrics encode failed: {e}"),
        }
    }

    // -----------------------------------------------------------------------
    // Items and icons
    // -----------------------------------------------------------------------

    /// Fetch and persist every id not blacklisted and not yet in the catalog.
    /// Returns the number of new items.
    pub fn sync_items(&self, ids: impl IntoIterator<Item = ItemId>, token: &str) -> Result<usize> {
        let blacklist = self.config.blacklist();
        let candidates: Vec<ItemId> = ids.into_iter().filter(|id| !blacklist.contains(id)).collect();
        let missing = self.items.missing(&candidates)?;
        if missing.is_empty() {
            return Ok(0);
        }

        let primary = self.regions.primary().cloned().context("no primary region")?;
        info!("[collector] fetching {} new items from {}", missing.len(), primary.name);

        let this = self.clone();
        let token = token.to_string();
        let fetched: Vec<Item> = run_pool("items", ITEM_WORKERS, missing, move |id| {
            match this.rt.block_on(this.client.fetch_item(&primary, id, &token)) {
                Ok(upstream) => {
                    let item = Item::from(upstream);
                    if let Err(e) = this.rt.block_on(this.blobs.write_item(&item)) {
                        warn!("[collector] item blob {id} failed: {e}");
                    }
                    Some(item)
                }
                Err(e) => {
                    warn!("[collector] item {id} fetch failed: {e}");
                    None
                }
            }
        })?;

        Ok(self.items.persist(fetched.iter())?)
    }

    /// Resolve every icon key lacking a URL; write-if-absent into the icon
    /// bucket, then persist all touched items once. Returns icons downloaded.
    pub fn sync_icons(&self) -> Result<usize> {
        let groups: Vec<(String, Vec<ItemId>)> = self.items.missing_icons()?.into_iter().collect();
        if groups.is_empty() {
            return Ok(0);
        }

        let this = self.clone();
        let resolved: Vec<IconResolved> = run_pool("icons", ICON_WORKERS, groups, move |(icon, item_ids)| {
            match this.resolve_icon(&icon) {
                Ok((url, downloaded)) => Some(IconResolved { icon, url, item_ids, downloaded }),
                Err(e) => {
                    warn!("[collector] icon {icon} failed: {e}");
                    None
                }
            }
        })?;

        let downloaded = resolved.iter().filter(|r| r.downloaded).count();
        let urls: BTreeMap<String, (String, Vec<ItemId>)> =
            resolved.into_iter().map(|r| (r.icon, (r.url, r.item_ids))).collect();
        let updated = self.items.set_icon_urls(&urls)?;
        info!("[collector] icons: {} resolved, {downloaded} downloaded, {updated} items updated", urls.len());
        Ok(downloaded)
    }

    fn resolve_icon(&self, icon: &str) -> Result<(String, bool), FetchError> {
        if self.rt.block_on(self.blobs.icon_exists(icon))? {
            return Ok((self.blobs.icon_url(icon)?, false));
        }
        let jpeg = self.rt.block_on(self.client.fetch_raw(&self.config.icon_url(icon)))?;
        let url = self.rt.block_on(self.blobs.write_icon(icon, jpeg))?;
        Ok((url, true))
    }

    /// One-shot: fetch items observed in any live-auctions store, then icons.
    pub fn sync_all_items(&self, live: &LiveAuctionsStore) -> Result<(usize, usize)> {
        let token = self.rt.block_on(self.tokens.token()).context("refreshing access token")?;

        let mut ids = BTreeSet::new();
        for realm in live.realms() {
            match live.get_stats(&realm) {
                Ok(stats) => ids.extend(stats.item_ids),
                Err(e) => warn!(region = %realm.region, realm = %realm.slug, "[collector] stats failed: {e}"),
            }
        }
        info!("[collector] {} distinct item ids across live auctions", ids.len());

        let new_items = self.sync_items(ids, &token)?;
        let new_icons = self.sync_icons()?;
        Ok((new_items, new_icons))
    }
}

/// Feed `inputs` through `n` workers applying `f`; collect the `Some`s.
fn run_pool<I, O, F>(label: &str, n: usize, inputs: Vec<I>, f: F) -> std::io::Result<Vec<O>>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Option<O> + Send + Sync + 'static,
{
    let (in_tx, in_rx) = bounded::<I>(0);
    let (out_tx, out_rx) = bounded::<O>(0);

    let worker_out = out_tx.clone();
    let pool = work::spawn_named(
        label,
        n,
        move || {
            while let Ok(input) = in_rx.recv() {
                if let Some(output) = f(input) {
                    if worker_out.send(output).is_err() {
                        break;
                    }
                }
            }
        },
        move || drop(out_tx),
    )?;

    let feeder = std::thread::spawn(move || {
        for input in inputs {
            if in_tx.send(input).is_err() {
                break;
            }
        }
    });

    let outputs: Vec<O> = out_rx.iter().collect();
    if feeder.join().is_err() {
        error!("[collector] {label} feeder panicked");
    }
    pool.join();
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_pool_collects_every_some() {
        let mut out = run_pool("test", 4, (0..50).collect(), |n: i32| (n % 2 == 0).then_some(n)).unwrap();
        out.sort();
        assert_eq!(out, (0..50).filter(|n| n % 2 == 0).collect::<Vec<_>>());
    }

    #[test]
    fn run_pool_with_no_inputs() {
        let out: Vec<i32> = run_pool("test", 2, Vec::<i32>::new(), Some).unwrap();
        assert!(out.is_empty());
    }
}
