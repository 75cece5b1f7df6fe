//! Building the process-wide status table.
//!
//! The `api` process discovers realms upstream and seeds each realm's
//! `last_downloaded` from the newest raw snapshot already in the blob store.
//! Intake processes instead ask the `api` process over the bus.

use ahx_core::bus::{self, Messenger, subjects};
use ahx_core::config::AppConfig;
use ahx_core::types::{RegionTable, StatusRequest, StatusResponse, StatusTable};
use ahx_store::BlobStore;
use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::upstream::BlizzardClient;

/// Fetch every region's realm list and install it in `status`.
///
/// Whitelisted realms get `last_downloaded` from the raw-auctions bucket so a
/// restart does not re-ingest the same snapshot.
pub async fn discover_realms(
    config: &AppConfig,
    regions: &RegionTable,
    client: &BlizzardClient,
    token: &str,
    blobs: &BlobStore,
    status: &StatusTable,
) -> Result<()> {
    for region in regions.iter() {
        let mut realms = client
            .fetch_realms(region, token)
            .await
            .with_context(|| format!("fetching realms for {}", region.name))?;

        let mut seeded = 0usize;
        for realm in realms.iter_mut().filter(|r| config.is_whitelisted(&r.region_name, &r.slug)) {
            match blobs.latest_raw_auctions(&realm.key()).await {
                Ok(0) => {}
                Ok(ts) => {
                    realm.advance_last_downloaded(ts);
                    seeded += 1;
                }
                Err(e) => warn!(region = %region.name, realm = %realm.slug, "[realms] seeding failed: {e}"),
            }
        }

        info!("[realms] {}: {} realms, {seeded} seeded from raw snapshots", region.name, realms.len());
        status.set_realms(&region.name, realms);
    }
    Ok(())
}

/// Populate `status` from a running `api` process.
pub async fn load_status_over_bus(bus: &dyn Messenger, regions: &RegionTable, status: &StatusTable) -> Result<()> {
    for region in regions.iter() {
        let req = StatusRequest { region_name: region.name.clone() };
        let reply = bus::request_json(bus, subjects::STATUS, &req)
            .await
            .with_context(|| format!("requesting status for {}", region.name))?;
        let resp: StatusResponse = bus::decode_data(&reply)?;
        info!("[realms] {}: {} realms from status", region.name, resp.realms.len());
        status.set_realms(&region.name, resp.realms);
    }
    Ok(())
}
