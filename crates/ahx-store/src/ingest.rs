//! Snapshot → live-auctions and pricelist-history writes.
//!
//! Shared by the collector (local ingest) and the intake handlers
//! (distributed ingest) so both paths derive identical views.

use ahx_core::dedup::MiniAuctionList;
use ahx_core::types::{AuctionsResponse, RealmKey};

use crate::error::StoreError;
use crate::live_auctions::LiveAuctionsStore;
use crate::pricelist_history::PricelistHistoryStore;

/// Normalize a snapshot and replace the realm's live auctions with it.
pub fn ingest_live_auctions(
    live: &LiveAuctionsStore,
    realm: &RealmKey,
    snapshot: &AuctionsResponse,
) -> Result<MiniAuctionList, StoreError> {
    let minis = MiniAuctionList::from_auctions(&snapshot.auctions);
    live.replace(realm, &minis)?;
    Ok(minis)
}

/// Record the snapshot's price points at `target_time`. Returns the shard's
/// week start.
pub fn ingest_pricelist_history(
    history: &PricelistHistoryStore,
    realm: &RealmKey,
    target_time: i64,
    minis: &MiniAuctionList,
) -> Result<i64, StoreError> {
    history.persist(realm, target_time, &minis.price_list())
}
