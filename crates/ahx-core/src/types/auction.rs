//! Upstream auction payloads and the normalized mini-auction form.

use serde::{Deserialize, Serialize};

use super::ItemId;

// ---------------------------------------------------------------------------
// Upstream payloads
// ---------------------------------------------------------------------------

/// Auction-info descriptor returned for a realm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionInfo {
    #[serde(default)]
    pub files: Vec<AuctionFile>,
}

/// One snapshot file in an auction-info descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionFile {
    pub url: String,
    /// Milliseconds since epoch.
    #[serde(rename = "lastModified")]
    pub last_modified: i64,
}

/// Full auction snapshot for a realm.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuctionsResponse {
    #[serde(default)]
    pub realms: Vec<SnapshotRealm>,
    #[serde(default)]
    pub auctions: Vec<Auction>,
}

/// Realm identity as declared inside a snapshot. The fetch-side identity
/// always takes precedence over this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRealm {
    pub name: String,
    pub slug: String,
}

/// A single upstream auction line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub auc: i64,
    pub item: ItemId,
    pub owner: String,
    pub owner_realm: String,
    pub bid: i64,
    pub buyout: i64,
    pub quantity: i64,
    pub time_left: String,
    #[serde(default)]
    pub rand: i64,
    #[serde(default)]
    pub seed: i64,
    #[serde(default)]
    pub context: i64,
}

// ---------------------------------------------------------------------------
// Mini-auctions
// ---------------------------------------------------------------------------

/// A deduplicated auction tuple with the upstream ids collapsed into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniAuction {
    pub item_id: ItemId,
    pub owner: String,
    pub owner_realm: String,
    pub bid: i64,
    pub buyout: i64,
    /// `buyout / quantity`, or 0 when there is no buyout.
    pub buyout_per: f64,
    pub quantity: i64,
    pub time_left: String,
    pub auc_list: Vec<i64>,
}

impl MiniAuction {
    /// Number of upstream auctions collapsed into this tuple.
    pub fn auctions(&self) -> i64 {
        self.auc_list.len() as i64
    }
}

/// Sort column for auction listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKind {
    #[default]
    None,
    Item,
    Quantity,
    Bid,
    Buyout,
    BuyoutPer,
    Owner,
    Auctions,
}

/// Sort direction for auction listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    None,
    Up,
    Down,
}

/// Aggregate statistics over a realm's live auctions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuctionStats {
    pub total_auctions: i64,
    pub owner_names: Vec<String>,
    pub item_ids: Vec<ItemId>,
}
