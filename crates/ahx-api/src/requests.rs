//! Request and response bodies for each subject.
//!
//! Requests are plain JSON. Every response is wrapped in the reply envelope;
//! the ones marked gzip travel as gzip+base64 JSON in `data`.

use std::collections::BTreeMap;

use ahx_core::config::{Expansion, Profession};
use ahx_core::types::{ItemId, RealmSlug, Region, RegionName, SortDirection, SortKind};
use ahx_store::{AuctionsQuery, ItemSearchResult};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Auctions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuctionsRequest {
    pub region_name: RegionName,
    pub realm_slug: RealmSlug,
    pub page: i64,
    pub count: i64,
    pub sort_kind: SortKind,
    pub sort_direction: SortDirection,
    pub owner_filters: Vec<String>,
    pub item_filters: Vec<ItemId>,
}

impl AuctionsRequest {
    pub fn query(&self) -> AuctionsQuery {
        AuctionsQuery {
            owner_filters: self.owner_filters.clone(),
            item_filters: self.item_filters.clone(),
            sort_kind: self.sort_kind,
            sort_direction: self.sort_direction,
            page: self.page,
            count: self.count,
        }
    }
}

// ---------------------------------------------------------------------------
// Owners
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnersRequest {
    pub region_name: RegionName,
    pub realm_slug: RealmSlug,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub name: String,
    pub normalized_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnersQueryResult {
    pub target: String,
    pub owner: Owner,
    pub rank: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OwnersQueryResponse {
    pub items: Vec<OwnersQueryResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnersQueryByItemsRequest {
    pub region_name: RegionName,
    pub realm_slug: RealmSlug,
    pub items: Vec<ItemId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ownership {
    pub name: String,
    pub owned_value: i64,
    pub owned_volume: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OwnersQueryByItemsResponse {
    pub total_value: i64,
    pub total_volume: i64,
    pub ownership: BTreeMap<String, Ownership>,
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemsQueryRequest {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemsQueryResponse {
    pub items: Vec<ItemSearchResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemsRequest {
    pub item_ids: Vec<ItemId>,
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceListRequest {
    pub region_name: RegionName,
    pub realm_slug: RealmSlug,
    pub item_ids: Vec<ItemId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceListHistoryRequest {
    pub region_name: RegionName,
    pub realm_slug: RealmSlug,
    pub item_ids: Vec<ItemId>,
    #[serde(alias = "lower")]
    pub lower_bounds: i64,
    #[serde(alias = "upper")]
    pub upper_bounds: i64,
}

// ---------------------------------------------------------------------------
// Process and configuration info
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootResponse {
    pub regions: Vec<Region>,
    pub item_classes: serde_json::Value,
    pub expansions: Vec<Expansion>,
    pub professions: Vec<Profession>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmModificationDatesRequest {
    /// Restrict to one region; empty means all.
    pub region_name: RegionName,
}

/// region → slug → `last_downloaded`.
pub type RealmModificationDates = BTreeMap<RegionName, BTreeMap<RealmSlug, i64>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSecretResponse {
    pub session_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInfoResponse {
    pub run_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenericTestErrorsRequest {
    /// Wire code to answer with.
    pub code: i32,
    pub message: String,
}
