//! Per-item price points and history maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ItemId;

/// Per-item aggregate at one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Prices {
    /// Lowest non-zero `buyout_per`, or 0 when no auction has a buyout.
    pub min_buyout_per: f64,
    /// Σ quantity · |auc_list|.
    pub quantity_total: i64,
    /// Σ |auc_list|.
    pub auctions_total: i64,
}

/// `{item_id → price point}` for one realm at one instant.
pub type PriceList = BTreeMap<ItemId, Prices>;

/// `{timestamp → price point}` for one (realm, item).
pub type PriceHistory = BTreeMap<i64, Prices>;

/// `{item_id → history}` for one realm.
pub type ItemPriceHistories = BTreeMap<ItemId, PriceHistory>;
