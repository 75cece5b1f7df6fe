//! Raw auction list → mini-auction normalization.
//!
//! Upstream snapshots list every auction separately, and many are identical
//! apart from their id. [`MiniAuctionList::from_auctions`] collapses lines
//! sharing the tuple (item, owner, owner realm, bid, buyout, quantity, time
//! left) into one [`MiniAuction`] that keeps the collapsed ids in
//! `auc_list`. The output preserves first-occurrence order of each tuple.

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::types::{Auction, AuctionStats, ItemId, MiniAuction, PriceList, Prices};

/// Identity of an auction tuple for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TupleKey<'a> {
    item: ItemId,
    owner: &'a str,
    owner_realm: &'a str,
    bid: i64,
    buyout: i64,
    quantity: i64,
    time_left: &'a str,
}

impl<'a> TupleKey<'a> {
    fn of(a: &'a Auction) -> Self {
        Self {
            item: a.item,
            owner: &a.owner,
            owner_realm: &a.owner_realm,
            bid: a.bid,
            buyout: a.buyout,
            quantity: a.quantity,
            time_left: &a.time_left,
        }
    }
}

/// `buyout / quantity`, 0 when there is no buyout or no quantity.
pub fn buyout_per(buyout: i64, quantity: i64) -> f64 {
    if buyout == 0 || quantity == 0 {
        0.0
    } else {
        buyout as f64 / quantity as f64
    }
}

/// The normalized contents of a realm's live-auctions view.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MiniAuctionList(pub Vec<MiniAuction>);

impl MiniAuctionList {
    /// Collapse a raw auction list into mini-auctions.
    pub fn from_auctions(auctions: &[Auction]) -> Self {
        let mut index: AHashMap<TupleKey<'_>, usize> = AHashMap::with_capacity(auctions.len());
        let mut out: Vec<MiniAuction> = Vec::new();

        for auction in auctions {
            let key = TupleKey::of(auction);
            match index.get(&key) {
                Some(&pos) => out[pos].auc_list.push(auction.auc),
                None => {
                    index.insert(key, out.len());
                    out.push(MiniAuction {
                        item_id: auction.item,
                        owner: auction.owner.clone(),
                        owner_realm: auction.owner_realm.clone(),
                        bid: auction.bid,
                        buyout: auction.buyout,
                        buyout_per: buyout_per(auction.buyout, auction.quantity),
                        quantity: auction.quantity,
                        time_left: auction.time_left.clone(),
                        auc_list: vec![auction.auc],
                    });
                }
            }
        }

        Self(out)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MiniAuction> {
        self.0.iter()
    }

    /// Σ |auc_list| over every mini-auction.
    pub fn total_auctions(&self) -> i64 {
        self.0.iter().map(MiniAuction::auctions).sum()
    }

    /// Sorted unique owner names.
    pub fn owner_names(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.0.iter().map(|m| m.owner.as_str()).collect();
        set.into_iter().map(str::to_string).collect()
    }

    /// Sorted unique item ids.
    pub fn item_ids(&self) -> Vec<ItemId> {
        let set: BTreeSet<ItemId> = self.0.iter().map(|m| m.item_id).collect();
        set.into_iter().collect()
    }

    pub fn stats(&self) -> AuctionStats {
        AuctionStats {
            total_auctions: self.total_auctions(),
            owner_names: self.owner_names(),
            item_ids: self.item_ids(),
        }
    }

    /// Price points for every item present.
    pub fn price_list(&self) -> PriceList {
        self.price_list_filtered(|_| true)
    }

    /// Price points restricted to `item_ids`.
    pub fn price_list_for(&self, item_ids: &[ItemId]) -> PriceList {
        let wanted: BTreeSet<ItemId> = item_ids.iter().copied().collect();
        self.price_list_filtered(|id| wanted.contains(&id))
    }

    fn price_list_filtered(&self, keep: impl Fn(ItemId) -> bool) -> PriceList {
        let mut out: BTreeMap<ItemId, Prices> = BTreeMap::new();
        for mini in self.0.iter().filter(|m| keep(m.item_id)) {
            let entry = out.entry(mini.item_id).or_default();
            let count = mini.auctions();
            entry.auctions_total = entry.auctions_total.saturating_add(count);
            entry.quantity_total = entry.quantity_total.saturating_add(mini.quantity.saturating_mul(count));
            if mini.buyout_per > 0.0
                && (entry.min_buyout_per == 0.0 || mini.buyout_per < entry.min_buyout_per)
            {
                entry.min_buyout_per = mini.buyout_per;
            }
        }
        out
    }
}

impl From<Vec<MiniAuction>> for MiniAuctionList {
    fn from(list: Vec<MiniAuction>) -> Self {
        Self(list)
    }
}
