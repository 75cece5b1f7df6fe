//! Live-auctions store: the current mini-auction list per realm.
//!
//! Each realm owns one redb file at
//! `{dir}/live-auctions/{region}/{slug}.db` with one table and one key whose
//! value is the gzipped JSON mini-auction array. A snapshot replaces it
//! wholesale in a single write transaction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use ahx_core::codec;
use ahx_core::dedup::MiniAuctionList;
use ahx_core::types::{AuctionStats, ItemId, MiniAuction, RealmKey, SortDirection, SortKind};
use redb::{Database, ReadableTable, TableDefinition, TableError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;

const LIVE_AUCTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("live-auctions");
const MINI_AUCTIONS_KEY: &str = "mini-auctions";

/// Largest page size accepted by [`query_mini_auctions`].
pub const MAX_PAGE_COUNT: i64 = 1000;

// ---------------------------------------------------------------------------
// Query types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuctionsQuery {
    pub owner_filters: Vec<String>,
    pub item_filters: Vec<ItemId>,
    pub sort_kind: SortKind,
    pub sort_direction: SortDirection,
    pub page: i64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuctionsPage {
    pub items: Vec<MiniAuction>,
    pub total_after_filter: i64,
    pub total_count_incl_dupes: i64,
}

/// Filter (AND across categories, OR within), sort (stable), paginate.
pub fn query_mini_auctions(list: &MiniAuctionList, query: &AuctionsQuery) -> Result<AuctionsPage, StoreError> {
    if query.count < 1 || query.count > MAX_PAGE_COUNT {
        return Err(StoreError::User(format!("count must be between 1 and {MAX_PAGE_COUNT}")));
    }
    if query.page < 0 {
        return Err(StoreError::User("page must not be negative".into()));
    }

    let total_count_incl_dupes = list.total_auctions();

    let mut filtered: Vec<&MiniAuction> = list
        .iter()
        .filter(|m| query.owner_filters.is_empty() || query.owner_filters.iter().any(|o| *o == m.owner))
        .filter(|m| query.item_filters.is_empty() || query.item_filters.contains(&m.item_id))
        .collect();

    sort_mini_auctions(&mut filtered, query.sort_kind, query.sort_direction);

    let total = filtered.len();
    let start = query
        .page
        .checked_mul(query.count)
        .and_then(|s| usize::try_from(s).ok())
        .filter(|&s| s <= total)
        .ok_or_else(|| StoreError::User(format!("page {} is out of range", query.page)))?;
    let end = total.min(start + query.count as usize);

    Ok(AuctionsPage {
        items: filtered[start..end].iter().map(|m| (*m).clone()).collect(),
        total_after_filter: total as i64,
        total_count_incl_dupes,
    })
}

fn sort_mini_auctions(list: &mut [&MiniAuction], kind: SortKind, direction: SortDirection) {
    use std::cmp::Ordering;

    let cmp: fn(&MiniAuction, &MiniAuction) -> Ordering = match kind {
        SortKind::None => return,
        SortKind::Item => |a, b| a.item_id.cmp(&b.item_id),
        SortKind::Quantity => |a, b| a.quantity.cmp(&b.quantity),
        SortKind::Bid => |a, b| a.bid.cmp(&b.bid),
        SortKind::Buyout => |a, b| a.buyout.cmp(&b.buyout),
        SortKind::BuyoutPer => |a, b| a.buyout_per.total_cmp(&b.buyout_per),
        SortKind::Owner => |a, b| a.owner.cmp(&b.owner),
        SortKind::Auctions => |a, b| a.auc_list.len().cmp(&b.auc_list.len()),
    };

    match direction {
        SortDirection::None => {}
        SortDirection::Up => list.sort_by(|a, b| cmp(a, b)),
        SortDirection::Down => list.sort_by(|a, b| cmp(b, a)),
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct LiveAuctionsStore {
    dir: PathBuf,
    dbs: RwLock<HashMap<RealmKey, Arc<Database>>>,
}

impl LiveAuctionsStore {
    pub fn new(cache_dir: &Path) -> Self {
        Self { dir: cache_dir.join("live-auctions"), dbs: RwLock::new(HashMap::new()) }
    }

    pub fn db_path(&self, realm: &RealmKey) -> PathBuf {
        self.dir.join(&realm.region).join(format!("{}.db", realm.slug))
    }

    /// Open (creating if needed) the database for each realm.
    pub fn open_realms<'a>(&self, realms: impl IntoIterator<Item = &'a RealmKey>) -> Result<(), StoreError> {
        let mut opened = 0usize;
        for realm in realms {
            self.ensure(realm)?;
            opened += 1;
        }
        info!("[live-auctions] {opened} realm databases open under {}", self.dir.display());
        Ok(())
    }

    /// Realms with an open database.
    pub fn realms(&self) -> Vec<RealmKey> {
        let mut keys: Vec<RealmKey> =
            self.dbs.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect();
        keys.sort();
        keys
    }

    fn ensure(&self, realm: &RealmKey) -> Result<Arc<Database>, StoreError> {
        if let Some(db) = self.dbs.read().unwrap_or_else(PoisonError::into_inner).get(realm) {
            return Ok(Arc::clone(db));
        }

        let mut dbs = self.dbs.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(db) = dbs.get(realm) {
            return Ok(Arc::clone(db));
        }
        let path = self.db_path(realm);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Arc::new(Database::create(&path)?);
        dbs.insert(realm.clone(), Arc::clone(&db));
        Ok(db)
    }

    fn get_db(&self, realm: &RealmKey) -> Result<Arc<Database>, StoreError> {
        self.dbs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(realm)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("live auctions for {realm}")))
    }

    /// Atomically overwrite the realm's mini-auction list.
    pub fn replace(&self, realm: &RealmKey, list: &MiniAuctionList) -> Result<(), StoreError> {
        let db = self.ensure(realm)?;
        let encoded = codec::to_gzip_json(list)?;

        let txn = db.begin_write()?;
        {
            let mut table = txn.open_table(LIVE_AUCTIONS)?;
            table.insert(MINI_AUCTIONS_KEY, encoded.as_slice())?;
        }
        txn.commit()?;

        debug!(region = %realm.region, realm = %realm.slug, "[live-auctions] replaced {} mini-auctions", list.len());
        Ok(())
    }

    /// Current list; empty when nothing has been written yet.
    pub fn get_mini_auctions(&self, realm: &RealmKey) -> Result<MiniAuctionList, StoreError> {
        let db = self.get_db(realm)?;
        let txn = db.begin_read()?;
        let table = match txn.open_table(LIVE_AUCTIONS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(MiniAuctionList::default()),
            Err(e) => return Err(e.into()),
        };
        let Some(raw) = table.get(MINI_AUCTIONS_KEY)? else {
            return Ok(MiniAuctionList::default());
        };
        Ok(codec::from_gzip_json(raw.value())?)
    }

    pub fn get_stats(&self, realm: &RealmKey) -> Result<AuctionStats, StoreError> {
        Ok(self.get_mini_auctions(realm)?.stats())
    }

    pub fn query_auctions(&self, realm: &RealmKey, query: &AuctionsQuery) -> Result<AuctionsPage, StoreError> {
        let list = self.get_mini_auctions(realm)?;
        query_mini_auctions(&list, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mini(item_id: ItemId, owner: &str, buyout: i64, quantity: i64, aucs: &[i64]) -> MiniAuction {
        MiniAuction {
            item_id,
            owner: owner.into(),
            owner_realm: "Earthen Ring".into(),
            bid: buyout / 2,
            buyout,
            buyout_per: ahx_core::dedup::buyout_per(buyout, quantity),
            quantity,
            time_left: "LONG".into(),
            auc_list: aucs.to_vec(),
        }
    }

    fn sample() -> MiniAuctionList {
        MiniAuctionList(vec![
            mini(25, "A", 20, 2, &[1]),
            mini(26, "B", 50, 1, &[2, 3]),
            mini(25, "B", 20, 4, &[4]),
            mini(27, "C", 0, 1, &[5]),
        ])
    }

    fn query(count: i64) -> AuctionsQuery {
        AuctionsQuery { count, ..Default::default() }
    }

    #[test]
    fn filters_and_across_or_within() {
        let q = AuctionsQuery {
            owner_filters: vec!["A".into(), "B".into()],
            item_filters: vec![25],
            ..query(10)
        };
        let page = query_mini_auctions(&sample(), &q).unwrap();
        assert_eq!(page.total_after_filter, 2);
        assert_eq!(page.total_count_incl_dupes, 5);
        assert!(page.items.iter().all(|m| m.item_id == 25));
    }

    #[test]
    fn sort_is_stable_in_both_directions() {
        let q = AuctionsQuery { sort_kind: SortKind::Buyout, sort_direction: SortDirection::Down, ..query(10) };
        let page = query_mini_auctions(&sample(), &q).unwrap();
        let owners: Vec<&str> = page.items.iter().map(|m| m.owner.as_str()).collect();
        // equal buyouts keep input order (A before B)
        assert_eq!(owners, vec!["B", "A", "B", "C"]);

        let q = AuctionsQuery { sort_kind: SortKind::BuyoutPer, sort_direction: SortDirection::Up, ..query(10) };
        let page = query_mini_auctions(&sample(), &q).unwrap();
        let pers: Vec<f64> = page.items.iter().map(|m| m.buyout_per).collect();
        assert_eq!(pers, vec![0.0, 5.0, 10.0, 50.0]);

        let q = AuctionsQuery { sort_kind: SortKind::Auctions, sort_direction: SortDirection::Down, ..query(1) };
        let page = query_mini_auctions(&sample(), &q).unwrap();
        assert_eq!(page.items[0].item_id, 26);
    }

    #[test]
    fn pagination_bounds() {
        let page = query_mini_auctions(&sample(), &AuctionsQuery { page: 1, ..query(3) }).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total_after_filter, 4);

        let page = query_mini_auctions(&sample(), &AuctionsQuery { page: 2, ..query(2) }).unwrap();
        assert!(page.items.is_empty());

        for bad in [query(0), query(1001), AuctionsQuery { page: -1, ..query(1) }, AuctionsQuery {
            page: 5,
            ..query(2)
        }] {
            let err = query_mini_auctions(&sample(), &bad).unwrap_err();
            assert_eq!(err.code(), ahx_core::error::ErrorCode::UserError);
        }
    }

    #[test]
    fn replace_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = LiveAuctionsStore::new(dir.path());
        let realm = RealmKey::new("us", "earthen-ring");

        assert!(matches!(store.get_mini_auctions(&realm), Err(StoreError::NotFound(_))));

        store.open_realms([&realm]).unwrap();
        assert!(store.get_mini_auctions(&realm).unwrap().is_empty());

        store.replace(&realm, &sample()).unwrap();
        assert_eq!(store.get_mini_auctions(&realm).unwrap(), sample());
        assert!(store.db_path(&realm).ends_with("live-auctions/us/earthen-ring.db"));

        let stats = store.get_stats(&realm).unwrap();
        assert_eq!(stats.total_auctions, 5);
        assert_eq!(stats.item_ids, vec![25, 26, 27]);
        assert_eq!(stats.owner_names, vec!["A", "B", "C"]);

        store.replace(&realm, &MiniAuctionList(vec![mini(30, "D", 1, 1, &[9])])).unwrap();
        let page = store.query_auctions(&realm, &query(10)).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].item_id, 30);
    }
}
