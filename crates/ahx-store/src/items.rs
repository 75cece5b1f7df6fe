//! Items catalog at `{dir}/items/items.db`.
//!
//! One table, one gzipped JSON item record per item id. The collector is the
//! only writer; query handlers read.

use std::collections::BTreeMap;
use std::path::Path;

use ahx_core::codec;
use ahx_core::names::{NO_MATCH, fuzzy_rank, normalize_name};
use ahx_core::types::{Item, ItemId, ItemsMap, icon_groups};
use redb::{Database, ReadableTable, TableDefinition, TableError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StoreError;

const ITEMS: TableDefinition<ItemId, &[u8]> = TableDefinition::new("items");

/// Search results are truncated to this many entries.
pub const SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSearchResult {
    /// The item's normalized name.
    pub target: String,
    pub item: Item,
    pub rank: i32,
}

pub struct ItemsStore {
    db: Database,
}

impl ItemsStore {
    pub fn open(cache_dir: &Path) -> Result<Self, StoreError> {
        let dir = cache_dir.join("items");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("items.db");
        let db = Database::create(&path)?;
        info!("[items] opened {}", path.display());
        Ok(Self { db })
    }

    /// Full scan.
    pub fn get_all(&self) -> Result<ItemsMap, StoreError> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(ITEMS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(ItemsMap::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = ItemsMap::new();
        for entry in table.iter()? {
            let (id, raw) = entry?;
            let item: Item = codec::from_gzip_json(raw.value())?;
            out.insert(id.value(), item);
        }
        Ok(out)
    }

    /// Point lookups; absent ids are omitted.
    pub fn find(&self, ids: &[ItemId]) -> Result<ItemsMap, StoreError> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(ITEMS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(ItemsMap::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = ItemsMap::new();
        for &id in ids {
            if let Some(raw) = table.get(id)? {
                out.insert(id, codec::from_gzip_json(raw.value())?);
            }
        }
        Ok(out)
    }

    /// Batched upsert in one transaction.
    pub fn persist<'a>(&self, items: impl IntoIterator<Item = &'a Item>) -> Result<usize, StoreError> {
        let txn = self.db.begin_write()?;
        let mut written = 0;
        {
            let mut table = txn.open_table(ITEMS)?;
            for item in items {
                let encoded = codec::to_gzip_json(item)?;
                table.insert(item.id, encoded.as_slice())?;
                written += 1;
            }
        }
        txn.commit()?;
        Ok(written)
    }

    /// Subset of `ids` not yet in the catalog, in input order without repeats.
    pub fn missing(&self, ids: &[ItemId]) -> Result<Vec<ItemId>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(ITEMS) {
            Ok(table) => Some(table),
            Err(TableError::TableDoesNotExist(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for &id in ids {
            if !seen.insert(id) {
                continue;
            }
            let present = match &table {
                Some(table) => table.get(id)?.is_some(),
                None => false,
            };
            if !present {
                out.push(id);
            }
        }
        Ok(out)
    }

    /// Fuzzy search over normalized item names.
    pub fn search(&self, query: &str) -> Result<Vec<ItemSearchResult>, StoreError> {
        Ok(rank_items(self.get_all()?.into_values(), query))
    }

    /// Items lacking an icon URL, grouped by icon key.
    pub fn missing_icons(&self) -> Result<BTreeMap<String, Vec<ItemId>>, StoreError> {
        Ok(icon_groups(self.get_all()?.values()))
    }

    /// Set `icon_url` on every item of each icon group and persist once.
    pub fn set_icon_urls(&self, urls: &BTreeMap<String, (String, Vec<ItemId>)>) -> Result<usize, StoreError> {
        let ids: Vec<ItemId> = urls.values().flat_map(|(_, ids)| ids.iter().copied()).collect();
        let mut items = self.find(&ids)?;
        for (url, ids) in urls.values() {
            for id in ids {
                if let Some(item) = items.get_mut(id) {
                    item.icon_url = Some(url.clone());
                }
            }
        }
        self.persist(items.values())
    }
}

/// Rank items against `query`; empty query lists alphabetically.
pub fn rank_items(items: impl IntoIterator<Item = Item>, query: &str) -> Vec<ItemSearchResult> {
    let query = normalize_name(query);

    let mut results: Vec<ItemSearchResult> = if query.is_empty() {
        let mut all: Vec<ItemSearchResult> = items
            .into_iter()
            .map(|item| ItemSearchResult { target: item.normalized_name.clone(), item, rank: 0 })
            .collect();
        all.sort_by(|a, b| a.target.cmp(&b.target));
        all
    } else {
        let mut ranked: Vec<ItemSearchResult> = items
            .into_iter()
            .filter_map(|item| {
                let target = if item.normalized_name.is_empty() {
                    normalize_name(&item.name)
                } else {
                    item.normalized_name.clone()
                };
                let rank = fuzzy_rank(&query, &target);
                (rank != NO_MATCH).then_some(ItemSearchResult { target, item, rank })
            })
            .collect();
        ranked.sort_by_key(|r| r.rank);
        ranked
    };

    results.truncate(SEARCH_LIMIT);
    results
}
