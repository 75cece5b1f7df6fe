//! Pricelist-history store: week-sharded price history per realm.
//!
//! ```text
//! {dir}/pricelist-histories/{region}/{slug}/{week_start_unix}.db
//!    table "pricelist-history": item_id → gzip JSON {unix_seconds → Prices}
//! ```
//!
//! `week_start_unix` is the Monday 00:00 UTC containing the point's
//! timestamp. Shards are opened lazily, kept until pruned, and dropped
//! exactly once when their `week_start` falls before `now - retention`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use ahx_core::codec;
use ahx_core::time_util::{retention_cutoff, week_start_unix};
use ahx_core::types::{ItemId, PriceHistory, PriceList, RealmKey};
use redb::{Database, ReadableTable, TableDefinition, TableError};
use tracing::{debug, error, info, warn};

use crate::error::StoreError;

const PRICELIST_HISTORY: TableDefinition<ItemId, &[u8]> = TableDefinition::new("pricelist-history");

/// One week of history for one realm.
pub struct Shard {
    week_start: i64,
    path: PathBuf,
    db: Database,
}

impl Shard {
    fn open(path: PathBuf, week_start: i64) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(&path)?;
        Ok(Self { week_start, path, db })
    }

    pub fn week_start(&self) -> i64 {
        self.week_start
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert one point per item in a single write transaction.
    fn insert_points(&self, target_time: i64, prices: &PriceList) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(PRICELIST_HISTORY)?;
            for (&item_id, &point) in prices {
                let existing = table.get(item_id)?.map(|raw| raw.value().to_vec());
                let mut history: PriceHistory = match existing {
                    Some(raw) => codec::from_gzip_json(&raw)?,
                    None => PriceHistory::new(),
                };
                history.insert(target_time, point);
                let encoded = codec::to_gzip_json(&history)?;
                table.insert(item_id, encoded.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn history(&self, item_id: ItemId) -> Result<PriceHistory, StoreError> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(PRICELIST_HISTORY) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(PriceHistory::new()),
            Err(e) => return Err(e.into()),
        };
        match table.get(item_id)? {
            Some(raw) => Ok(codec::from_gzip_json(raw.value())?),
            None => Ok(PriceHistory::new()),
        }
    }
}

type RealmShards = BTreeMap<i64, Arc<Shard>>;

pub struct PricelistHistoryStore {
    dir: PathBuf,
    retention_weeks: u32,
    shards: RwLock<HashMap<RealmKey, RealmShards>>,
}

impl PricelistHistoryStore {
    /// Open the store and every shard already on disk.
    pub fn open(cache_dir: &Path, retention_weeks: u32) -> Result<Self, StoreError> {
        let store = Self {
            dir: cache_dir.join("pricelist-histories"),
            retention_weeks,
            shards: RwLock::new(HashMap::new()),
        };
        let loaded = store.load_existing()?;
        info!("[pricelist-histories] loaded {loaded} shards from {}", store.dir.display());
        Ok(store)
    }

    pub fn shard_path(&self, realm: &RealmKey, week_start: i64) -> PathBuf {
        self.dir.join(&realm.region).join(&realm.slug).join(format!("{week_start}.db"))
    }

    fn load_existing(&self) -> Result<usize, StoreError> {
        if !self.dir.is_dir() {
            return Ok(0);
        }

        let mut loaded = 0;
        let mut shards = self.shards.write().unwrap_or_else(PoisonError::into_inner);
        for region in std::fs::read_dir(&self.dir)? {
            let region = region?;
            if !region.file_type()?.is_dir() {
                continue;
            }
            let region_name = region.file_name().to_string_lossy().into_owned();
            for realm in std::fs::read_dir(region.path())? {
                let realm = realm?;
                if !realm.file_type()?.is_dir() {
                    continue;
                }
                let key = RealmKey::new(&region_name, &realm.file_name().to_string_lossy());
                for file in std::fs::read_dir(realm.path())? {
                    let path = file?.path();
                    let week = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .and_then(|n| n.strip_suffix(".db"))
                        .and_then(|n| n.parse::<i64>().ok());
                    let Some(week) = week else {
                        warn!("[pricelist-histories] ignoring {}", path.display());
                        continue;
                    };
                    let shard = Shard::open(path, week)?;
                    shards.entry(key.clone()).or_default().insert(week, Arc::new(shard));
                    loaded += 1;
                }
            }
        }
        Ok(loaded)
    }

    fn shard_for(&self, realm: &RealmKey, week_start: i64) -> Result<Arc<Shard>, StoreError> {
        if let Some(shard) = self
            .shards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(realm)
            .and_then(|s| s.get(&week_start))
        {
            return Ok(Arc::clone(shard));
        }

        let mut shards = self.shards.write().unwrap_or_else(PoisonError::into_inner);
        let realm_shards = shards.entry(realm.clone()).or_default();
        if let Some(shard) = realm_shards.get(&week_start) {
            return Ok(Arc::clone(shard));
        }
        let shard = Arc::new(Shard::open(self.shard_path(realm, week_start), week_start)?);
        realm_shards.insert(week_start, Arc::clone(&shard));
        debug!(region = %realm.region, realm = %realm.slug, "[pricelist-histories] opened shard {week_start}");
        Ok(shard)
    }

    fn realm_shards(&self, realm: &RealmKey) -> Vec<Arc<Shard>> {
        self.shards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(realm)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Week starts of a realm's resident shards, ascending.
    pub fn weeks(&self, realm: &RealmKey) -> Vec<i64> {
        self.realm_shards(realm).iter().map(|s| s.week_start).collect()
    }

    /// Record `prices` at `target_time`. Returns the shard's week start.
    pub fn persist(&self, realm: &RealmKey, target_time: i64, prices: &PriceList) -> Result<i64, StoreError> {
        let week = week_start_unix(target_time);
        let shard = self.shard_for(realm, week)?;
        shard.insert_points(target_time, prices)?;
        debug!(
            region = %realm.region,
            realm = %realm.slug,
            "[pricelist-histories] persisted {} items at {target_time} into {week}",
            prices.len()
        );
        Ok(week)
    }

    /// Points for `item_id` with `lower <= t <= upper`, merged across shards.
    pub fn get_history(
        &self,
        realm: &RealmKey,
        item_id: ItemId,
        lower: i64,
        upper: i64,
    ) -> Result<PriceHistory, StoreError> {
        let mut out = PriceHistory::new();
        for shard in self.realm_shards(realm) {
            // A shard covers [week_start, week_start + 1 week).
            if shard.week_start > upper || shard.week_start + 7 * 24 * 3600 <= lower {
                continue;
            }
            out.extend(shard.history(item_id)?.into_iter().filter(|(t, _)| *t >= lower && *t <= upper));
        }
        Ok(out)
    }

    /// Drop every shard whose `week_start` is before `now - retention`.
    /// Returns the removed `(realm, week_start)` pairs.
    ///
    /// A shard is forgotten even when its file cannot be deleted; the first
    /// such error is returned after every expired shard has been handled.
    pub fn prune(&self, now: i64) -> Result<Vec<(RealmKey, i64)>, StoreError> {
        let cutoff = retention_cutoff(now, self.retention_weeks);
        let mut expired: Vec<(RealmKey, Arc<Shard>)> = Vec::new();

        {
            let mut shards = self.shards.write().unwrap_or_else(PoisonError::into_inner);
            for (realm, realm_shards) in shards.iter_mut() {
                let keep = realm_shards.split_off(&cutoff);
                let old = std::mem::replace(realm_shards, keep);
                expired.extend(old.into_values().map(|s| (realm.clone(), s)));
            }
            shards.retain(|_, s| !s.is_empty());
        }

        let mut removed = Vec::with_capacity(expired.len());
        let mut first_err: Option<StoreError> = None;
        for (realm, shard) in expired {
            let week = shard.week_start;
            let path = shard.path.clone();
            // Last handle closes the database before the file goes.
            drop(shard);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    error!(region = %realm.region, realm = %realm.slug, "[pricelist-histories] delete {}: {e}", path.display());
                    if first_err.is_none() {
                        first_err = Some(e.into());
                    }
                    continue;
                }
            }
            info!(region = %realm.region, realm = %realm.slug, "[pricelist-histories] pruned shard {week}");
            removed.push((realm, week));
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Raw bytes of a shard file, for backup upload.
    pub fn shard_bytes(&self, realm: &RealmKey, week_start: i64) -> Result<Vec<u8>, StoreError> {
        let shard = self
            .shards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(realm)
            .and_then(|s| s.get(&week_start))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("shard {week_start} for {realm}")))?;
        Ok(std::fs::read(shard.path())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahx_core::types::Prices;

    const MONDAY: i64 = 1699833600; // 2023-11-13T00:00:00Z
    const WEEK: i64 = 7 * 24 * 3600;

    fn prices(min: f64, quantity: i64, auctions: i64) -> Prices {
        Prices { min_buyout_per: min, quantity_total: quantity, auctions_total: auctions }
    }

    fn realm() -> RealmKey {
        RealmKey::new("us", "earthen-ring")
    }

    #[test]
    fn persists_into_week_shard_and_reads_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = PricelistHistoryStore::open(dir.path(), 4).unwrap();

        let week = store.persist(&realm(), 1700000000, &PriceList::from([(25, prices(10.0, 2, 1))])).unwrap();
        assert_eq!(week, MONDAY);
        store.persist(&realm(), 1700001200, &PriceList::from([(25, prices(9.0, 3, 2))])).unwrap();
        store.persist(&realm(), 1700000000 + WEEK, &PriceList::from([(25, prices(8.0, 1, 1))])).unwrap();
        assert_eq!(store.weeks(&realm()), vec![MONDAY, MONDAY + WEEK]);

        let all = store.get_history(&realm(), 25, 0, 2000000000).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[&1700000000], prices(10.0, 2, 1));

        let first = store.get_history(&realm(), 25, 1700000000, 1700001200).unwrap();
        assert_eq!(first.keys().copied().collect::<Vec<_>>(), vec![1700000000, 1700001200]);

        assert!(store.get_history(&realm(), 99, 0, i64::MAX).unwrap().is_empty());
        assert!(store.get_history(&RealmKey::new("eu", "x"), 25, 0, i64::MAX).unwrap().is_empty());
    }

    #[test]
    fn reopens_existing_shards() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PricelistHistoryStore::open(dir.path(), 4).unwrap();
            store.persist(&realm(), 1700000000, &PriceList::from([(25, prices(10.0, 2, 1))])).unwrap();
        }
        let store = PricelistHistoryStore::open(dir.path(), 4).unwrap();
        assert_eq!(store.weeks(&realm()), vec![MONDAY]);
        assert_eq!(store.get_history(&realm(), 25, 0, i64::MAX).unwrap().len(), 1);
        assert!(!store.shard_bytes(&realm(), MONDAY).unwrap().is_empty());
    }

    #[test]
    fn prune_removes_shards_past_retention() {
        let dir = tempfile::tempdir().unwrap();
        let store = PricelistHistoryStore::open(dir.path(), 1).unwrap();
        for w in 0..4 {
            store
                .persist(&realm(), MONDAY + w * WEEK + 60, &PriceList::from([(25, prices(1.0, 1, 1))]))
                .unwrap();
        }

        // An hour into the fourth week, the third week started more than a
        // week ago, so only the current shard is young enough to stay.
        let now = MONDAY + 3 * WEEK + 3600;
        let removed = store.prune(now).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(store.weeks(&realm()), vec![MONDAY + 3 * WEEK]);
        assert!(!store.shard_path(&realm(), MONDAY + 2 * WEEK).exists());
        assert!(store.weeks(&realm()).iter().all(|w| *w >= now - WEEK));

        assert!(store.prune(now).unwrap().is_empty());
    }

    #[test]
    fn shard_starting_exactly_at_horizon_survives() {
        let dir = tempfile::tempdir().unwrap();
        let store = PricelistHistoryStore::open(dir.path(), 2).unwrap();
        for w in 0..3 {
            store.persist(&realm(), MONDAY + w * WEEK, &PriceList::from([(25, prices(1.0, 1, 1))])).unwrap();
        }

        let now = MONDAY + 2 * WEEK;
        assert!(store.prune(now).unwrap().is_empty());
        assert_eq!(store.prune(now + 1).unwrap(), vec![(realm(), MONDAY)]);
        assert!(store.weeks(&realm()).iter().all(|w| *w >= now + 1 - 2 * WEEK));
    }

    #[cfg(unix)]
    #[test]
    fn prune_keeps_going_past_a_failed_delete() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = PricelistHistoryStore::open(dir.path(), 1).unwrap();
        let locked = RealmKey::new("eu", "draenor");
        store.persist(&locked, MONDAY, &PriceList::from([(25, prices(1.0, 1, 1))])).unwrap();
        store.persist(&realm(), MONDAY, &PriceList::from([(25, prices(1.0, 1, 1))])).unwrap();

        let locked_dir = store.shard_path(&locked, MONDAY).parent().unwrap().to_path_buf();
        std::fs::set_permissions(&locked_dir, std::fs::Permissions::from_mode(0o555)).unwrap();
        // Root ignores directory permissions; nothing to observe then.
        let check = locked_dir.join("write-check");
        if std::fs::write(&check, b"").is_ok() {
            std::fs::remove_file(&check).unwrap();
            std::fs::set_permissions(&locked_dir, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = store.prune(MONDAY + 3 * WEEK);
        std::fs::set_permissions(&locked_dir, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(result.is_err());
        assert!(store.weeks(&locked).is_empty());
        assert!(store.weeks(&realm()).is_empty());
        assert!(!store.shard_path(&realm(), MONDAY).exists());
    }
}
