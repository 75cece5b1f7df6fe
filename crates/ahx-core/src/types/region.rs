//! Regions, realms and the process-wide status table.
//!
//! A [`Realm`] refers to its region by name only; the [`Region`] itself is
//! looked up in the [`RegionTable`] when needed.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

pub type RegionName = String;
pub type RealmSlug = String;

/// An upstream region (e.g. `us`, `eu`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub name: RegionName,
    pub hostname: String,
    #[serde(default)]
    pub primary: bool,
}

/// A realm within a region.
///
/// `last_downloaded` is the upstream-declared modification time (UNIX
/// seconds) of the most recently ingested snapshot; `0` means never. On the
/// wire it is called `last_modified`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Realm {
    pub region_name: RegionName,
    pub slug: RealmSlug,
    pub name: String,
    #[serde(default, rename = "last_modified")]
    pub last_downloaded: i64,
}

impl Realm {
    pub fn new(region_name: impl Into<String>, slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            region_name: region_name.into(),
            slug: slug.into(),
            name: name.into(),
            last_downloaded: 0,
        }
    }

    pub fn key(&self) -> RealmKey {
        RealmKey::new(&self.region_name, &self.slug)
    }

    pub fn never_downloaded(&self) -> bool {
        self.last_downloaded == 0
    }

    /// Returns `true` if a snapshot modified at `target_time` is new data.
    pub fn is_stale_against(&self, target_time: i64) -> bool {
        self.never_downloaded() || target_time > self.last_downloaded
    }

    /// Advance `last_downloaded`; never moves backwards.
    ///
    /// Returns `true` if the value changed.
    pub fn advance_last_downloaded(&mut self, target_time: i64) -> bool {
        if target_time > self.last_downloaded {
            self.last_downloaded = target_time;
            true
        } else {
            false
        }
    }
}

/// Identity of a realm: (region name, slug).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RealmKey {
    pub region: RegionName,
    pub slug: RealmSlug,
}

impl RealmKey {
    pub fn new(region: &str, slug: &str) -> Self {
        Self { region: region.to_string(), slug: slug.to_string() }
    }
}

impl std::fmt::Display for RealmKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.region, self.slug)
    }
}

/// Read-only table of configured regions, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct RegionTable {
    regions: Vec<Region>,
}

impl RegionTable {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn primary(&self) -> Option<&Region> {
        self.regions.iter().find(|r| r.primary)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }
}

/// Per-region realm lists with their `last_downloaded` timestamps.
///
/// The realm set is fixed once populated; only `last_downloaded` moves, and
/// only forward.
#[derive(Debug, Default)]
pub struct StatusTable {
    realms: RwLock<BTreeMap<RegionName, Vec<Realm>>>,
}

impl StatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the realm list for a region, replacing any previous list.
    pub fn set_realms(&self, region: &str, mut realms: Vec<Realm>) {
        realms.sort_by(|a, b| a.slug.cmp(&b.slug));
        self.realms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(region.to_string(), realms);
    }

    /// Snapshot of a region's realms, or `None` if the region is unknown.
    pub fn realms(&self, region: &str) -> Option<Vec<Realm>> {
        self.realms.read().unwrap_or_else(PoisonError::into_inner).get(region).cloned()
    }

    pub fn realm(&self, region: &str, slug: &str) -> Option<Realm> {
        self.realms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(region)?
            .iter()
            .find(|r| r.slug == slug)
            .cloned()
    }

    pub fn has_region(&self, region: &str) -> bool {
        self.realms.read().unwrap_or_else(PoisonError::into_inner).contains_key(region)
    }

    /// All realms across regions, region-ordered.
    pub fn all_realms(&self) -> Vec<Realm> {
        self.realms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flat_map(|realms| realms.iter().cloned())
            .collect()
    }

    /// Advance a realm's `last_downloaded`. Returns `true` if it moved.
    pub fn advance_last_downloaded(&self, key: &RealmKey, target_time: i64) -> bool {
        let mut guard = self.realms.write().unwrap_or_else(PoisonError::into_inner);
        guard
            .get_mut(&key.region)
            .and_then(|realms| realms.iter_mut().find(|r| r.slug == key.slug))
            .is_some_and(|realm| realm.advance_last_downloaded(target_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_downloaded_is_monotonic() {
        let mut realm = Realm::new("us", "earthen-ring", "Earthen Ring");
        assert!(realm.is_stale_against(1));
        assert!(realm.advance_last_downloaded(100));
        assert!(!realm.advance_last_downloaded(100));
        assert!(!realm.advance_last_downloaded(50));
        assert_eq!(realm.last_downloaded, 100);
        assert!(!realm.is_stale_against(100));
        assert!(realm.is_stale_against(101));
    }

    #[test]
    fn status_table_updates_in_place() {
        let table = StatusTable::new();
        table.set_realms("us", vec![Realm::new("us", "b", "B"), Realm::new("us", "a", "A")]);
        let realms = table.realms("us").unwrap();
        assert_eq!(realms[0].slug, "a");

        let key = RealmKey::new("us", "b");
        assert!(table.advance_last_downloaded(&key, 10));
        assert!(!table.advance_last_downloaded(&key, 5));
        assert_eq!(table.realm("us", "b").unwrap().last_downloaded, 10);
        assert!(!table.advance_last_downloaded(&RealmKey::new("eu", "b"), 10));
        assert!(table.realms("eu").is_none());
    }

    #[test]
    fn region_table_primary_lookup() {
        let table = RegionTable::new(vec![
            Region { name: "eu".into(), hostname: "eu.example".into(), primary: false },
            Region { name: "us".into(), hostname: "us.example".into(), primary: true },
        ]);
        assert_eq!(table.primary().unwrap().name, "us");
        assert!(table.get("kr").is_none());
    }
}
