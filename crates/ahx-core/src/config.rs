//! Configuration parsing for the auction-house pipeline.
//!
//! Every process reads the same JSON config file. The `regions` array is the
//! closed set of upstream regions; `whitelist` narrows the realms collected
//! per region.
//!
//! # Example config
//!
//! ```json
//! {
//!   "client_id": "...",
//!   "client_secret": "...",
//!   "regions": [{ "name": "us", "hostname": "us.api.blizzard.com", "primary": true }],
//!   "whitelist": { "us": { "earthen-ring": true } },
//!   "cache_dir": "/var/cache/ahx",
//!   "use_gcloud": false,
//!   "expansions": [{ "name": "bfa", "label": "Battle for Azeroth", "primary": true }],
//!   "professions": [{ "name": "alchemy", "label": "Alchemy", "icon": "trade_alchemy" }],
//!   "item_blacklist": [25]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AhxError;
use crate::types::{ItemId, Region, RegionName};

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Upstream OAuth client id (overridable by `CLIENT_ID`).
    #[serde(default)]
    pub client_id: String,

    /// Upstream OAuth client secret (overridable by `CLIENT_SECRET`).
    #[serde(default)]
    pub client_secret: String,

    /// Closed set of regions; exactly one is primary.
    pub regions: Vec<Region>,

    /// Per-region realm whitelist. A missing or `null` entry disables
    /// whitelisting for that region; an empty map excludes every realm.
    #[serde(default)]
    pub whitelist: BTreeMap<RegionName, Option<BTreeMap<String, serde_json::Value>>>,

    /// Root directory for embedded databases and the local blob store.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Use Google Cloud Storage instead of the local blob store.
    #[serde(default)]
    pub use_gcloud: bool,

    #[serde(default)]
    pub expansions: Vec<Expansion>,

    #[serde(default)]
    pub professions: Vec<Profession>,

    /// Item ids that are never fetched into the items catalog.
    #[serde(default)]
    pub item_blacklist: Vec<ItemId>,

    /// History shards older than this many weeks are deleted.
    #[serde(default = "default_retention_weeks")]
    pub pricelist_history_retention_weeks: u32,

    /// Collector period.
    #[serde(default = "default_collect_interval")]
    pub collect_interval_secs: u64,

    /// History pruner period.
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,

    /// Whether the collector writes the derived stores itself or hands the
    /// snapshot to intake processes over the bus.
    #[serde(default)]
    pub ingest: IngestMode,

    #[serde(default = "default_oauth_url")]
    pub oauth_url: String,

    /// Upstream icon URL; `{icon}` is substituted with the icon key.
    #[serde(default = "default_icon_url_template")]
    pub icon_url_template: String,

    /// Scheme used in front of each region hostname.
    #[serde(default = "default_api_scheme")]
    pub api_scheme: String,
}

/// A game expansion as listed in the boot payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expansion {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub label_color: Option<String>,
}

/// A profession as listed in the boot payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profession {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Where the collector sends snapshots after persisting the raw blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Collector writes live-auctions and pricelist-history stores itself.
    #[default]
    Local,
    /// Collector publishes intake messages; dedicated processes ingest.
    Distributed,
}

impl AppConfig {
    /// Validate the region table: non-empty, unique names, one primary.
    pub fn validate(&self) -> Result<(), AhxError> {
        if self.regions.is_empty() {
            return Err(AhxError::Config("no regions configured".into()));
        }

        let mut seen = HashSet::new();
        for region in &self.regions {
            if region.name.is_empty() {
                return Err(AhxError::Config("region with empty name".into()));
            }
            if !seen.insert(region.name.as_str()) {
                return Err(AhxError::Config(format!("duplicate region {}", region.name)));
            }
        }

        let primaries = self.regions.iter().filter(|r| r.primary).count();
        if primaries != 1 {
            return Err(AhxError::Config(format!(
                "expected exactly one primary region, found {primaries}"
            )));
        }

        if self.collect_interval_secs == 0 {
            return Err(AhxError::Config("collect_interval_secs must be positive".into()));
        }

        Ok(())
    }

    /// Returns `true` if the realm is collected under the whitelist rules.
    pub fn is_whitelisted(&self, region: &str, realm_slug: &str) -> bool {
        match self.whitelist.get(region) {
            None | Some(None) => true,
            Some(Some(realms)) => realms.contains_key(realm_slug),
        }
    }

    /// Returns the blacklist as a set for quick subtraction.
    pub fn blacklist(&self) -> HashSet<ItemId> {
        self.item_blacklist.iter().copied().collect()
    }

    pub fn icon_url(&self, icon: &str) -> String {
        self.icon_url_template.replace("{icon}", icon)
    }
}

fn default_retention_weeks() -> u32 {
    4
}

fn default_collect_interval() -> u64 {
    20 * 60
}

fn default_prune_interval() -> u64 {
    60 * 60
}

fn default_oauth_url() -> String {
    "https://us.battle.net/oauth/token".into()
}

fn default_icon_url_template() -> String {
    "https://render-us.worldofwarcraft.com/icons/56/{icon}.jpg".into()
}

fn default_api_scheme() -> String {
    "https".into()
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &Path) -> Result<AppConfig, AhxError> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
