//! Read-side state shared by every handler.

use std::sync::Arc;

use ahx_core::config::AppConfig;
use ahx_core::types::{Realm, RealmKey, RegionTable, StatusTable};
use ahx_store::{BlobStore, ItemsStore, LiveAuctionsStore, PricelistHistoryStore};
use uuid::Uuid;

use crate::error::HandlerError;

/// Stores are optional because each process opens only the files it owns.
pub struct ApiState {
    pub config: Arc<AppConfig>,
    pub regions: Arc<RegionTable>,
    pub status: Arc<StatusTable>,
    pub blobs: Arc<BlobStore>,
    pub live: Option<Arc<LiveAuctionsStore>>,
    pub history: Option<Arc<PricelistHistoryStore>>,
    pub items: Option<Arc<ItemsStore>>,
    /// Upstream item class tree for the boot payload.
    pub item_classes: serde_json::Value,
    /// Unique per process start.
    pub session_secret: Uuid,
    pub run_id: Uuid,
}

impl ApiState {
    pub fn new(
        config: Arc<AppConfig>,
        regions: Arc<RegionTable>,
        status: Arc<StatusTable>,
        blobs: Arc<BlobStore>,
    ) -> Self {
        Self {
            config,
            regions,
            status,
            blobs,
            live: None,
            history: None,
            items: None,
            item_classes: serde_json::Value::Null,
            session_secret: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn with_live(mut self, live: Arc<LiveAuctionsStore>) -> Self {
        self.live = Some(live);
        self
    }

    pub fn with_history(mut self, history: Arc<PricelistHistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_items(mut self, items: Arc<ItemsStore>) -> Self {
        self.items = Some(items);
        self
    }

    pub fn with_item_classes(mut self, item_classes: serde_json::Value) -> Self {
        self.item_classes = item_classes;
        self
    }

    /// Look up a realm; unknown region or realm is `not-found`.
    pub fn resolve_realm(&self, region_name: &str, realm_slug: &str) -> Result<Realm, HandlerError> {
        if region_name.is_empty() {
            return Err(HandlerError::user("region_name is required"));
        }
        if realm_slug.is_empty() {
            return Err(HandlerError::user("realm_slug is required"));
        }
        if !self.status.has_region(region_name) {
            return Err(HandlerError::not_found(format!("region {region_name} not found")));
        }
        self.status
            .realm(region_name, realm_slug)
            .ok_or_else(|| HandlerError::not_found(format!("realm {region_name}/{realm_slug} not found")))
    }

    pub fn resolve_realm_key(&self, region_name: &str, realm_slug: &str) -> Result<RealmKey, HandlerError> {
        Ok(self.resolve_realm(region_name, realm_slug)?.key())
    }

    pub fn live(&self) -> Result<&LiveAuctionsStore, HandlerError> {
        self.live.as_deref().ok_or_else(|| HandlerError::generic("live auctions are not served here"))
    }

    pub fn history(&self) -> Result<&PricelistHistoryStore, HandlerError> {
        self.history.as_deref().ok_or_else(|| HandlerError::generic("pricelist histories are not served here"))
    }

    pub fn items(&self) -> Result<&ItemsStore, HandlerError> {
        self.items.as_deref().ok_or_else(|| HandlerError::generic("items are not served here"))
    }
}
