//! Object store gateway.
//!
//! Four fixed buckets, each with a deterministic object naming scheme:
//!
//! | Bucket                | Object name                                  |
//! |-----------------------|----------------------------------------------|
//! | `raw-auctions`        | `{region}/{slug}/{unix_seconds}.json.gz`     |
//! | `pricelist-histories` | `{region}/{slug}/next-{week_start_unix}.db`  |
//! | `items`               | `{item_id}.json.gz`                          |
//! | `item-icons`          | `{icon_key}.jpg`                             |
//!
//! Buckets are opened lazily through [`BlobStore::get_or_create_bucket`] and
//! cached for the life of the process. On GCS the `item-icons` client sends
//! `x-goog-acl: public-read` with every request, so each icon is
//! world-readable from the moment it is written.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use ahx_core::codec;
use ahx_core::types::{AuctionsResponse, Item, ItemId, RealmKey};
use bytes::Bytes;
use futures_util::TryStreamExt;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{Attribute, Attributes, ClientOptions, ObjectStore, PutOptions, PutPayload};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, info};

use crate::error::StoreError;

pub const RAW_AUCTIONS_BUCKET: &str = "raw-auctions";
pub const PRICELIST_HISTORIES_BUCKET: &str = "pricelist-histories";
pub const ITEMS_BUCKET: &str = "items";
pub const ITEM_ICONS_BUCKET: &str = "item-icons";

const GOOG_ACL: HeaderName = HeaderName::from_static("x-goog-acl");

// ---------------------------------------------------------------------------
// Object naming
// ---------------------------------------------------------------------------

pub fn raw_auctions_object(realm: &RealmKey, unix_seconds: i64) -> String {
    format!("{}/{}/{unix_seconds}.json.gz", realm.region, realm.slug)
}

pub fn raw_auctions_prefix(realm: &RealmKey) -> String {
    format!("{}/{}/", realm.region, realm.slug)
}

/// Inverse of [`raw_auctions_object`]: `(region, slug, unix_seconds)`.
pub fn parse_raw_auctions_object(name: &str) -> Option<(String, String, i64)> {
    let mut parts = name.split('/');
    let region = parts.next()?;
    let slug = parts.next()?;
    let file = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let ts = file.strip_suffix(".json.gz")?.parse().ok()?;
    Some((region.to_string(), slug.to_string(), ts))
}

pub fn pricelist_history_object(realm: &RealmKey, week_start_unix: i64) -> String {
    format!("{}/{}/next-{week_start_unix}.db", realm.region, realm.slug)
}

pub fn item_object(item_id: ItemId) -> String {
    format!("{item_id}.json.gz")
}

pub fn icon_object(icon_key: &str) -> String {
    format!("{icon_key}.jpg")
}

// ---------------------------------------------------------------------------
// Backends and buckets
// ---------------------------------------------------------------------------

/// Which object store product backs the buckets.
#[derive(Debug, Clone)]
pub enum BlobBackend {
    /// One directory per bucket under this root.
    Local(PathBuf),
    /// Process-local, for tests and `api-test`.
    Memory,
    /// Google Cloud Storage; credentials come from the environment. Bucket
    /// names are prefixed with `{project_id}-` when a project is given.
    Gcs { project_id: Option<String> },
}

/// Canned ACL the GCS backend applies to objects written into `bucket`.
pub fn gcs_canned_acl(bucket: &str) -> Option<&'static str> {
    (bucket == ITEM_ICONS_BUCKET).then_some("public-read")
}

fn gcs_default_headers(bucket: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(acl) = gcs_canned_acl(bucket) {
        headers.insert(GOOG_ACL, HeaderValue::from_static(acl));
    }
    headers
}

/// Per-write metadata.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
}

impl WriteOptions {
    pub fn gzip_json() -> Self {
        Self {
            content_type: Some("application/json".into()),
            content_encoding: Some("gzip".into()),
            cache_control: None,
        }
    }

    pub fn public_jpeg() -> Self {
        Self {
            content_type: Some("image/jpeg".into()),
            content_encoding: None,
            cache_control: Some("public, max-age=86400".into()),
        }
    }

    fn attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        if let Some(ct) = &self.content_type {
            attrs.insert(Attribute::ContentType, ct.clone().into());
        }
        if let Some(ce) = &self.content_encoding {
            attrs.insert(Attribute::ContentEncoding, ce.clone().into());
        }
        if let Some(cc) = &self.cache_control {
            attrs.insert(Attribute::CacheControl, cc.clone().into());
        }
        attrs
    }
}

/// A single opened bucket.
#[derive(Clone)]
pub struct Bucket {
    name: String,
    store: Arc<dyn ObjectStore>,
    url_base: String,
    /// The local filesystem backend rejects object attributes.
    attributes: bool,
}

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub name: String,
    pub size: usize,
}

impl Bucket {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn exists(&self, object: &str) -> Result<bool, StoreError> {
        match self.store.head(&Path::from(object)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read(&self, object: &str) -> Result<Bytes, StoreError> {
        match self.store.get(&Path::from(object)).await {
            Ok(result) => Ok(result.bytes().await?),
            Err(object_store::Error::NotFound { .. }) => {
                Err(StoreError::NotFound(format!("{}/{object}", self.name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write(&self, object: &str, data: Vec<u8>, opts: &WriteOptions) -> Result<(), StoreError> {
        let put = PutOptions {
            attributes: if self.attributes { opts.attributes() } else { Attributes::new() },
            ..Default::default()
        };
        self.store.put_opts(&Path::from(object), PutPayload::from(data), put).await?;
        debug!("[blob] wrote {}/{object}", self.name);
        Ok(())
    }

    /// Objects whose name starts with `prefix` (a `/`-terminated directory).
    pub async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StoreError> {
        let prefix = prefix.trim_end_matches('/');
        let prefix = (!prefix.is_empty()).then(|| Path::from(prefix));
        let metas: Vec<_> = self.store.list(prefix.as_ref()).try_collect().await?;
        let mut entries: Vec<ObjectEntry> = metas
            .into_iter()
            .map(|m| ObjectEntry { name: m.location.to_string(), size: m.size })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub async fn delete(&self, object: &str) -> Result<(), StoreError> {
        match self.store.delete(&Path::from(object)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// URL under which an object is served.
    pub fn public_url(&self, object: &str) -> String {
        format!("{}/{object}", self.url_base)
    }
}

// ---------------------------------------------------------------------------
// BlobStore
// ---------------------------------------------------------------------------

/// Opens and caches buckets for one backend.
pub struct BlobStore {
    backend: BlobBackend,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl BlobStore {
    pub fn new(backend: BlobBackend) -> Self {
        Self { backend, buckets: Mutex::new(HashMap::new()) }
    }

    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self::new(BlobBackend::Local(root.into()))
    }

    pub fn memory() -> Self {
        Self::new(BlobBackend::Memory)
    }

    pub fn backend(&self) -> &BlobBackend {
        &self.backend
    }

    /// Return the cached bucket handle, opening (and for local storage,
    /// creating) it on first use.
    pub fn get_or_create_bucket(&self, name: &str) -> Result<Bucket, StoreError> {
        let mut cache = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bucket) = cache.get(name) {
            return Ok(bucket.clone());
        }

        let bucket = match &self.backend {
            BlobBackend::Local(root) => {
                let dir = root.join(name);
                std::fs::create_dir_all(&dir)?;
                Bucket {
                    name: name.to_string(),
                    store: Arc::new(LocalFileSystem::new_with_prefix(&dir)?),
                    url_base: format!("file://{}", dir.display()),
                    attributes: false,
                }
            }
            BlobBackend::Memory => Bucket {
                name: name.to_string(),
                store: Arc::new(InMemory::new()),
                url_base: format!("memory://{name}"),
                attributes: true,
            },
            BlobBackend::Gcs { project_id } => {
                let full_name = match project_id {
                    Some(project) => format!("{project}-{name}"),
                    None => name.to_string(),
                };
                let options = ClientOptions::new().with_default_headers(gcs_default_headers(name));
                let store = GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(&full_name)
                    .with_client_options(options)
                    .build()?;
                Bucket {
                    name: full_name.clone(),
                    store: Arc::new(store),
                    url_base: format!("https://storage.googleapis.com/{full_name}"),
                    attributes: true,
                }
            }
        };

        info!("[blob] opened bucket {}", bucket.name);
        cache.insert(name.to_string(), bucket.clone());
        Ok(bucket)
    }

    // -- raw auctions ------------------------------------------------------

    pub async fn write_raw_auctions(
        &self,
        realm: &RealmKey,
        target_time: i64,
        snapshot: &AuctionsResponse,
    ) -> Result<(), StoreError> {
        let data = codec::to_gzip_json(snapshot)?;
        self.get_or_create_bucket(RAW_AUCTIONS_BUCKET)?
            .write(&raw_auctions_object(realm, target_time), data, &WriteOptions::gzip_json())
            .await
    }

    pub async fn read_raw_auctions(&self, realm: &RealmKey, target_time: i64) -> Result<AuctionsResponse, StoreError> {
        let raw = self
            .get_or_create_bucket(RAW_AUCTIONS_BUCKET)?
            .read(&raw_auctions_object(realm, target_time))
            .await?;
        Ok(codec::from_gzip_json(&raw)?)
    }

    /// Timestamps of every stored raw snapshot for a realm, ascending.
    pub async fn raw_auction_timestamps(&self, realm: &RealmKey) -> Result<Vec<i64>, StoreError> {
        let entries = self
            .get_or_create_bucket(RAW_AUCTIONS_BUCKET)?
            .list(&raw_auctions_prefix(realm))
            .await?;
        let mut stamps: Vec<i64> = entries
            .iter()
            .filter_map(|e| parse_raw_auctions_object(&e.name))
            .map(|(_, _, ts)| ts)
            .collect();
        stamps.sort_unstable();
        Ok(stamps)
    }

    /// Newest raw snapshot timestamp for a realm, `0` when none.
    pub async fn latest_raw_auctions(&self, realm: &RealmKey) -> Result<i64, StoreError> {
        Ok(self.raw_auction_timestamps(realm).await?.last().copied().unwrap_or(0))
    }

    /// Delete raw snapshots older than `cutoff`; returns the count removed.
    pub async fn prune_raw_auctions(&self, cutoff: i64) -> Result<usize, StoreError> {
        let bucket = self.get_or_create_bucket(RAW_AUCTIONS_BUCKET)?;
        let mut removed = 0;
        for entry in bucket.list("").await? {
            let Some((_, _, ts)) = parse_raw_auctions_object(&entry.name) else {
                continue;
            };
            if ts < cutoff {
                bucket.delete(&entry.name).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    // -- history shard backups ---------------------------------------------

    pub async fn write_pricelist_history(
        &self,
        realm: &RealmKey,
        week_start_unix: i64,
        data: Vec<u8>,
    ) -> Result<(), StoreError> {
        let opts = WriteOptions { content_type: Some("application/octet-stream".into()), ..Default::default() };
        self.get_or_create_bucket(PRICELIST_HISTORIES_BUCKET)?
            .write(&pricelist_history_object(realm, week_start_unix), data, &opts)
            .await
    }

    // -- items and icons ---------------------------------------------------

    pub async fn write_item(&self, item: &Item) -> Result<(), StoreError> {
        let data = codec::to_gzip_json(item)?;
        self.get_or_create_bucket(ITEMS_BUCKET)?
            .write(&item_object(item.id), data, &WriteOptions::gzip_json())
            .await
    }

    pub async fn icon_exists(&self, icon_key: &str) -> Result<bool, StoreError> {
        self.get_or_create_bucket(ITEM_ICONS_BUCKET)?.exists(&icon_object(icon_key)).await
    }

    /// Store an icon world-readable and return its URL.
    pub async fn write_icon(&self, icon_key: &str, jpeg: Vec<u8>) -> Result<String, StoreError> {
        let bucket = self.get_or_create_bucket(ITEM_ICONS_BUCKET)?;
        let object = icon_object(icon_key);
        bucket.write(&object, jpeg, &WriteOptions::public_jpeg()).await?;
        Ok(bucket.public_url(&object))
    }

    pub fn icon_url(&self, icon_key: &str) -> Result<String, StoreError> {
        Ok(self.get_or_create_bucket(ITEM_ICONS_BUCKET)?.public_url(&icon_object(icon_key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahx_core::types::{Auction, SnapshotRealm};
    use object_store::AttributeValue;

    fn realm() -> RealmKey {
        RealmKey::new("us", "earthen-ring")
    }

    fn snapshot() -> AuctionsResponse {
        AuctionsResponse {
            realms: vec![SnapshotRealm { name: "Earthen Ring".into(), slug: "earthen-ring".into() }],
            auctions: vec![Auction {
                auc: 1,
                item: 25,
                owner: "A".into(),
                owner_realm: "Earthen Ring".into(),
                bid: 10,
                buyout: 20,
                quantity: 2,
                time_left: "SHORT".into(),
                rand: 0,
                seed: 0,
                context: 0,
            }],
        }
    }

    #[test]
    fn object_names() {
        assert_eq!(raw_auctions_object(&realm(), 1700000000), "us/earthen-ring/1700000000.json.gz");
        assert_eq!(pricelist_history_object(&realm(), 1699833600), "us/earthen-ring/next-1699833600.db");
        assert_eq!(item_object(25), "25.json.gz");
        assert_eq!(icon_object("inv_sword_04"), "inv_sword_04.jpg");
        assert_eq!(
            parse_raw_auctions_object("us/earthen-ring/1700000000.json.gz"),
            Some(("us".into(), "earthen-ring".into(), 1700000000))
        );
        assert_eq!(parse_raw_auctions_object("us/earthen-ring/next-1.db"), None);
    }

    #[tokio::test]
    async fn raw_snapshots_on_local_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::local(dir.path());

        assert_eq!(store.latest_raw_auctions(&realm()).await.unwrap(), 0);
        store.write_raw_auctions(&realm(), 1700000000, &snapshot()).await.unwrap();
        store.write_raw_auctions(&realm(), 1700001200, &snapshot()).await.unwrap();

        assert_eq!(store.latest_raw_auctions(&realm()).await.unwrap(), 1700001200);
        let back = store.read_raw_auctions(&realm(), 1700000000).await.unwrap();
        assert_eq!(back, snapshot());

        assert_eq!(store.prune_raw_auctions(1700001000).await.unwrap(), 1);
        assert_eq!(store.raw_auction_timestamps(&realm()).await.unwrap(), vec![1700001200]);
    }

    #[tokio::test]
    async fn icons_are_write_if_absent() {
        let store = BlobStore::memory();
        assert!(!store.icon_exists("inv_sword_04").await.unwrap());
        let url = store.write_icon("inv_sword_04", vec![0xff, 0xd8]).await.unwrap();
        assert_eq!(url, "memory://item-icons/inv_sword_04.jpg");
        assert!(store.icon_exists("inv_sword_04").await.unwrap());
        assert_eq!(store.icon_url("inv_sword_04").unwrap(), url);
    }

    #[test]
    fn only_icons_are_public_on_gcs() {
        let headers = gcs_default_headers(ITEM_ICONS_BUCKET);
        assert_eq!(headers.get("x-goog-acl").and_then(|v| v.to_str().ok()), Some("public-read"));

        for bucket in [RAW_AUCTIONS_BUCKET, PRICELIST_HISTORIES_BUCKET, ITEMS_BUCKET] {
            assert_eq!(gcs_canned_acl(bucket), None);
            assert!(gcs_default_headers(bucket).is_empty());
        }
    }

    #[tokio::test]
    async fn icon_writes_carry_jpeg_metadata() {
        let store = BlobStore::memory();
        store.write_icon("inv_sword_04", vec![0xff, 0xd8]).await.unwrap();
        let bucket = store.get_or_create_bucket(ITEM_ICONS_BUCKET).unwrap();
        let got = bucket.store.get(&Path::from("inv_sword_04.jpg")).await.unwrap();
        assert_eq!(got.attributes.get(&Attribute::ContentType), Some(&AttributeValue::from("image/jpeg")));
        assert!(got.attributes.get(&Attribute::CacheControl).is_some());
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = BlobStore::memory();
        let err = store.read_raw_auctions(&realm(), 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
