//! Upstream game-data API client.
//!
//! Endpoints (all take `?access_token=`):
//!
//! ```text
//! {scheme}://{hostname}/wow/auction/data/{slug}   auction-info descriptor
//! {scheme}://{hostname}/wow/realm/status          realm list
//! {scheme}://{hostname}/wow/item/{id}             item record
//! {scheme}://{hostname}/wow/data/item/classes     item classes
//! ```

pub mod auth;

use std::sync::Arc;

use ahx_core::time_util::millis_to_unix;
use ahx_core::types::{AuctionInfo, AuctionsResponse, ItemId, Realm, RealmKey, Region, UpstreamItem};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::FetchError;
use crate::fetch::{Downloader, redact};

/// Result of a staleness-checked auction fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum AuctionsFetch {
    /// The descriptor's modification time is not after `last_downloaded`.
    Unchanged,
    Fresh { target_time: i64, snapshot: AuctionsResponse },
}

#[derive(Debug, Deserialize)]
struct RealmStatusResponse {
    #[serde(default)]
    realms: Vec<RealmStatusEntry>,
}

#[derive(Debug, Deserialize)]
struct RealmStatusEntry {
    name: String,
    slug: String,
}

pub struct BlizzardClient {
    downloader: Arc<dyn Downloader>,
    scheme: String,
}

impl BlizzardClient {
    pub fn new(downloader: Arc<dyn Downloader>, scheme: &str) -> Self {
        Self { downloader, scheme: scheme.to_string() }
    }

    pub fn downloader(&self) -> &Arc<dyn Downloader> {
        &self.downloader
    }

    fn endpoint(&self, region: &Region, path: &str, token: &str) -> Result<String, FetchError> {
        if region.hostname.is_empty() {
            return Err(FetchError::EmptyRegion(region.name.clone()));
        }
        let mut url = Url::parse(&format!("{}://{}{path}", self.scheme, region.hostname))?;
        url.query_pairs_mut().append_pair("access_token", token);
        Ok(url.into())
    }

    pub fn auction_info_url(&self, region: &Region, slug: &str, token: &str) -> Result<String, FetchError> {
        self.endpoint(region, &format!("/wow/auction/data/{slug}"), token)
    }

    pub fn realm_status_url(&self, region: &Region, token: &str) -> Result<String, FetchError> {
        self.endpoint(region, "/wow/realm/status", token)
    }

    pub fn item_url(&self, region: &Region, item_id: ItemId, token: &str) -> Result<String, FetchError> {
        self.endpoint(region, &format!("/wow/item/{item_id}"), token)
    }

    pub fn item_classes_url(&self, region: &Region, token: &str) -> Result<String, FetchError> {
        self.endpoint(region, "/wow/data/item/classes", token)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = self.downloader.download(url).await?;
        if !resp.is_ok() {
            return Err(FetchError::Status { url: redact(url), status: resp.status });
        }
        Ok(resp.body)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let body = self.get_bytes(url).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Follow the realm's auction-info descriptor to its first snapshot, if
    /// that snapshot is newer than `realm.last_downloaded`.
    ///
    /// The realm identity inside the snapshot is ignored; the caller's realm
    /// is authoritative.
    pub async fn fetch_auctions(&self, region: &Region, realm: &Realm, token: &str) -> Result<AuctionsFetch, FetchError> {
        let info: AuctionInfo = self.get_json(&self.auction_info_url(region, &realm.slug, token)?).await?;
        let file = info
            .files
            .first()
            .ok_or_else(|| FetchError::EmptyFiles(RealmKey::new(&region.name, &realm.slug)))?;

        let target_time = millis_to_unix(file.last_modified);
        if !realm.is_stale_against(target_time) {
            debug!(region = %region.name, realm = %realm.slug, "[upstream] no new data at {target_time}");
            return Ok(AuctionsFetch::Unchanged);
        }

        let snapshot: AuctionsResponse = self.get_json(&file.url).await?;
        Ok(AuctionsFetch::Fresh { target_time, snapshot })
    }

    /// All realms the upstream lists for a region, `last_downloaded = 0`.
    pub async fn fetch_realms(&self, region: &Region, token: &str) -> Result<Vec<Realm>, FetchError> {
        let resp: RealmStatusResponse = self.get_json(&self.realm_status_url(region, token)?).await?;
        Ok(resp.realms.into_iter().map(|r| Realm::new(&region.name, r.slug, r.name)).collect())
    }

    pub async fn fetch_item(&self, region: &Region, item_id: ItemId, token: &str) -> Result<UpstreamItem, FetchError> {
        self.get_json(&self.item_url(region, item_id, token)?).await
    }

    /// Item class tree, passed through verbatim to the boot payload.
    pub async fn fetch_item_classes(&self, region: &Region, token: &str) -> Result<serde_json::Value, FetchError> {
        self.get_json(&self.item_classes_url(region, token)?).await
    }

    /// Raw bytes at an absolute URL (icons).
    pub async fn fetch_raw(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.get_bytes(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::DownloadResponse;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    struct Canned(HashMap<String, (u16, String)>);

    #[async_trait]
    impl Downloader for Canned {
        async fn download(&self, url: &str) -> Result<DownloadResponse, FetchError> {
            let (status, body) = self.0.get(url).cloned().unwrap_or((404, String::new()));
            Ok(DownloadResponse {
                content_length: body.len(),
                body: body.into_bytes(),
                conn_duration: Duration::ZERO,
                req_duration: Duration::ZERO,
                status,
            })
        }
    }

    fn region() -> Region {
        Region { name: "us".into(), hostname: "us.api.test".into(), primary: true }
    }

    fn client(entries: &[(&str, u16, &str)]) -> BlizzardClient {
        let map = entries.iter().map(|(u, s, b)| (u.to_string(), (*s, b.to_string()))).collect();
        BlizzardClient::new(Arc::new(Canned(map)), "https")
    }

    const INFO_URL: &str = "https://us.api.test/wow/auction/data/earthen-ring?access_token=t";

    #[tokio::test]
    async fn fresh_then_unchanged() {
        let c = client(&[
            (INFO_URL, 200, r#"{"files":[{"url":"https://dump.test/a.json","lastModified":1700000000000}]}"#),
            (
                "https://dump.test/a.json",
                200,
                r#"{"realms":[{"name":"Other","slug":"other"}],"auctions":[{"auc":1,"item":25,"owner":"A","ownerRealm":"Earthen Ring","bid":10,"buyout":20,"quantity":2,"timeLeft":"SHORT","rand":0,"seed":0,"context":0}]}"#,
            ),
        ]);
        let mut realm = Realm::new("us", "earthen-ring", "Earthen Ring");

        let AuctionsFetch::Fresh { target_time, snapshot } = c.fetch_auctions(&region(), &realm, "t").await.unwrap()
        else {
            panic!("expected fresh data");
        };
        assert_eq!(target_time, 1700000000);
        assert_eq!(snapshot.auctions.len(), 1);

        realm.advance_last_downloaded(target_time);
        assert_eq!(c.fetch_auctions(&region(), &realm, "t").await.unwrap(), AuctionsFetch::Unchanged);
    }

    #[tokio::test]
    async fn empty_files_and_bad_status_are_errors() {
        let c = client(&[(INFO_URL, 200, r#"{"files":[]}"#)]);
        let realm = Realm::new("us", "earthen-ring", "Earthen Ring");
        assert!(matches!(c.fetch_auctions(&region(), &realm, "t").await, Err(FetchError::EmptyFiles(_))));

        let missing = Realm::new("us", "stormrage", "Stormrage");
        let err = c.fetch_auctions(&region(), &missing, "t").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));

        let blank = Region { hostname: String::new(), ..region() };
        assert!(matches!(c.fetch_auctions(&blank, &realm, "t").await, Err(FetchError::EmptyRegion(_))));
    }

    #[test]
    fn urls_carry_token() {
        let c = client(&[]);
        assert_eq!(c.item_url(&region(), 25, "a b").unwrap(), "https://us.api.test/wow/item/25?access_token=a+b");
        assert_eq!(c.realm_status_url(&region(), "t").unwrap(), "https://us.api.test/wow/realm/status?access_token=t");
    }
}
