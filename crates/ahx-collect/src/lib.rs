//! # ahx-collect
//!
//! Upstream ingestion for the auction-house pipeline.
//!
//! # Architecture
//!
//! ```text
//! Ticker ──► Collector::collect()
//!              ├─ tokens.token()                       (AccessTokenSource)
//!              ├─ fetch pool ×4  ──► BlizzardClient::fetch_auctions (Downloader)
//!              ├─ store pool ×4  ──► raw blob, live auctions, price history
//!              │                     (or intake publish in distributed mode)
//!              ├─ item pool ×8   ──► missing items → ItemsStore + item blobs
//!              ├─ icon pool ×8   ──► missing icons → icon blobs → icon_url
//!              └─ metrics        ──► appMetrics
//! ```

pub mod collector;
pub mod error;
pub mod fetch;
pub mod realms;
pub mod schedule;
pub mod upstream;

pub use collector::{CollectMetrics, Collector};
pub use error::FetchError;
pub use fetch::{DownloadResponse, Downloader, ReqwestDownloader};
pub use schedule::Ticker;
pub use upstream::auth::{AccessTokenSource, ClientCredentials, StaticToken};
pub use upstream::{AuctionsFetch, BlizzardClient};
