//! # ahx-store
//!
//! Persistence for the auction-house pipeline:
//!
//! - **Blob gateway** (`blob`): raw snapshots, history shard backups, item
//!   records and icons in an object store (local directory, memory or GCS)
//! - **Live auctions** (`live_auctions`): one redb file per realm holding the
//!   current mini-auction list
//! - **Pricelist history** (`pricelist_history`): one redb file per
//!   (realm, UTC week) mapping item id → price history
//! - **Items** (`items`): process-wide item catalog with fuzzy search
//! - **Ingest** (`ingest`): snapshot → live auctions + price history
//!
//! # Layout on disk
//!
//! ```text
//! {cache_dir}/live-auctions/{region}/{slug}.db
//! {cache_dir}/pricelist-histories/{region}/{slug}/{week_start}.db
//! {cache_dir}/items/items.db
//! {cache_dir}/blobs/{bucket}/...        (local blob backend)
//! ```

pub mod blob;
pub mod error;
pub mod ingest;
pub mod items;
pub mod live_auctions;
pub mod pricelist_history;

pub use blob::{BlobBackend, BlobStore, Bucket, WriteOptions};
pub use error::StoreError;
pub use items::{ItemSearchResult, ItemsStore};
pub use live_auctions::{AuctionsPage, AuctionsQuery, LiveAuctionsStore};
pub use pricelist_history::PricelistHistoryStore;
