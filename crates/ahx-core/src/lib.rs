//! # ahx-core
//!
//! Core crate for the auction-house pipeline, providing:
//!
//! - **Types** (`types`): regions, realms, upstream auctions, mini-auctions, items, price points
//! - **Configuration** (`config`): JSON config deserialization and validation
//! - **Error types** (`error`): domain-specific `AhxError` and the wire `ErrorCode`
//! - **Messaging** (`bus`): request/reply + pub/sub capability with local and NATS adapters
//! - **Worker pool** (`work`): fixed-size thread fan-out with a single post-work hook
//! - **Deduplication** (`dedup`): raw auction list → mini-auction normalization
//! - **Names** (`names`): name normalization and fuzzy ranking
//! - **Codec** (`codec`): gzip and gzip+base64 payload helpers
//! - **Time utilities** (`time_util`): UNIX seconds and UTC week bucketing
//! - **Logging** (`logging`): tracing-based structured logging

pub mod bus;
pub mod codec;
pub mod config;
pub mod dedup;
pub mod error;
pub mod logging;
pub mod names;
pub mod time_util;
pub mod types;
pub mod work;

// Re-export types at crate root for convenience.
pub use types::*;
