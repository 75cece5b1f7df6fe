//! # ahx-api
//!
//! Query surface of the auction-house pipeline over the messaging bus.
//!
//! # Architecture
//!
//! ```text
//! Messenger ──► Listener(subject) ──► spawn_blocking(handler) ──► reply envelope
//!                 ▲
//! ListenerSet ────┘ start all / stop in sequence
//! ```
//!
//! Handlers are grouped by the process that owns the data they read:
//!
//! - [`handlers::core_handlers`]: status, boot, items, realm dates, ids
//! - [`handlers::live_auction_handlers`]: auctions, owners, price list
//! - [`handlers::history_handlers`]: price list history
//! - [`handlers::intake_handlers`]: distributed ingest
//! - [`handlers::test_handlers`]: `genericTestErrors`

pub mod error;
pub mod handlers;
pub mod listener;
pub mod requests;
pub mod state;

pub use error::HandlerError;
pub use listener::{HandlerFn, Listener, ListenerSet};
pub use state::ApiState;
