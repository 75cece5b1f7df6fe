//! Subject handlers.
//!
//! Each handler is a plain function `(state, payload) → Result<Message>`;
//! [`bind`] turns it into a [`HandlerFn`] that always yields an envelope.

mod auctions;
mod history;
mod intake;
mod items;
mod status;

use std::sync::Arc;

use ahx_core::bus::{Message, subjects};
use ahx_core::codec;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::HandlerError;
use crate::listener::HandlerFn;
use crate::state::ApiState;

pub use auctions::{auctions, owners, owners_query, owners_query_by_items, price_list};
pub use history::price_list_history;
pub use intake::{live_auctions_intake, pricelist_histories_intake};
pub use items::{items, items_query};
pub use status::{boot, generic_test_errors, realm_modification_dates, runtime_info, session_secret, status};

pub type HandlerResult = Result<Message, HandlerError>;
type Handler = fn(&ApiState, &[u8]) -> HandlerResult;

/// Wrap a handler so failures become error envelopes.
pub fn bind(state: &Arc<ApiState>, subject: &'static str, handler: Handler) -> HandlerFn {
    let state = Arc::clone(state);
    Arc::new(move |payload: &[u8]| match handler(&state, payload) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("[listener:{subject}] {e}");
            e.into_message()
        }
    })
}

fn bind_all(state: &Arc<ApiState>, table: &[(&'static str, Handler)]) -> Vec<(&'static str, HandlerFn)> {
    table.iter().map(|&(subject, handler)| (subject, bind(state, subject, handler))).collect()
}

/// Handlers the `api` process always serves.
pub fn core_handlers(state: &Arc<ApiState>) -> Vec<(&'static str, HandlerFn)> {
    bind_all(
        state,
        &[
            (subjects::STATUS, status),
            (subjects::BOOT, boot),
            (subjects::REALM_MODIFICATION_DATES, realm_modification_dates),
            (subjects::SESSION_SECRET, session_secret),
            (subjects::RUNTIME_INFO, runtime_info),
            (subjects::ITEMS_QUERY, items_query),
            (subjects::ITEMS, items),
        ],
    )
}

/// Handlers reading the live-auctions store.
pub fn live_auction_handlers(state: &Arc<ApiState>) -> Vec<(&'static str, HandlerFn)> {
    bind_all(
        state,
        &[
            (subjects::AUCTIONS, auctions),
            (subjects::OWNERS, owners),
            (subjects::OWNERS_QUERY, owners_query),
            (subjects::OWNERS_QUERY_BY_ITEMS, owners_query_by_items),
            (subjects::PRICE_LIST, price_list),
        ],
    )
}

/// Handlers reading the pricelist-history store.
pub fn history_handlers(state: &Arc<ApiState>) -> Vec<(&'static str, HandlerFn)> {
    bind_all(
        state,
        &[(subjects::PRICE_LIST_HISTORY, price_list_history), (subjects::PRICE_LIST_HISTORY_V2, price_list_history)],
    )
}

/// Intake subscriptions for the distributed ingest processes.
pub fn intake_handlers(state: &Arc<ApiState>, subject: &'static str) -> Vec<(&'static str, HandlerFn)> {
    let handler: Handler = match subject {
        subjects::LIVE_AUCTIONS_INTAKE => live_auctions_intake,
        _ => pricelist_histories_intake,
    };
    bind_all(state, &[(subject, handler)])
}

pub fn test_handlers(state: &Arc<ApiState>) -> Vec<(&'static str, HandlerFn)> {
    bind_all(state, &[(subjects::GENERIC_TEST_ERRORS, generic_test_errors)])
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a request body; any JSON failure is `msg-json-parse-error`.
pub(crate) fn parse<T: DeserializeOwned>(payload: &[u8]) -> Result<T, HandlerError> {
    serde_json::from_slice(payload).map_err(|e| HandlerError::parse(&e))
}

/// Parse a body that may be empty.
pub(crate) fn parse_or_default<T: DeserializeOwned + Default>(payload: &[u8]) -> Result<T, HandlerError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        Ok(T::default())
    } else {
        parse(payload)
    }
}

pub(crate) fn ok_json<T: Serialize>(value: &T) -> HandlerResult {
    let data = serde_json::to_string(value).map_err(|e| HandlerError::generic(e.to_string()))?;
    Ok(Message::ok(data))
}

pub(crate) fn ok_gzip<T: Serialize>(value: &T) -> HandlerResult {
    Ok(Message::ok(codec::to_gzip_base64_json(value)?))
}
