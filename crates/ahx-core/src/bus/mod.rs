//! Messaging capability: request/reply plus pub/sub over subject strings.
//!
//! Both the query surface and the collector's intake hand-off talk through
//! [`Messenger`]. The transport is an adapter:
//!
//! - [`LocalBus`]: in-process fan-out over tokio channels
//! - [`NatsBus`]: `async-nats` client
//!
//! Every reply body is a JSON [`Message`] envelope `{data, error, code}`.

mod local;
mod nats;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::ErrorCode;

pub use local::LocalBus;
pub use nats::NatsBus;

/// Upper bound on every bus request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of a subscription's inbound queue.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// Subjects
// ---------------------------------------------------------------------------

pub mod subjects {
    pub const STATUS: &str = "status";
    pub const AUCTIONS: &str = "auctions";
    pub const OWNERS: &str = "owners";
    pub const OWNERS_QUERY: &str = "ownersQuery";
    pub const OWNERS_QUERY_BY_ITEMS: &str = "ownersQueryByItems";
    pub const ITEMS_QUERY: &str = "itemsQuery";
    pub const ITEMS: &str = "items";
    pub const PRICE_LIST: &str = "priceList";
    pub const PRICE_LIST_HISTORY: &str = "priceListHistory";
    pub const PRICE_LIST_HISTORY_V2: &str = "priceListHistoryV2";
    pub const REALM_MODIFICATION_DATES: &str = "realmModificationDates";
    pub const BOOT: &str = "boot";
    pub const SESSION_SECRET: &str = "sessionSecret";
    pub const RUNTIME_INFO: &str = "runtimeInfo";
    pub const LIVE_AUCTIONS_INTAKE: &str = "liveAuctionsIntake";
    pub const PRICELIST_HISTORIES_INTAKE: &str = "pricelistHistoriesIntake";
    pub const APP_METRICS: &str = "appMetrics";
    pub const GENERIC_TEST_ERRORS: &str = "genericTestErrors";
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BusError {
    #[error("request on {0} timed out")]
    Timeout(String),

    #[error("no responders on {0}")]
    NoResponders(String),

    #[error("bus closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("envelope error: {0}")]
    Envelope(#[from] serde_json::Error),

    /// A well-formed reply whose code was not ok.
    #[error("{subject} replied {code}: {error}")]
    Reply { subject: String, code: ErrorCode, error: String },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Reply envelope. `data` is raw JSON text, gzip+base64 JSON, or empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub code: ErrorCode,
}

impl Message {
    pub fn ok(data: impl Into<String>) -> Self {
        Self { data: data.into(), error: String::new(), code: ErrorCode::Ok }
    }

    pub fn error(code: ErrorCode, error: impl Into<String>) -> Self {
        Self { data: String::new(), error: error.into(), code }
    }

    pub fn encode(&self) -> Result<Vec<u8>, BusError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BusError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Turn a non-ok reply into [`BusError::Reply`].
    pub fn into_result(self, subject: &str) -> Result<Self, BusError> {
        if self.code.is_ok() {
            Ok(self)
        } else {
            Err(BusError::Reply { subject: subject.to_string(), code: self.code, error: self.error })
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound messages and subscriptions
// ---------------------------------------------------------------------------

/// A message delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub subject: String,
    pub payload: Vec<u8>,
    /// Where to publish the reply, for request messages.
    pub reply: Option<String>,
}

type UnsubscribeHook = Box<dyn FnOnce() + Send>;

/// Stream of inbound messages for one subject. Dropping it unsubscribes.
pub struct Subscription {
    subject: String,
    rx: mpsc::Receiver<Inbound>,
    on_unsubscribe: Option<UnsubscribeHook>,
}

impl Subscription {
    pub(crate) fn new(subject: &str, rx: mpsc::Receiver<Inbound>, on_unsubscribe: UnsubscribeHook) -> Self {
        Self { subject: subject.to_string(), rx, on_unsubscribe: Some(on_unsubscribe) }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Next inbound message; `None` once the transport is gone.
    pub async fn next(&mut self) -> Option<Inbound> {
        self.rx.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.run_hook();
    }

    fn run_hook(&mut self) {
        if let Some(hook) = self.on_unsubscribe.take() {
            hook();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_hook();
    }
}

// ---------------------------------------------------------------------------
// Messenger
// ---------------------------------------------------------------------------

/// Subject-addressed messaging.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Fire-and-forget publish.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Publish and wait at most [`REQUEST_TIMEOUT`] for one reply.
    async fn request(&self, subject: &str, payload: Vec<u8>) -> Result<Vec<u8>, BusError>;

    async fn subscribe(&self, subject: &str) -> Result<Subscription, BusError>;
}

/// Send a JSON request and decode the reply envelope, failing on non-ok codes.
pub async fn request_json<M, Req>(bus: &M, subject: &str, req: &Req) -> Result<Message, BusError>
where
    M: Messenger + ?Sized,
    Req: Serialize + Sync,
{
    let payload = serde_json::to_vec(req)?;
    let reply = bus.request(subject, payload).await?;
    Message::decode(&reply)?.into_result(subject)
}

/// Decode the raw-JSON `data` of an ok reply.
pub fn decode_data<T: DeserializeOwned>(msg: &Message) -> Result<T, BusError> {
    Ok(serde_json::from_str(&msg.data)?)
}
