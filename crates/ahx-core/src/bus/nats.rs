//! NATS adapter.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{BusError, Inbound, Messenger, REQUEST_TIMEOUT, SUBSCRIPTION_BUFFER, Subscription};

#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    /// Connect to `nats://{host}:{port}`.
    pub async fn connect(host: &str, port: u16) -> Result<Self, BusError> {
        let addr = format!("nats://{host}:{port}");
        let client = async_nats::connect(addr.as_str())
            .await
            .map_err(|e| BusError::Transport(format!("connect {addr}: {e}")))?;
        info!("[bus:nats] connected to {addr}");
        Ok(Self { client })
    }

    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Messenger for NatsBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.client
            .publish(subject.to_string(), Bytes::from(payload))
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
    }

    async fn request(&self, subject: &str, payload: Vec<u8>) -> Result<Vec<u8>, BusError> {
        let fut = self.client.request(subject.to_string(), Bytes::from(payload));
        match tokio::time::timeout(REQUEST_TIMEOUT, fut).await {
            Ok(Ok(msg)) => Ok(msg.payload.to_vec()),
            Ok(Err(e)) => match e.kind() {
                async_nats::RequestErrorKind::NoResponders => Err(BusError::NoResponders(subject.to_string())),
                async_nats::RequestErrorKind::TimedOut => Err(BusError::Timeout(subject.to_string())),
                _ => Err(BusError::Transport(e.to_string())),
            },
            Err(_) => Err(BusError::Timeout(subject.to_string())),
        }
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription, BusError> {
        let mut subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let label = subject.to_string();
        // The forwarder owns the NATS subscriber; aborting it drops the
        // subscriber, which unsubscribes on the server.
        let forwarder = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                let inbound = Inbound {
                    subject: msg.subject.to_string(),
                    payload: msg.payload.to_vec(),
                    reply: msg.reply.map(|r| r.to_string()),
                };
                if tx.send(inbound).await.is_err() {
                    break;
                }
            }
            warn!("[bus:nats] subscription {label} ended");
        });

        let abort = forwarder.abort_handle();
        Ok(Subscription::new(subject, rx, Box::new(move || abort.abort())))
    }
}
