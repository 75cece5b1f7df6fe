//! In-process bus. Every subscriber of a subject receives every publish.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::{BusError, Inbound, Messenger, REQUEST_TIMEOUT, SUBSCRIPTION_BUFFER, Subscription};

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    by_subject: HashMap<String, Vec<(u64, mpsc::Sender<Inbound>)>>,
}

/// Cloneable handle; clones share one subject table.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<Mutex<Subscribers>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn senders(&self, subject: &str) -> Vec<mpsc::Sender<Inbound>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_subject
            .get(subject)
            .map(|subs| subs.iter().map(|(_, tx)| tx.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of live subscriptions on `subject`.
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_subject
            .get(subject)
            .map_or(0, Vec::len)
    }

    async fn deliver(&self, subject: &str, payload: Vec<u8>, reply: Option<String>) -> usize {
        let senders = self.senders(subject);
        let mut delivered = 0;
        for tx in senders {
            let msg = Inbound { subject: subject.to_string(), payload: payload.clone(), reply: reply.clone() };
            if tx.send(msg).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[async_trait]
impl Messenger for LocalBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let delivered = self.deliver(subject, payload, None).await;
        debug!("[bus:local] {subject} delivered to {delivered}");
        Ok(())
    }

    async fn request(&self, subject: &str, payload: Vec<u8>) -> Result<Vec<u8>, BusError> {
        let inbox = format!("_INBOX.{}", uuid::Uuid::new_v4().simple());
        let mut replies = self.subscribe(&inbox).await?;

        if self.deliver(subject, payload, Some(inbox)).await == 0 {
            return Err(BusError::NoResponders(subject.to_string()));
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, replies.next()).await {
            Ok(Some(msg)) => Ok(msg.payload),
            Ok(None) => Err(BusError::Closed),
            Err(_) => Err(BusError::Timeout(subject.to_string())),
        }
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription, BusError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let id = {
            let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let id = guard.next_id;
            guard.next_id += 1;
            guard.by_subject.entry(subject.to_string()).or_default().push((id, tx));
            id
        };

        let inner = Arc::clone(&self.inner);
        let owned_subject = subject.to_string();
        let hook = Box::new(move || {
            let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(subs) = guard.by_subject.get_mut(&owned_subject) {
                subs.retain(|(sid, _)| *sid != id);
                if subs.is_empty() {
                    guard.by_subject.remove(&owned_subject);
                }
            }
        });

        Ok(Subscription::new(subject, rx, hook))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Message;

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let bus = LocalBus::new();
        let mut a = bus.subscribe("appMetrics").await.unwrap();
        let mut b = bus.subscribe("appMetrics").await.unwrap();

        bus.publish("appMetrics", b"x".to_vec()).await.unwrap();
        assert_eq!(a.next().await.unwrap().payload, b"x");
        assert_eq!(b.next().await.unwrap().payload, b"x");
    }

    #[tokio::test]
    async fn request_gets_reply_from_responder() {
        let bus = LocalBus::new();
        let mut sub = bus.subscribe("status").await.unwrap();
        let responder = bus.clone();
        tokio::spawn(async move {
            while let Some(msg) = sub.next().await {
                let reply = Message::ok("pong").encode().unwrap();
                if let Some(to) = msg.reply {
                    responder.publish(&to, reply).await.unwrap();
                }
            }
        });

        let raw = bus.request("status", b"ping".to_vec()).await.unwrap();
        assert_eq!(Message::decode(&raw).unwrap().data, "pong");
    }

    #[tokio::test]
    async fn request_without_subscriber_fails_fast() {
        let bus = LocalBus::new();
        let err = bus.request("boot", Vec::new()).await.unwrap_err();
        assert!(matches!(err, BusError::NoResponders(_)));
    }

    #[tokio::test]
    async fn dropping_subscription_unsubscribes() {
        let bus = LocalBus::new();
        let sub = bus.subscribe("items").await.unwrap();
        assert_eq!(bus.subscriber_count("items"), 1);
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count("items"), 0);
    }
}
