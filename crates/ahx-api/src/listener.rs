//! Bus subscriptions that answer requests with a handler.

use std::sync::Arc;

use ahx_core::bus::{BusError, Inbound, Message, Messenger, Subscription};
use ahx_core::error::ErrorCode;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Synchronous request handler; always yields a reply envelope.
pub type HandlerFn = Arc<dyn Fn(&[u8]) -> Message + Send + Sync>;

/// One subject subscription driven by a background task.
pub struct Listener {
    subject: &'static str,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl Listener {
    /// Subscribe to `subject` and serve it until [`Listener::stop`].
    pub async fn start(
        bus: Arc<dyn Messenger>,
        subject: &'static str,
        handler: HandlerFn,
    ) -> Result<Self, BusError> {
        let sub = bus.subscribe(subject).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(listen_loop(bus, sub, handler, shutdown_rx));
        info!("[listener:{subject}] listening");
        Ok(Self { subject, shutdown_tx: Some(shutdown_tx), task: Some(task) })
    }

    pub fn subject(&self) -> &'static str {
        self.subject
    }

    /// Unsubscribe and wait for the in-flight request, if any.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("[listener:{}] stopped", self.subject);
    }
}

async fn listen_loop(
    bus: Arc<dyn Messenger>,
    mut sub: Subscription,
    handler: HandlerFn,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let subject = sub.subject().to_string();
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            msg = sub.next() => {
                let Some(msg) = msg else {
                    info!("[listener:{subject}] subscription closed");
                    break;
                };
                serve(&*bus, &subject, &handler, msg).await;
            }
        }
    }
    sub.unsubscribe();
}

async fn serve(bus: &dyn Messenger, subject: &str, handler: &HandlerFn, msg: Inbound) {
    let handler = Arc::clone(handler);
    let payload = msg.payload;
    let reply = match tokio::task::spawn_blocking(move || handler(&payload)).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("[listener:{subject}] handler failed: {e}");
            Message::error(ErrorCode::GenericError, "handler failed")
        }
    };

    let Some(reply_to) = msg.reply else {
        debug!("[listener:{subject}] no reply subject, code {}", reply.code);
        return;
    };
    let encoded = match reply.encode() {
        Ok(encoded) => encoded,
        Err(e) => {
            error!("[listener:{subject}] encode reply: {e}");
            return;
        }
    };
    if let Err(e) = bus.publish(&reply_to, encoded).await {
        error!("[listener:{subject}] publish reply: {e}");
    }
}

/// A group of listeners started together and stopped in sequence.
#[derive(Default)]
pub struct ListenerSet {
    listeners: Vec<Listener>,
}

impl ListenerSet {
    pub async fn start(
        bus: Arc<dyn Messenger>,
        handlers: Vec<(&'static str, HandlerFn)>,
    ) -> Result<Self, BusError> {
        let mut set = Self::default();
        for (subject, handler) in handlers {
            match Listener::start(Arc::clone(&bus), subject, handler).await {
                Ok(listener) => set.listeners.push(listener),
                Err(e) => {
                    set.stop().await;
                    return Err(e);
                }
            }
        }
        Ok(set)
    }

    pub fn subjects(&self) -> Vec<&'static str> {
        self.listeners.iter().map(Listener::subject).collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub async fn stop(&mut self) {
        for listener in &mut self.listeners {
            listener.stop().await;
        }
        self.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use ahx_core::bus::LocalBus;

    use super::*;

    fn echo() -> HandlerFn {
        Arc::new(|payload: &[u8]| Message::ok(String::from_utf8_lossy(payload).into_owned()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn replies_until_stopped() {
        let bus = LocalBus::new();
        let mut listener = Listener::start(Arc::new(bus.clone()), "echo", echo()).await.unwrap();

        let reply = bus.request("echo", b"hello".to_vec()).await.unwrap();
        assert_eq!(Message::decode(&reply).unwrap(), Message::ok("hello"));

        listener.stop().await;
        assert!(matches!(bus.request("echo", b"x".to_vec()).await, Err(BusError::NoResponders(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_handler_answers_generic() {
        let bus = LocalBus::new();
        let boom: HandlerFn = Arc::new(|_: &[u8]| -> Message { panic!("boom") });
        let mut set = ListenerSet::start(Arc::new(bus.clone()), vec![("boom", boom), ("echo", echo())]).await.unwrap();
        assert_eq!(set.subjects(), vec!["boom", "echo"]);

        let reply = Message::decode(&bus.request("boom", Vec::new()).await.unwrap()).unwrap();
        assert_eq!(reply.code, ErrorCode::GenericError);

        set.stop().await;
        assert!(set.is_empty());
    }
}
