//! Periodic ticker with a cooperative stop.
//!
//! The job runs once immediately and then every `period`. Each run happens on
//! the blocking pool; a stop request takes effect at the next run boundary,
//! so an in-flight run always completes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

pub struct Ticker {
    label: String,
    stop_tx: Option<oneshot::Sender<()>>,
    done: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Spawn the ticker on the current runtime.
    pub fn spawn<F>(label: &str, period: Duration, job: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let job = Arc::new(job);
        let task_label = label.to_string();

        let done = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("[{task_label}] ticker started, period {}s", period.as_secs());

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        let job = Arc::clone(&job);
                        if let Err(e) = tokio::task::spawn_blocking(move || job()).await {
                            error!("[{task_label}] run failed: {e}");
                        }
                    }
                }
            }

            info!("[{task_label}] ticker stopped");
        });

        Self { label: label.to_string(), stop_tx: Some(stop_tx), done: Some(done) }
    }

    /// Signal stop and wait for the in-flight run (if any) to drain.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(done) = self.done.take() {
            if let Err(e) = done.await {
                error!("[{}] ticker task failed: {e}", self.label);
            }
        }
    }
}
