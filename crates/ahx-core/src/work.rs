//! Fixed-size worker fan-out with a single post-work hook.
//!
//! ```text
//!   in_rx ──► worker #0 ─┐
//!         ──► worker #1 ─┼──► out_tx    (workers share in/out channels)
//!         ──► worker #n ─┘
//!                          └─ supervisor: join all, then post_work() once
//! ```
//!
//! Callers own the channels. A worker typically loops on `in_rx.recv()` and
//! sends into `out_tx`; `post_work` drops the last output sender so that the
//! downstream stage sees end-of-stream. [`work`] returns immediately; the
//! returned [`PoolHandle`] can be joined to wait for the hook to finish.
//!
//! A pool that starts fewer workers than asked runs with the ones it got. A
//! pool that starts none runs `post_work` inline and reports the spawn error.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, warn};

/// Handle to a running pool. Dropping it detaches the pool.
pub struct PoolHandle {
    supervisor: JoinHandle<()>,
    workers: usize,
}

impl PoolHandle {
    /// Workers actually started.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Block until every worker has returned and `post_work` has run.
    pub fn join(self) {
        if self.supervisor.join().is_err() {
            error!("[work] supervisor panicked");
        }
    }
}

/// Spawn `n` workers running `worker`, then run `post_work` exactly once
/// after every worker has returned (including by panic).
///
/// `n == 0` runs `post_work` immediately on the supervisor thread.
pub fn work<W, P>(n: usize, worker: W, post_work: P) -> io::Result<PoolHandle>
where
    W: Fn() + Send + Sync + 'static,
    P: FnOnce() + Send + 'static,
{
    spawn_named("work", n, worker, post_work)
}

/// Same as [`work`] with a thread name prefix for logs and debuggers.
///
/// Fails when `n > 0` and no worker thread could be started, or when the
/// supervisor cannot be started. In the first case `post_work` has already
/// run; in the second it is dropped unrun, releasing what it captured.
pub fn spawn_named<W, P>(label: &str, n: usize, worker: W, post_work: P) -> io::Result<PoolHandle>
where
    W: Fn() + Send + Sync + 'static,
    P: FnOnce() + Send + 'static,
{
    spawn_with(label, n, worker, post_work, |name, f| thread::Builder::new().name(name).spawn(f))
}

fn spawn_with<W, P, S>(label: &str, n: usize, worker: W, post_work: P, spawn: S) -> io::Result<PoolHandle>
where
    W: Fn() + Send + Sync + 'static,
    P: FnOnce() + Send + 'static,
    S: Fn(String, Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>>,
{
    let worker = Arc::new(worker);
    let mut handles = Vec::with_capacity(n);
    let mut last_err = None;

    for i in 0..n {
        let worker = Arc::clone(&worker);
        match spawn(format!("{label}-{i}"), Box::new(move || worker())) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                warn!("[work] failed to spawn {label}-{i}: {e}");
                last_err = Some(e);
            }
        }
    }

    if let Some(e) = last_err.filter(|_| handles.is_empty()) {
        error!("[work] no {label} worker started out of {n}");
        drop(worker);
        post_work();
        return Err(e);
    }

    let workers = handles.len();
    let label = label.to_string();
    let supervisor_name = format!("{label}-post");
    let supervisor = spawn(
        supervisor_name,
        Box::new(move || {
            for handle in handles {
                if handle.join().is_err() {
                    error!("[work] {label} worker panicked");
                }
            }
            // Release captured channel ends before the hook runs.
            drop(worker);
            post_work();
        }),
    )
    .inspect_err(|e| error!("[work] failed to spawn supervisor: {e}"))?;

    Ok(PoolHandle { supervisor, workers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn post_work_runs_once_after_all_workers() {
        let (in_tx, in_rx) = bounded::<u32>(0);
        let (out_tx, out_rx) = bounded::<u32>(0);
        let finished = Arc::new(AtomicUsize::new(0));
        let hook_saw = Arc::new(AtomicUsize::new(usize::MAX));

        let worker_out = out_tx.clone();
        let worker_finished = Arc::clone(&finished);
        let hook_finished = Arc::clone(&finished);
        let hook_record = Arc::clone(&hook_saw);

        let pool = work(
            4,
            move || {
                while let Ok(v) = in_rx.recv() {
                    let _ = worker_out.send(v * 2);
                }
                worker_finished.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                hook_record.store(hook_finished.load(Ordering::SeqCst), Ordering::SeqCst);
                drop(out_tx);
            },
        )
        .unwrap();
        assert_eq!(pool.workers(), 4);

        let feeder = thread::spawn(move || {
            for v in 0..20 {
                in_tx.send(v).unwrap();
            }
        });

        let mut results: Vec<u32> = out_rx.iter().collect();
        feeder.join().unwrap();
        pool.join();

        results.sort();
        assert_eq!(results, (0..20).map(|v| v * 2).collect::<Vec<_>>());
        assert_eq!(hook_saw.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn zero_workers_still_runs_hook() {
        let (tx, rx) = unbounded::<()>();
        work(0, || {}, move || drop(tx)).unwrap().join();
        assert!(rx.recv().is_err());
    }

    #[test]
    fn panicking_worker_does_not_skip_hook() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook_calls = Arc::clone(&calls);
        work(
            2,
            || panic!("boom"),
            move || {
                hook_calls.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap()
        .join();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    fn refuse_workers(name: String, f: Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>> {
        if name.ends_with("-post") {
            thread::Builder::new().name(name).spawn(f)
        } else {
            Err(io::Error::other("thread limit"))
        }
    }

    #[test]
    fn no_started_worker_is_an_error_after_the_hook() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook_calls = Arc::clone(&calls);
        let (tx, rx) = unbounded::<()>();

        let result = spawn_with(
            "fetch",
            3,
            || {},
            move || {
                hook_calls.fetch_add(1, Ordering::SeqCst);
                drop(tx);
            },
            refuse_workers,
        );

        assert_eq!(result.err().map(|e| e.to_string()), Some("thread limit".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(rx.recv().is_err());
    }

    #[test]
    fn partial_start_runs_with_fewer_workers() {
        let attempts = AtomicUsize::new(0);
        let every_other = |name: String, f: Box<dyn FnOnce() + Send>| {
            if !name.ends_with("-post") && attempts.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                return Err(io::Error::other("thread limit"));
            }
            thread::Builder::new().name(name).spawn(f)
        };

        let ran = Arc::new(AtomicUsize::new(0));
        let worker_ran = Arc::clone(&ran);
        let pool = spawn_with(
            "store",
            4,
            move || {
                worker_ran.fetch_add(1, Ordering::SeqCst);
            },
            || {},
            every_other,
        )
        .unwrap();
        assert_eq!(pool.workers(), 2);
        pool.join();
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }
}
