//! Execution bridge: runs blocking reactions on a bounded worker pool.
//!
//! Reactions (external commands, network calls) may block for a long time.
//! They run on dedicated worker threads fed through a crossbeam channel so
//! the async side keeps delivering events while they execute.
//!
//! Two calling modes:
//! - [`WorkerPool::run`] / [`WorkerPool::run_or_else`]: the calling task
//!   suspends until the job finishes or the timeout elapses.
//! - [`WorkerPool::block`]: the calling thread blocks; for code that has
//!   no access to the async runtime.
//!
//! Cancellation on timeout is best-effort. A job that has not started is
//! skipped; a job already running keeps running detached.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors surfaced by the execution bridge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Job was cancelled before it started")]
    Cancelled,

    #[error("Job panicked: {reason}")]
    Panicked { reason: String },

    #[error("Worker pool is shut down")]
    ShutDown,

    #[error("Worker dropped the job without a result")]
    WorkerLost,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to request cancellation of a submitted job.
#[derive(Debug, Clone)]
pub struct Ticket {
    cancelled: Arc<AtomicBool>,
}

impl Ticket {
    /// Ask the worker to skip the job if it has not started yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Bounded pool of worker threads for blocking reaction work.
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
    executed: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawn `size` worker threads (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<Job>();
        let executed = Arc::new(AtomicUsize::new(0));

        let workers = (0..size)
            .filter_map(|id| {
                let receiver: Receiver<Job> = receiver.clone();
                let executed = executed.clone();
                std::thread::Builder::new()
                    .name(format!("fsreact-worker-{id}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                            executed.fetch_add(1, Ordering::Relaxed);
                        }
                    })
                    .map_err(|e| tracing::error!("[bridge] failed to spawn worker {id}: {e}"))
                    .ok()
            })
            .collect::<Vec<_>>();

        crate::debug_event!("bridge", "started", "{} workers", workers.len());

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            size,
            executed,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of jobs the workers have picked up so far.
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::Relaxed)
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Queue `func` and hand its outcome to `deliver` once it ran.
    pub fn submit<F, T, D>(&self, func: F, deliver: D) -> Result<Ticket, BridgeError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
        D: FnOnce(Result<T, BridgeError>) + Send + 'static,
    {
        let ticket = Ticket {
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        let flag = ticket.clone();

        let job: Job = Box::new(move || {
            if flag.is_cancelled() {
                deliver(Err(BridgeError::Cancelled));
                return;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(func)).map_err(|payload| {
                BridgeError::Panicked {
                    reason: panic_message(payload),
                }
            });
            deliver(outcome);
        });

        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(BridgeError::ShutDown)?;
        sender.send(job).map_err(|_| BridgeError::ShutDown)?;

        Ok(ticket)
    }

    /// Run `func` on the pool and suspend until it completes.
    ///
    /// `Duration::ZERO` means no deadline. On timeout the job is flagged
    /// cancelled and [`BridgeError::Timeout`] is returned.
    pub async fn run<F, T>(&self, func: F, timeout: Duration) -> Result<T, BridgeError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let ticket = self.submit(func, move |outcome| {
            let _ = tx.send(outcome);
        })?;

        if timeout.is_zero() {
            return rx.await.map_err(|_| BridgeError::WorkerLost)?;
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(received) => received.map_err(|_| BridgeError::WorkerLost)?,
            Err(_) => {
                ticket.cancel();
                Err(BridgeError::Timeout(timeout))
            }
        }
    }

    /// Like [`run`](Self::run), but on timeout awaits `on_timeout` once and
    /// returns its output in place of the job's result.
    pub async fn run_or_else<F, T, C, Fut>(
        &self,
        func: F,
        timeout: Duration,
        on_timeout: C,
    ) -> Result<T, BridgeError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
        C: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match self.run(func, timeout).await {
            Err(BridgeError::Timeout(elapsed)) => {
                crate::debug_event!("bridge", "timeout fallback", "after {elapsed:?}");
                Ok(on_timeout().await)
            }
            other => other,
        }
    }

    /// Run `func` on the pool and block the calling thread for the result.
    ///
    /// On timeout the job is flagged cancelled, a warning is logged and
    /// `None` is returned. Errors are logged, never raised. `label` names
    /// the job in those logs.
    pub fn block<F, T>(&self, label: &str, func: F, timeout: Duration) -> Option<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);

        let ticket = match self.submit(func, move |outcome| {
            let _ = tx.send(outcome);
        }) {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::warn!("[bridge] {label} not executed: {e}");
                return None;
            }
        };

        let received = if timeout.is_zero() {
            rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            rx.recv_timeout(timeout)
        };

        match received {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                tracing::warn!("[bridge] {label} failed: {e}");
                None
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("[bridge] {label} execute timeout after {timeout:?}");
                ticket.cancel();
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("[bridge] {label} lost its worker");
                None
            }
        }
    }

    /// Close the job queue and join all workers.
    ///
    /// Queued jobs still run; this waits for them. Calling it again is a no-op.
    pub fn shutdown(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        drop(sender);

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                tracing::warn!("[bridge] worker thread panicked during shutdown");
            }
        }

        crate::log_event!("bridge", "stopped", "{} jobs executed", self.executed());
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Detach instead of joining: a timed-out job may still be running.
        self.sender.lock().take();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::thread::sleep;

    /// Log sink shared with a scoped subscriber.
    #[derive(Clone, Default)]
    struct Captured(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    #[tokio::test]
    async fn test_zero_timeout_waits_for_completion() {
        let pool = WorkerPool::new(2);
        let value = pool
            .run(
                || {
                    sleep(Duration::from_millis(300));
                    42
                },
                Duration::ZERO,
            )
            .await;
        assert_eq!(value, Ok(42));
    }

    #[tokio::test]
    async fn test_timeout_without_callback() {
        let pool = WorkerPool::new(1);
        let result = pool
            .run(|| sleep(Duration::from_millis(500)), Duration::from_millis(50))
            .await;
        assert_eq!(result, Err(BridgeError::Timeout(Duration::from_millis(50))));
    }

    #[tokio::test]
    async fn test_timeout_callback_invoked_once() {
        let pool = WorkerPool::new(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = pool
            .run_or_else(
                || {
                    sleep(Duration::from_millis(500));
                    "done"
                },
                Duration::from_millis(50),
                || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    "fallback"
                },
            )
            .await;

        assert_eq!(result, Ok("fallback"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_callback_unused_when_in_time() {
        let pool = WorkerPool::new(1);
        let result = pool
            .run_or_else(|| 7, Duration::from_secs(5), || async { 0 })
            .await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let pool = WorkerPool::new(1);
        let result: Result<(), _> = pool.run(|| panic!("boom"), Duration::ZERO).await;
        assert_eq!(
            result,
            Err(BridgeError::Panicked {
                reason: "boom".to_string()
            })
        );

        // The worker survives the panic
        assert_eq!(pool.run(|| 1, Duration::ZERO).await, Ok(1));
    }

    #[test]
    fn test_block_returns_value() {
        let pool = WorkerPool::new(1);
        assert_eq!(pool.block("echo", || "ok", Duration::from_secs(5)), Some("ok"));
        assert_eq!(pool.block("echo", || "ok", Duration::ZERO), Some("ok"));
    }

    #[test]
    fn test_block_timeout_cancels_queued_job() {
        let pool = WorkerPool::new(1);
        let ran = Arc::new(AtomicBool::new(false));

        // Occupy the only worker so the next job stays queued
        let (_tx, rx) = crossbeam_channel::bounded::<()>(0);
        pool.submit(
            move || {
                let _ = rx.recv_timeout(Duration::from_millis(300));
            },
            |_| {},
        )
        .unwrap();

        let flag = ran.clone();
        let result = pool.block(
            "set flag",
            move || flag.store(true, Ordering::SeqCst),
            Duration::from_millis(50),
        );
        assert_eq!(result, None);

        pool.shutdown();
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_block_logs_caller_label() {
        let pool = WorkerPool::new(1);
        pool.shutdown();

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let result = tracing::subscriber::with_default(subscriber, || {
            pool.block("resize thumbnails", || 1, Duration::ZERO)
        });

        assert_eq!(result, None);
        let logs = captured.text();
        assert!(logs.contains("[bridge] resize thumbnails not executed"), "{logs}");
        assert!(!logs.contains("closure"), "{logs}");
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pool = WorkerPool::new(2);
        assert_eq!(pool.block("three", || 3, Duration::ZERO), Some(3));

        pool.shutdown();
        pool.shutdown();

        assert!(pool.is_shut_down());
        assert_eq!(pool.executed(), 1);
        assert!(matches!(
            pool.submit(|| (), |_| {}),
            Err(BridgeError::ShutDown)
        ));
    }
}
