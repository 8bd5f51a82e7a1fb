//! Process-wide orchestration: watchers, dispatch queue, consumer, pool.
//!
//! The [`Orchestrator`] is built once in `main` and passed by reference;
//! there is no global accessor.
//!
//! ```text
//! Watcher #0 ─┐
//! Watcher #1 ─┼─► DispatchSink ─► queue ─► consume() ─► DispatchHandler ─► WorkerPool
//! Watcher #n ─┘                      (FIFO, one record at a time)
//! ```

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::bridge::WorkerPool;
use crate::dispatch::{self, DispatchHandler, DispatchQueue, DispatchSink};
use crate::rules::{RuleError, RuleSet};
use crate::watcher::Watcher;

/// Errors from building or starting the orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Rules(#[from] RuleError),

    #[error("Orchestrator requires {0}")]
    Missing(&'static str),

    #[error("None of the {count} watchers could be started")]
    NothingWatched { count: usize },

    #[error("Orchestrator was already stopped")]
    Stopped,
}

type HandlerFactory = Box<dyn FnOnce(Arc<WorkerPool>) -> Arc<dyn DispatchHandler> + Send>;

/// Owns every runtime component of the agent.
pub struct Orchestrator {
    watchers: Vec<Watcher>,
    pool: Arc<WorkerPool>,
    handler: Arc<dyn DispatchHandler>,
    queue: Option<DispatchQueue>,
    consumer: Option<JoinHandle<usize>>,
    ct: CancellationToken,
    stopped: bool,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn watchers(&self) -> &[Watcher] {
        &self.watchers
    }

    pub fn running_watchers(&self) -> usize {
        self.watchers.iter().filter(|w| w.is_running()).count()
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Token that stops the consumer loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ct.clone()
    }

    /// Start every watcher in declared order, then the consumer task.
    ///
    /// A watcher that fails to start is logged and skipped. Fails only if
    /// no watcher at all could be started.
    pub fn start(&mut self) -> Result<(), OrchestratorError> {
        if self.stopped {
            return Err(OrchestratorError::Stopped);
        }
        let Some(queue) = self.queue.take() else {
            crate::debug_event!("orchestrator", "already started");
            return Ok(());
        };

        for watcher in &mut self.watchers {
            if let Err(e) = watcher.start() {
                tracing::error!("[orchestrator] watcher #{} not started: {e}", watcher.index());
            }
        }

        let running = self.running_watchers();
        if running == 0 && !self.watchers.is_empty() {
            return Err(OrchestratorError::NothingWatched {
                count: self.watchers.len(),
            });
        }

        let span = tracing::info_span!("consumer", handler = self.handler.name());
        self.consumer = Some(tokio::spawn(
            dispatch::consume(queue, self.handler.clone(), self.ct.clone()).instrument(span),
        ));

        crate::log_event!(
            "orchestrator",
            "started",
            "{running}/{} watchers running, {} workers",
            self.watchers.len(),
            self.pool.size()
        );
        Ok(())
    }

    /// Start, wait for `signal`, then stop.
    pub async fn run_until<S>(&mut self, signal: S) -> Result<(), OrchestratorError>
    where
        S: Future<Output = ()>,
    {
        self.start()?;

        tokio::select! {
            _ = signal => crate::log_event!("orchestrator", "shutdown requested"),
            _ = self.ct.cancelled() => crate::log_event!("orchestrator", "cancelled"),
        }

        self.stop().await;
        Ok(())
    }

    /// Run until Ctrl+C or until the cancellation token fires.
    pub async fn run_until_shutdown(&mut self) -> Result<(), OrchestratorError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("[orchestrator] failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Stop watchers (reverse order), the consumer and the worker pool.
    ///
    /// Safe to call any number of times.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        for watcher in self.watchers.iter_mut().rev() {
            watcher.stop();
        }

        self.ct.cancel();
        if let Some(consumer) = self.consumer.take() {
            match consumer.await {
                Ok(handled) => crate::debug_event!("orchestrator", "consumer joined", "{handled}"),
                Err(e) => tracing::error!("[orchestrator] consumer task failed: {e}"),
            }
        }

        let pool = self.pool.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || pool.shutdown()).await {
            tracing::error!("[orchestrator] worker pool shutdown failed: {e}");
        }

        crate::log_event!("orchestrator", "stopped");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

/// Builder for constructing an [`Orchestrator`].
pub struct OrchestratorBuilder {
    rules: Option<RuleSet>,
    workers: usize,
    handler: Option<HandlerFactory>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            rules: None,
            workers: num_cpus::get(),
            handler: None,
        }
    }

    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Number of worker threads for blocking reactions.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the dispatch handler. The factory receives the orchestrator's pool.
    pub fn handler<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(Arc<WorkerPool>) -> Arc<dyn DispatchHandler> + Send + 'static,
    {
        self.handler = Some(Box::new(factory));
        self
    }

    /// Validate the rules and construct every component, nothing started yet.
    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let rules = self.rules.ok_or(OrchestratorError::Missing("a rule set"))?;
        let factory = self
            .handler
            .ok_or(OrchestratorError::Missing("a dispatch handler"))?;

        rules.validate()?;

        let pool = Arc::new(WorkerPool::new(self.workers));
        let handler = factory(pool.clone());
        let (sink, queue) = DispatchSink::channel();

        let watchers = rules
            .containers
            .into_iter()
            .enumerate()
            .map(|(index, container)| {
                let span = tracing::info_span!("watcher", index, path = %container.path);
                Watcher::new(index, container, sink.clone(), span)
            })
            .collect();

        Ok(Orchestrator {
            watchers,
            pool,
            handler,
            queue: Some(queue),
            consumer: None,
            ct: CancellationToken::new(),
            stopped: false,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
