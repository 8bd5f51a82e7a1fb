//! Per-rule watch supervisor.

use std::fmt;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};

use crate::dispatch::{DispatchRecord, DispatchSink};
use crate::rules::{Container, RawKind, normalize};

use super::error::WatchError;
use super::rename::{Change, RenamePairer};

/// Supervises one filesystem subscription for exactly one container.
///
/// `start()` subscribes and spawns a forwarding thread that normalizes,
/// filters and forwards notifications. `stop()` unsubscribes and joins
/// that thread. Watchers share nothing but the dispatch sink.
pub struct Watcher {
    /// Position of the container in the rule set.
    index: usize,
    container: Container,
    sink: DispatchSink,
    /// Logging context for this watcher.
    span: tracing::Span,
    /// Live subscription; dropping it unsubscribes.
    subscription: Option<RecommendedWatcher>,
    forwarder: Option<JoinHandle<()>>,
}

impl Watcher {
    pub fn new(index: usize, container: Container, sink: DispatchSink, span: tracing::Span) -> Self {
        Self {
            index,
            container,
            sink,
            span,
            subscription: None,
            forwarder: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.container.path
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn is_running(&self) -> bool {
        self.subscription.is_some()
    }

    /// Subscribe to the container's path and begin forwarding matches.
    pub fn start(&mut self) -> Result<(), WatchError> {
        let _enter = self.span.enter();
        let path = PathBuf::from(&self.container.path);

        if self.is_running() {
            return Err(WatchError::AlreadyRunning { path });
        }

        let (tx, rx) = unbounded::<notify::Result<notify::Event>>();
        let mut subscription = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = tx.send(res);
        })?;

        let mode = if self.container.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        subscription
            .watch(&path, mode)
            .map_err(|e| WatchError::PathWatchFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let filter = EventFilter {
            index: self.index,
            container: self.container.clone(),
            sink: self.sink.clone(),
            renames: RenamePairer::default(),
        };
        let span = self.span.clone();

        let forwarder = std::thread::Builder::new()
            .name(format!("fsreact-watch-{}", self.index))
            .spawn(move || {
                let _enter = span.enter();
                filter.forward_all(rx);
            })
            .map_err(|e| WatchError::InitFailed {
                reason: format!("failed to spawn forwarding thread: {e}"),
            })?;

        self.subscription = Some(subscription);
        self.forwarder = Some(forwarder);

        crate::log_event!("watcher", "started", "{}", self);
        Ok(())
    }

    /// Unsubscribe and join the forwarding thread. No-op when idle.
    pub fn stop(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        let _enter = self.span.enter();

        // Dropping the notify watcher drops its callback, which closes the
        // channel and lets the forwarding thread drain and exit.
        drop(subscription);

        if let Some(forwarder) = self.forwarder.take() {
            if forwarder.join().is_err() {
                tracing::error!("[watcher] forwarding thread for {} panicked", self.name());
            }
        }

        crate::log_event!("watcher", "stopped", "{}", self.name());
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Display for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Watcher: {}, running: {}", self.container, self.is_running())
    }
}

/// Filter/forward stage that runs on the forwarding thread.
struct EventFilter {
    index: usize,
    container: Container,
    sink: DispatchSink,
    renames: RenamePairer,
}

impl EventFilter {
    fn forward_all(mut self, rx: Receiver<notify::Result<notify::Event>>) {
        loop {
            let received = match self.renames.next_deadline(Instant::now()) {
                Some(wait) => rx.recv_timeout(wait),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            let open = match received {
                Ok(Ok(event)) => self.forward(&event),
                Ok(Err(e)) => {
                    tracing::warn!("[watcher] file watch error on {}: {e}", self.container.path);
                    true
                }
                Err(RecvTimeoutError::Timeout) => {
                    let expired = self.renames.flush_expired(Instant::now());
                    self.dispatch(expired)
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let held = self.renames.flush_all();
                    self.dispatch(held);
                    return;
                }
            };

            if !open {
                crate::debug_event!("watcher", "sink closed", "{}", self.container.path);
                return;
            }
        }
    }

    /// Forward one notification. Returns false once the sink is gone.
    fn forward(&mut self, event: &notify::Event) -> bool {
        let changes = self.renames.split(event, Instant::now());
        self.dispatch(changes)
    }

    fn dispatch(&self, changes: Vec<Change>) -> bool {
        for change in changes {
            if let Some(record) = self.filter(change.raw, change.is_directory, &change.path) {
                if self.sink.submit(record).is_err() {
                    return false;
                }
            }
        }
        true
    }

    /// Normalize, apply the extension filter and the rule predicate.
    fn filter(&self, raw: RawKind, is_directory: bool, path: &Path) -> Option<DispatchRecord> {
        let event = normalize(raw, is_directory);

        if !is_directory && self.container.is_excluded(path) {
            crate::debug_event!("watcher", "excluded", "{}", path.display());
            return None;
        }

        if !self.container.should_react(event) {
            return None;
        }
        let event = event?;

        let call = self.container.call_args(event, path);
        crate::log_event!("watcher", event.as_str(), "{}", path.display());

        Some(DispatchRecord {
            container: self.index,
            watch_path: self.container.path.clone(),
            call,
            command: self.container.cmd.clone(),
        })
    }
}
