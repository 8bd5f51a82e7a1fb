//! Dispatch queue plumbing between watchers and the consumer loop.
//!
//! Watchers only hold a [`DispatchSink`], which can enqueue but never
//! dequeue. The orchestrator keeps the receiving end and drains it with
//! [`consume`], one record at a time in submission order.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::reaction::ReactionError;
use crate::rules::{CallArgs, CommandTemplate};
use crate::watcher::WatchError;

/// A matched event waiting for its reaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    /// Position of the originating container in the rule set.
    pub container: usize,
    /// Path the originating container watches.
    pub watch_path: String,
    /// Arguments for the reaction.
    pub call: CallArgs,
    /// Command to run.
    pub command: CommandTemplate,
}

/// Receiving end of the dispatch queue, owned by the orchestrator.
pub type DispatchQueue = mpsc::UnboundedReceiver<DispatchRecord>;

/// Submit-only handle onto the dispatch queue.
#[derive(Debug, Clone)]
pub struct DispatchSink {
    sender: mpsc::UnboundedSender<DispatchRecord>,
}

impl DispatchSink {
    /// Create the unbounded queue. Only the orchestrator (and tests) call this.
    pub(crate) fn channel() -> (Self, DispatchQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Enqueue one record. Enqueueing a single record is atomic.
    pub fn submit(&self, record: DispatchRecord) -> Result<(), WatchError> {
        self.sender
            .send(record)
            .map_err(|_| WatchError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Processes dequeued records.
#[async_trait]
pub trait DispatchHandler: Send + Sync {
    /// Handler name for logging.
    fn name(&self) -> &str;

    /// Run the reaction for one record.
    async fn handle(&self, record: DispatchRecord) -> Result<(), ReactionError>;
}

/// Drain the dispatch queue until cancelled or every sink is dropped.
///
/// Records are handled sequentially. A failing record is logged and the
/// loop moves on. Returns the number of records handled.
pub async fn consume(
    mut queue: DispatchQueue,
    handler: Arc<dyn DispatchHandler>,
    ct: CancellationToken,
) -> usize {
    let mut handled = 0usize;
    crate::debug_event!("consumer", "started", "handler {}", handler.name());

    loop {
        let record = tokio::select! {
            biased;
            _ = ct.cancelled() => {
                crate::debug_event!("consumer", "cancelled");
                break;
            }
            next = queue.recv() => match next {
                Some(record) => record,
                None => {
                    crate::debug_event!("consumer", "queue closed");
                    break;
                }
            },
        };

        let label = format!("{} {}", record.call.on, record.call.path);
        match handler.handle(record).await {
            Ok(()) => crate::debug_event!(handler.name(), "handled", "{label}"),
            Err(e) => tracing::error!("[{}] reaction failed for {label}: {e}", handler.name()),
        }
        handled += 1;
    }

    crate::log_event!("consumer", "stopped", "{handled} records handled");
    handled
}
