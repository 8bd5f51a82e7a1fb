//! Default dispatch handler: run the command, then report to the remote.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::command::{CommandLine, CommandOutcome};
use super::http::{HttpPusher, RequestOptions};
use super::ReactionError;
use crate::bridge::WorkerPool;
use crate::dispatch::{DispatchHandler, DispatchRecord};

/// Remote endpoint that receives reaction reports.
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    pub pusher: HttpPusher,
    pub path: String,
}

/// Runs reaction commands on the worker pool and forwards the outcome.
pub struct ReactionDispatcher {
    pool: Arc<WorkerPool>,
    timeout: Duration,
    remote: Option<RemoteTarget>,
}

impl ReactionDispatcher {
    /// `timeout` of zero lets commands run without a deadline.
    pub fn new(pool: Arc<WorkerPool>, timeout: Duration) -> Self {
        Self {
            pool,
            timeout,
            remote: None,
        }
    }

    pub fn with_remote(mut self, pusher: HttpPusher, path: impl Into<String>) -> Self {
        self.remote = Some(RemoteTarget {
            pusher,
            path: path.into(),
        });
        self
    }

    pub fn remote(&self) -> Option<&RemoteTarget> {
        self.remote.as_ref()
    }

    async fn run_command(&self, record: &DispatchRecord) -> Result<CommandOutcome, ReactionError> {
        let line = CommandLine::from_template(&record.command)?;
        let call = record.call.clone();
        let timeout = self.timeout;
        let program = line.program().to_string();

        self.pool
            .run_or_else(
                move || line.invoke(&call),
                timeout,
                || async move {
                    tracing::warn!("[reaction] {program} timed out after {timeout:?}");
                    Ok(CommandOutcome::failed(format!("timed out after {timeout:?}")))
                },
            )
            .await?
    }

    async fn report(
        &self,
        remote: &RemoteTarget,
        record: &DispatchRecord,
        outcome: &CommandOutcome,
    ) -> Result<(), ReactionError> {
        let body = json!({
            "call": record.call,
            "watch_path": record.watch_path,
            "success": outcome.success,
            "output": outcome.output,
        });

        let result = remote
            .pusher
            .post(&remote.path, RequestOptions::json(body))
            .await;

        if result.success {
            crate::debug_event!("reaction", "reported", "{result}");
            return Ok(());
        }

        let url = remote
            .pusher
            .base_url()
            .join(&remote.path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| remote.path.clone());
        Err(ReactionError::PushFailed {
            url,
            reason: result
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[async_trait]
impl DispatchHandler for ReactionDispatcher {
    fn name(&self) -> &str {
        "reaction"
    }

    async fn handle(&self, record: DispatchRecord) -> Result<(), ReactionError> {
        let outcome = self.run_command(&record).await?;

        if outcome.success {
            crate::log_event!("reaction", "succeeded", "{} {}", record.call.on, record.call.path);
        } else {
            tracing::warn!(
                "[reaction] command failed for {} {}: {}",
                record.call.on,
                record.call.path,
                outcome.output
            );
        }
        if !outcome.output.is_empty() {
            crate::debug_event!("reaction", "output", "{}", outcome.output);
        }

        match &self.remote {
            Some(remote) => self.report(remote, &record, &outcome).await,
            None => Ok(()),
        }
    }
}
