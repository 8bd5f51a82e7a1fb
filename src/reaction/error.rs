//! Error types for reaction execution.

use thiserror::Error;

use crate::bridge::BridgeError;

/// Errors from running a reaction for a dispatched event.
#[derive(Error, Debug)]
pub enum ReactionError {
    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Execution bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Push to {url} failed: {reason}")]
    PushFailed { url: String, reason: String },

    #[error("Invalid remote address '{address}': {reason}")]
    InvalidRemote { address: String, reason: String },
}
