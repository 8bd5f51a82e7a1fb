//! Error types for rule loading and validation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading or validating watch rules.
///
/// Every variant is startup-fatal: the agent refuses to start any watcher
/// while the rule set is invalid.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Rule file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Unsupported rule file extension for {path} (expected .json or .toml)")]
    UnsupportedExtension { path: PathBuf },

    #[error("Failed to read rule file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rule file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to encode rules: {reason}")]
    Encode { reason: String },

    #[error("Unknown event name '{name}'")]
    UnknownEvent { name: String },

    #[error("Container #{index} has an empty path")]
    EmptyPath { index: usize },

    #[error("Container #{index} ({path}) subscribes to no events")]
    NoEvents { index: usize, path: String },

    #[error("Container #{index} ({path}) has an empty command")]
    EmptyCommand { index: usize, path: String },

    #[error("Container #{index} ({path}) has an unparsable command: {reason}")]
    InvalidCommand {
        index: usize,
        path: String,
        reason: String,
    },
}
