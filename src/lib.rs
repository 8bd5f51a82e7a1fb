//! Filesystem watch agent.
//!
//! Watches the paths declared in a rule file, normalizes raw notifications
//! into [`Event`]s, and runs a reaction for every event a rule accepts.

pub mod logging;

pub mod bridge;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod orchestrator;
pub mod reaction;
pub mod rules;
pub mod watcher;

pub use bridge::{BridgeError, Ticket, WorkerPool};
pub use config::Settings;
pub use dispatch::{DispatchHandler, DispatchRecord, DispatchSink};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, OrchestratorError};
pub use reaction::{ReactionDispatcher, ReactionError};
pub use rules::{CallArgs, Container, Event, RuleError, RuleSet, TargetKind};
pub use watcher::{WatchError, Watcher};
