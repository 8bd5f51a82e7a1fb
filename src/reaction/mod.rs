//! Reactions to matched events.
//!
//! - [`command`]: run the configured external command
//! - [`http`]: push results to a remote HTTP endpoint
//! - [`dispatcher`]: the default [`DispatchHandler`](crate::dispatch::DispatchHandler)
//!   combining both

pub mod command;
pub mod dispatcher;
mod error;
pub mod http;

pub use command::{CommandLine, CommandOutcome};
pub use dispatcher::ReactionDispatcher;
pub use error::ReactionError;
pub use http::{HttpPusher, Payload, PushFailure, PushResult, RequestOptions};
