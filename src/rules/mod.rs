//! Declarative watch rules and the matching predicate.
//!
//! ```text
//! raw notification ──► normalize() ──► Option<Event>
//!                                          │
//!                        Container::should_react()
//!                                          │
//!                                      CallArgs
//! ```

mod config;
mod container;
mod error;
mod event;

pub use config::RuleSet;
pub use container::{CallArgs, CommandTemplate, Container, TargetKind};
pub use error::RuleError;
pub use event::{Event, RawKind, is_directory_event, normalize, normalize_name};
