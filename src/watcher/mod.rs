//! Watch supervisors, one filesystem subscription per rule.
//!
//! # Architecture
//!
//! ```text
//! Watcher (one per Container)
//!   - notify::RecommendedWatcher (backend thread)
//!   - forwarding thread: pair renames -> normalize -> exclude -> should_react
//!         |
//!    DispatchSink (shared, submit-only)
//! ```

mod error;
mod rename;
mod supervisor;

pub use error::WatchError;
pub use supervisor::Watcher;
