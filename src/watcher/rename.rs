//! Folds notify's rename halves back into one move per rename.
//!
//! The inotify backend reports a rename inside the watched tree as three
//! notifications sharing a tracker cookie:
//!
//! ```text
//! Name(From) [old]  ->  Name(To) [new]  ->  Name(Both) [old, new]
//! ```
//!
//! Only the `Both` notification produces a move, classified by its
//! destination. Halves that never pair (moves into or out of the tree) each
//! produce one move; a source half is held for [`RENAME_WINDOW`] waiting
//! for its destination.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};

use crate::rules::{RawKind, is_directory_event};

/// How long a source half waits for its destination.
pub(crate) const RENAME_WINDOW: Duration = Duration::from_millis(200);

/// One path with its raw kind, ready for normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Change {
    pub raw: RawKind,
    pub path: PathBuf,
    pub is_directory: bool,
}

impl Change {
    /// A move classified by whatever now lives at `path`.
    fn moved(path: &Path) -> Self {
        Self {
            raw: RawKind::Moved,
            path: path.to_path_buf(),
            is_directory: path.is_dir(),
        }
    }
}

#[derive(Debug)]
struct PendingSource {
    tracker: usize,
    path: PathBuf,
    since: Instant,
}

#[derive(Debug)]
struct PairedDestination {
    tracker: usize,
    path: PathBuf,
}

/// Per-watcher rename pairing state.
#[derive(Debug, Default)]
pub(crate) struct RenamePairer {
    /// `From` half waiting for its `To`.
    pending: Option<PendingSource>,
    /// `To` half already paired; its `Both` notification comes next.
    paired: Option<PairedDestination>,
}

impl RenamePairer {
    /// Split a notification into changes, folding rename halves.
    pub fn split(&mut self, event: &notify::Event, now: Instant) -> Vec<Change> {
        let mut out = Vec::new();
        let tracker = event.tracker();

        // The combined notification follows its `To` half immediately.
        // Anything else means it is not coming.
        if let Some(paired) = self.paired.take() {
            let is_combined = tracker == Some(paired.tracker)
                && matches!(
                    event.kind,
                    EventKind::Modify(ModifyKind::Name(RenameMode::Both))
                );
            if !is_combined {
                out.push(Change::moved(&paired.path));
            }
        }
        out.extend(self.flush_expired(now));

        match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                match (tracker, event.paths.first()) {
                    (Some(tracker), Some(path)) => {
                        out.extend(self.flush_all());
                        self.pending = Some(PendingSource {
                            tracker,
                            path: path.clone(),
                            since: now,
                        });
                    }
                    _ => out.extend(event.paths.iter().map(|path| Change::moved(path))),
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                let pairs = tracker.is_some()
                    && self.pending.as_ref().map(|p| p.tracker) == tracker;
                match (pairs, tracker, event.paths.first()) {
                    (true, Some(tracker), Some(path)) => {
                        self.pending = None;
                        self.paired = Some(PairedDestination {
                            tracker,
                            path: path.clone(),
                        });
                    }
                    _ => out.extend(event.paths.iter().map(|path| Change::moved(path))),
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if tracker.is_some() && self.pending.as_ref().map(|p| p.tracker) == tracker {
                    self.pending = None;
                }
                if let Some(destination) = event.paths.last() {
                    out.push(Change::moved(destination));
                }
            }
            ref kind => {
                if let Some(raw) = RawKind::from_notify(kind) {
                    out.extend(event.paths.iter().map(|path| Change {
                        raw,
                        path: path.clone(),
                        is_directory: is_directory_event(kind, path),
                    }));
                } else {
                    crate::debug_event!("watcher", "unmapped", "{kind:?}");
                }
            }
        }

        out
    }

    /// Time left before the pending source half expires.
    pub fn next_deadline(&self, now: Instant) -> Option<Duration> {
        self.pending
            .as_ref()
            .map(|p| RENAME_WINDOW.saturating_sub(now.saturating_duration_since(p.since)))
    }

    /// Release a source half whose destination did not show up in time.
    pub fn flush_expired(&mut self, now: Instant) -> Vec<Change> {
        match &self.pending {
            Some(p) if now.saturating_duration_since(p.since) >= RENAME_WINDOW => self.flush_all(),
            _ => Vec::new(),
        }
    }

    /// Release every held half.
    pub fn flush_all(&mut self) -> Vec<Change> {
        let mut out = Vec::new();
        if let Some(paired) = self.paired.take() {
            out.push(Change::moved(&paired.path));
        }
        if let Some(pending) = self.pending.take() {
            out.push(Change::moved(&pending.path));
        }
        out
    }
}
