//! Canonical filesystem events and normalization of raw notifications.
//!
//! A raw notification is a primitive change kind plus a directory flag.
//! [`normalize`] folds it into one of the ten canonical [`Event`] kinds,
//! or `None` when no canonical meaning exists (e.g. a directory "opened").

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use notify::EventKind;
use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::RuleError;

/// Canonical filesystem event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    FileCreated,
    FileModified,
    FileDeleted,
    FileMoved,
    FileClosed,
    FileOpened,
    DirCreated,
    DirModified,
    DirDeleted,
    DirMoved,
}

impl Event {
    pub const ALL: [Event; 10] = [
        Event::FileDeleted,
        Event::FileMoved,
        Event::FileCreated,
        Event::FileModified,
        Event::FileClosed,
        Event::FileOpened,
        Event::DirDeleted,
        Event::DirModified,
        Event::DirCreated,
        Event::DirMoved,
    ];

    /// Wire name used in rule files and command arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::FileCreated => "fileCreated",
            Event::FileModified => "fileModified",
            Event::FileDeleted => "fileDeleted",
            Event::FileMoved => "fileMoved",
            Event::FileClosed => "fileClosed",
            Event::FileOpened => "fileOpened",
            Event::DirCreated => "dirCreated",
            Event::DirModified => "dirModified",
            Event::DirDeleted => "dirDeleted",
            Event::DirMoved => "dirMoved",
        }
    }

    /// Structural events of a directory. File-scoped rules never react to these.
    pub fn is_directory_scoped(&self) -> bool {
        matches!(
            self,
            Event::DirCreated | Event::DirModified | Event::DirDeleted | Event::DirMoved
        )
    }

    /// Case-insensitive comparison against a textual event name.
    pub fn matches_name(&self, name: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Event {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Event::ALL
            .iter()
            .copied()
            .find(|event| event.matches_name(s))
            .ok_or_else(|| RuleError::UnknownEvent {
                name: s.to_string(),
            })
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Primitive change kind delivered by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Moved,
    Deleted,
    Created,
    Modified,
    Closed,
    Opened,
}

impl RawKind {
    /// Parse one of the six lowercase raw kind names.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "moved" => Some(RawKind::Moved),
            "deleted" => Some(RawKind::Deleted),
            "created" => Some(RawKind::Created),
            "modified" => Some(RawKind::Modified),
            "closed" => Some(RawKind::Closed),
            "opened" => Some(RawKind::Opened),
            _ => None,
        }
    }

    /// Map a notify event kind onto a raw kind. Reads, closes without a
    /// write and `Any`/`Other` notifications have no raw kind.
    pub fn from_notify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(RawKind::Created),
            EventKind::Remove(_) => Some(RawKind::Deleted),
            EventKind::Modify(ModifyKind::Name(_)) => Some(RawKind::Moved),
            EventKind::Modify(_) => Some(RawKind::Modified),
            EventKind::Access(AccessKind::Open(_)) => Some(RawKind::Opened),
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => Some(RawKind::Closed),
            _ => None,
        }
    }
}

/// Fold a raw notification into a canonical event.
pub fn normalize(raw: RawKind, is_directory: bool) -> Option<Event> {
    match (raw, is_directory) {
        (RawKind::Moved, false) => Some(Event::FileMoved),
        (RawKind::Moved, true) => Some(Event::DirMoved),
        (RawKind::Deleted, false) => Some(Event::FileDeleted),
        (RawKind::Deleted, true) => Some(Event::DirDeleted),
        (RawKind::Created, false) => Some(Event::FileCreated),
        (RawKind::Created, true) => Some(Event::DirCreated),
        (RawKind::Modified, false) => Some(Event::FileModified),
        (RawKind::Modified, true) => Some(Event::DirModified),
        (RawKind::Closed, false) => Some(Event::FileClosed),
        (RawKind::Opened, false) => Some(Event::FileOpened),
        (RawKind::Closed | RawKind::Opened, true) => None,
    }
}

/// Normalize a textual raw kind. Unknown names yield `None`.
pub fn normalize_name(name: &str, is_directory: bool) -> Option<Event> {
    RawKind::parse(name).and_then(|raw| normalize(raw, is_directory))
}

/// Decide whether a notify notification for `path` concerns a directory.
///
/// Folder hints from the backend win. Without a hint the filesystem is
/// consulted; a path that no longer exists counts as a file.
pub fn is_directory_event(kind: &EventKind, path: &Path) -> bool {
    match kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => true,
        EventKind::Create(CreateKind::File) | EventKind::Remove(RemoveKind::File) => false,
        _ => path.is_dir(),
    }
}
