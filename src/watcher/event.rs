//! Change events as seen by handlers.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use notify::event::{EventKind, ModifyKind, RenameMode};

/// Kind of filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Remove,
    /// Renamed within the same directory.
    Rename,
    /// Moved to another directory.
    Move,
    /// Permissions or other metadata changed.
    Chmod,
    Write,
}

impl Op {
    /// Map a notify event to the operation it represents.
    ///
    /// Returns `None` for kinds outside the watched set (access events and
    /// anything notify could not classify).
    pub fn from_notify(event: &notify::Event) -> Option<Self> {
        match event.kind {
            EventKind::Create(_) => Some(Op::Create),
            EventKind::Remove(_) => Some(Op::Remove),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                match (event.paths.first(), event.paths.get(1)) {
                    (Some(from), Some(to)) if from.parent() != to.parent() => Some(Op::Move),
                    _ => Some(Op::Rename),
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => Some(Op::Rename),
            EventKind::Modify(ModifyKind::Metadata(_)) => Some(Op::Chmod),
            EventKind::Modify(_) => Some(Op::Write),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Op::Create => "CREATE",
            Op::Remove => "REMOVE",
            Op::Rename => "RENAME",
            Op::Move => "MOVE",
            Op::Chmod => "CHMOD",
            Op::Write => "WRITE",
        };
        f.write_str(name)
    }
}

/// One filesystem change, dispatched once to every registered handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    op: Op,
    path: PathBuf,
    /// Source path for renames and moves, when the backend reports it.
    old_path: Option<PathBuf>,
    timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(op: Op, path: impl Into<PathBuf>) -> Self {
        Self {
            op,
            path: path.into(),
            old_path: None,
            timestamp: Utc::now(),
        }
    }

    /// Build a change event from a raw notify event.
    pub fn from_notify(event: &notify::Event) -> Option<Self> {
        let op = Op::from_notify(event)?;
        let path = event.paths.last()?.clone();
        let old_path = if event.paths.len() > 1 {
            event.paths.first().cloned()
        } else {
            None
        };

        Some(Self {
            op,
            path,
            old_path,
            timestamp: Utc::now(),
        })
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn old_path(&self) -> Option<&Path> {
        self.old_path.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.old_path {
            Some(old) => write!(
                f,
                "{} {} -> {}",
                self.op,
                old.display(),
                self.path.display()
            ),
            None => write!(f, "{} {}", self.op, self.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        paths
            .iter()
            .fold(notify::Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    #[test]
    fn test_op_mapping() {
        let cases = [
            (EventKind::Create(CreateKind::File), Some(Op::Create)),
            (EventKind::Remove(RemoveKind::Folder), Some(Op::Remove)),
            (
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                Some(Op::Write),
            ),
            (
                EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
                Some(Op::Chmod),
            ),
            (
                EventKind::Modify(ModifyKind::Name(RenameMode::From)),
                Some(Op::Rename),
            ),
            (EventKind::Access(AccessKind::Any), None),
            (EventKind::Other, None),
        ];

        for (kind, expected) in cases {
            assert_eq!(Op::from_notify(&event(kind, &["/w/a.txt"])), expected);
        }
    }

    #[test]
    fn test_rename_vs_move() {
        let rename = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/w/a.txt", "/w/b.txt"],
        );
        let moved = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/w/a.txt", "/w/sub/a.txt"],
        );

        assert_eq!(Op::from_notify(&rename), Some(Op::Rename));
        assert_eq!(Op::from_notify(&moved), Some(Op::Move));

        let change = ChangeEvent::from_notify(&moved).unwrap();
        assert_eq!(change.path(), Path::new("/w/sub/a.txt"));
        assert_eq!(change.old_path(), Some(Path::new("/w/a.txt")));
        assert_eq!(change.to_string(), "MOVE /w/a.txt -> /w/sub/a.txt");
    }

    #[test]
    fn test_event_without_paths_is_dropped() {
        let bare = notify::Event::new(EventKind::Create(CreateKind::Any));
        assert!(ChangeEvent::from_notify(&bare).is_none());
    }
}
