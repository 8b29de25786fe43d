//! Pending change accumulation between sync cycles.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Kind of filesystem change reported to the buffer and observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// File appeared.
    Created,
    /// File content changed.
    Modified,
    /// File disappeared.
    Deleted,
}

impl ChangeKind {
    /// Lowercase name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

/// Absolute paths changed since the last snapshot, split by kind.
///
/// The three sets are disjoint.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingChangeSet {
    /// Files that did not exist from the index's perspective.
    pub created: BTreeSet<PathBuf>,
    /// Files whose content changed.
    pub modified: BTreeSet<PathBuf>,
    /// Files that were removed.
    pub deleted: BTreeSet<PathBuf>,
}

impl PendingChangeSet {
    /// Create a new empty change set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            created: BTreeSet::new(),
            modified: BTreeSet::new(),
            deleted: BTreeSet::new(),
        }
    }

    /// Check if no change is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Total number of pending paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.created.len() + self.modified.len() + self.deleted.len()
    }

    /// Paths that need a full upsert, in order.
    pub fn upserts(&self) -> impl Iterator<Item = &PathBuf> {
        self.created.iter().chain(self.modified.iter())
    }

    /// Check whether `path` appears in any set.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.created.contains(path) || self.modified.contains(path) || self.deleted.contains(path)
    }

    fn record(&mut self, kind: ChangeKind, path: PathBuf) {
        match kind {
            ChangeKind::Created => {
                // A file re-created after a pending delete replaces an
                // indexed document; keep it deletable by a later event.
                if self.deleted.remove(&path) {
                    self.modified.insert(path);
                } else if !self.modified.contains(&path) {
                    self.created.insert(path);
                }
            }
            ChangeKind::Modified => {
                self.deleted.remove(&path);
                if !self.created.contains(&path) {
                    self.modified.insert(path);
                }
            }
            ChangeKind::Deleted => {
                self.modified.remove(&path);
                if !self.created.remove(&path) {
                    self.deleted.insert(path);
                }
            }
        }
    }
}

/// Thread-safe accumulator fed by the watcher and drained by the worker.
#[derive(Debug, Default)]
pub struct EventBuffer {
    inner: Mutex<PendingChangeSet>,
}

impl EventBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly created file.
    pub fn record_created(&self, path: impl Into<PathBuf>) {
        self.record(ChangeKind::Created, path.into());
    }

    /// Record a modified file.
    pub fn record_modified(&self, path: impl Into<PathBuf>) {
        self.record(ChangeKind::Modified, path.into());
    }

    /// Record a deleted file.
    ///
    /// Deleting a file that is still pending creation cancels it entirely.
    pub fn record_deleted(&self, path: impl Into<PathBuf>) {
        self.record(ChangeKind::Deleted, path.into());
    }

    /// Record a change of the given kind.
    pub fn record(&self, kind: ChangeKind, path: PathBuf) {
        self.inner.lock().record(kind, path);
    }

    /// Take every pending change and leave the buffer empty.
    ///
    /// Runs as one critical section, so each recorded event lands in exactly
    /// one snapshot.
    #[must_use]
    pub fn snapshot_and_clear(&self) -> PendingChangeSet {
        std::mem::take(&mut *self.inner.lock())
    }

    /// Number of pending paths.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_const_constructors() {
        const EMPTY: PendingChangeSet = PendingChangeSet::new();
        const LABEL: &str = ChangeKind::Deleted.as_str();

        assert!(EMPTY.is_empty());
        assert_eq!(EMPTY.len(), 0);
        assert_eq!(LABEL, "deleted");
        assert_eq!(EMPTY, PendingChangeSet::default());
    }

    #[test]
    fn test_create_then_delete_cancels() {
        let buffer = EventBuffer::new();
        buffer.record_created("/docs/a.txt");
        buffer.record_modified("/docs/a.txt");
        buffer.record_deleted("/docs/a.txt");

        let snapshot = buffer.snapshot_and_clear();
        assert!(snapshot.is_empty());
        assert!(!snapshot.contains(Path::new("/docs/a.txt")));
    }

    #[test]
    fn test_modify_then_delete_is_delete_only() {
        let buffer = EventBuffer::new();
        buffer.record_modified("/docs/a.txt");
        buffer.record_deleted("/docs/a.txt");

        let snapshot = buffer.snapshot_and_clear();
        assert!(snapshot.created.is_empty());
        assert!(snapshot.modified.is_empty());
        assert_eq!(
            snapshot.deleted.into_iter().collect::<Vec<_>>(),
            vec![PathBuf::from("/docs/a.txt")]
        );
    }

    #[test]
    fn test_modified_after_created_stays_created() {
        let buffer = EventBuffer::new();
        buffer.record_created("/docs/a.txt");
        buffer.record_modified("/docs/a.txt");
        buffer.record_modified("/docs/a.txt");

        let snapshot = buffer.snapshot_and_clear();
        assert_eq!(snapshot.created.len(), 1);
        assert!(snapshot.modified.is_empty());
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_recreate_after_delete_becomes_modified() {
        let buffer = EventBuffer::new();
        buffer.record_deleted("/docs/a.txt");
        buffer.record_created("/docs/a.txt");

        let snapshot = buffer.snapshot_and_clear();
        assert!(snapshot.deleted.is_empty());
        assert!(snapshot.created.is_empty());
        assert!(snapshot.modified.contains(Path::new("/docs/a.txt")));

        // A second delete must still reach the index.
        buffer.record_deleted("/docs/a.txt");
        buffer.record_created("/docs/a.txt");
        buffer.record_deleted("/docs/a.txt");
        let snapshot = buffer.snapshot_and_clear();
        assert!(snapshot.deleted.contains(Path::new("/docs/a.txt")));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_snapshot_clears_buffer() {
        let buffer = EventBuffer::new();
        buffer.record_created("/docs/a.txt");
        buffer.record_deleted("/docs/b.txt");
        assert_eq!(buffer.pending(), 2);

        let first = buffer.snapshot_and_clear();
        assert_eq!(first.len(), 2);
        assert_eq!(buffer.pending(), 0);
        assert!(buffer.snapshot_and_clear().is_empty());
    }

    #[test]
    fn test_upserts_order() {
        let mut set = PendingChangeSet::new();
        set.record(ChangeKind::Modified, PathBuf::from("/b"));
        set.record(ChangeKind::Created, PathBuf::from("/a"));

        let upserts: Vec<_> = set.upserts().cloned().collect();
        assert_eq!(upserts, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn test_concurrent_records_are_never_lost() {
        let buffer = Arc::new(EventBuffer::new());
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        buffer.record_created(format!("/docs/{t}-{i}.txt"));
                    }
                })
            })
            .collect();

        let mut seen = BTreeSet::new();
        while writers.iter().any(|w| !w.is_finished()) {
            let snapshot = buffer.snapshot_and_clear();
            for path in snapshot.created {
                assert!(seen.insert(path), "path delivered twice");
            }
        }
        for writer in writers {
            writer.join().unwrap();
        }
        seen.extend(buffer.snapshot_and_clear().created);

        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_change_kind_names() {
        assert_eq!(ChangeKind::Created.as_str(), "created");
        assert_eq!(ChangeKind::Modified.as_str(), "modified");
        assert_eq!(ChangeKind::Deleted.as_str(), "deleted");
    }
}
