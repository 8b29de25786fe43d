//! Directory watcher using notify-rs.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::events::{ChangeKind, EventBuffer};
use super::filter::ChangeFilter;
use crate::error::WatcherError;
use crate::Result;

/// Callback invoked after an accepted change has been buffered.
///
/// Runs on the notification thread while the watcher's stop gate is held, so
/// it must not call [`DirectoryWatcher::stop`].
pub type ChangeObserver = Arc<dyn Fn(&Path, ChangeKind) + Send + Sync>;

/// Statistics for file watching.
#[derive(Debug, Default)]
pub struct WatcherStats {
    pub events_received: AtomicU64,
    pub changes_accepted: AtomicU64,
    pub changes_filtered: AtomicU64,
    pub errors: AtomicU64,
}

impl WatcherStats {
    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> WatcherStatsSnapshot {
        WatcherStatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            changes_accepted: self.changes_accepted.load(Ordering::Relaxed),
            changes_filtered: self.changes_filtered.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of watcher stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherStatsSnapshot {
    pub events_received: u64,
    pub changes_accepted: u64,
    pub changes_filtered: u64,
    pub errors: u64,
}

/// State shared with the notification thread.
struct Shared {
    filter: ChangeFilter,
    buffer: Arc<EventBuffer>,
    observer: Option<ChangeObserver>,
    /// `true` while notifications may mutate the buffer.
    gate: Mutex<bool>,
    stats: WatcherStats,
}

impl Shared {
    fn handle(&self, result: notify::Result<Event>) {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, "Watch error");
                return;
            }
        };

        let open = self.gate.lock();
        if !*open {
            return;
        }

        self.stats.events_received.fetch_add(1, Ordering::Relaxed);
        for (kind, path) in classify(&event) {
            if !self.filter.accepts(&path) {
                self.stats.changes_filtered.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            tracing::trace!(path = %path.display(), kind = kind.as_str(), "Buffered change");
            self.buffer.record(kind, path.clone());
            self.stats.changes_accepted.fetch_add(1, Ordering::Relaxed);

            if let Some(observer) = &self.observer {
                observer(&path, kind);
            }
        }
        drop(open);
    }
}

/// Recursive watcher feeding an [`EventBuffer`].
pub struct DirectoryWatcher {
    root: PathBuf,
    shared: Arc<Shared>,
    watcher: Option<RecommendedWatcher>,
}

impl DirectoryWatcher {
    /// Create a watcher for `root`. Nothing is delivered until [`start`](Self::start).
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        filter: ChangeFilter,
        buffer: Arc<EventBuffer>,
        observer: Option<ChangeObserver>,
    ) -> Self {
        Self {
            root: root.into(),
            shared: Arc::new(Shared {
                filter,
                buffer,
                observer,
                gate: Mutex::new(false),
                stats: WatcherStats::default(),
            }),
            watcher: None,
        }
    }

    /// Subscribe to notifications for the whole tree below the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the root does not exist or cannot be watched.
    pub fn start(&mut self) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(());
        }

        if !self.root.is_dir() {
            return Err(WatcherError::WatchFailed {
                path: self.root.display().to_string(),
                reason: "directory does not exist".to_string(),
            }
            .into());
        }

        *self.shared.gate.lock() = true;

        let shared = Arc::clone(&self.shared);
        let handler = move |result: notify::Result<Event>| shared.handle(result);
        let mut watcher = notify::recommended_watcher(handler).map_err(|e| self.watch_failed(&e))?;

        if let Err(e) = watcher.watch(&self.root, RecursiveMode::Recursive) {
            *self.shared.gate.lock() = false;
            return Err(self.watch_failed(&e));
        }

        self.watcher = Some(watcher);
        tracing::info!(path = %self.root.display(), "Watching directory");
        Ok(())
    }

    /// Unsubscribe and wait for any in-flight notification to finish.
    ///
    /// Once this returns, no notification will touch the buffer again.
    pub fn stop(&mut self) {
        let Some(watcher) = self.watcher.take() else {
            return;
        };

        drop(watcher);
        // Waits for a callback currently holding the gate.
        *self.shared.gate.lock() = false;

        tracing::info!(path = %self.root.display(), "Stopped watching directory");
    }

    /// Whether notifications are being delivered.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Get a snapshot of the watcher statistics.
    #[must_use]
    pub fn stats(&self) -> WatcherStatsSnapshot {
        self.shared.stats.snapshot()
    }

    fn watch_failed(&self, e: &notify::Error) -> crate::Error {
        WatcherError::WatchFailed {
            path: self.root.display().to_string(),
            reason: e.to_string(),
        }
        .into()
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("root", &self.root)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Translate a raw notification into buffer operations.
///
/// Renames become a delete of the old path and a create of the new one.
fn classify(event: &Event) -> Vec<(ChangeKind, PathBuf)> {
    match &event.kind {
        EventKind::Create(_) => with_kind(ChangeKind::Created, &event.paths),
        EventKind::Remove(_) => with_kind(ChangeKind::Deleted, &event.paths),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::Both if event.paths.len() >= 2 => vec![
                (ChangeKind::Deleted, event.paths[0].clone()),
                (ChangeKind::Created, event.paths[1].clone()),
            ],
            RenameMode::From => with_kind(ChangeKind::Deleted, &event.paths),
            RenameMode::To => with_kind(ChangeKind::Created, &event.paths),
            _ => event
                .paths
                .iter()
                .map(|p| {
                    let kind = if p.exists() {
                        ChangeKind::Created
                    } else {
                        ChangeKind::Deleted
                    };
                    (kind, p.clone())
                })
                .collect(),
        },
        EventKind::Modify(_) => with_kind(ChangeKind::Modified, &event.paths),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn with_kind(kind: ChangeKind, paths: &[PathBuf]) -> Vec<(ChangeKind, PathBuf)> {
    paths.iter().map(|p| (kind, p.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::fs;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    #[test]
    fn test_classify_basic_kinds() {
        let created = classify(&event(EventKind::Create(CreateKind::File), &["/d/a.md"]));
        assert_eq!(created, vec![(ChangeKind::Created, PathBuf::from("/d/a.md"))]);

        let modified = classify(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/d/a.md"],
        ));
        assert_eq!(modified, vec![(ChangeKind::Modified, PathBuf::from("/d/a.md"))]);

        let removed = classify(&event(EventKind::Remove(RemoveKind::File), &["/d/a.md"]));
        assert_eq!(removed, vec![(ChangeKind::Deleted, PathBuf::from("/d/a.md"))]);
    }

    #[test]
    fn test_classify_rename_both() {
        let renamed = classify(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/d/old.md", "/d/new.md"],
        ));
        assert_eq!(
            renamed,
            vec![
                (ChangeKind::Deleted, PathBuf::from("/d/old.md")),
                (ChangeKind::Created, PathBuf::from("/d/new.md")),
            ]
        );
    }

    #[test]
    fn test_classify_one_sided_renames() {
        let from = classify(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/d/old.md"],
        ));
        assert_eq!(from, vec![(ChangeKind::Deleted, PathBuf::from("/d/old.md"))]);

        let to = classify(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/d/new.md"],
        ));
        assert_eq!(to, vec![(ChangeKind::Created, PathBuf::from("/d/new.md"))]);

        let gone = classify(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
            &["/nonexistent/docsync/x.md"],
        ));
        assert_eq!(gone[0].0, ChangeKind::Deleted);
    }

    #[test]
    fn test_classify_ignores_access() {
        let access = classify(&event(
            EventKind::Access(notify::event::AccessKind::Any),
            &["/d/a.md"],
        ));
        assert!(access.is_empty());
    }

    #[test]
    fn test_watch_nonexistent_dir() {
        let buffer = Arc::new(EventBuffer::new());
        let mut watcher = DirectoryWatcher::new(
            "/nonexistent/directory",
            ChangeFilter::new("/nonexistent/directory"),
            buffer,
            None,
        );
        assert!(watcher.start().is_err());
        assert!(!watcher.is_running());
    }

    fn wait_for(buffer: &EventBuffer, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if buffer.pending() > 0 {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_watcher_buffers_filtered_changes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let buffer = Arc::new(EventBuffer::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let observer: ChangeObserver = Arc::new(move |path: &Path, kind: ChangeKind| {
            seen_clone.lock().push((path.to_path_buf(), kind));
        });

        let filter = ChangeFilter::new(&root).with_extensions(["txt"]);
        let mut watcher =
            DirectoryWatcher::new(&root, filter, Arc::clone(&buffer), Some(observer));
        watcher.start().unwrap();

        fs::write(root.join("image.png"), [0u8; 4]).unwrap();
        fs::write(root.join("notes.txt"), "hello").unwrap();

        assert!(wait_for(&buffer, Duration::from_secs(5)));
        watcher.stop();

        let snapshot = buffer.snapshot_and_clear();
        assert!(snapshot.contains(&root.join("notes.txt")));
        assert!(!snapshot.contains(&root.join("image.png")));
        assert!(seen.lock().iter().all(|(p, _)| p.ends_with("notes.txt")));
        assert!(watcher.stats().changes_accepted >= 1);
    }

    #[test]
    fn test_no_changes_after_stop() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let buffer = Arc::new(EventBuffer::new());

        let mut watcher =
            DirectoryWatcher::new(&root, ChangeFilter::new(&root), Arc::clone(&buffer), None);
        watcher.start().unwrap();
        watcher.stop();
        assert!(!watcher.is_running());

        fs::write(root.join("late.txt"), "late").unwrap();
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(buffer.pending(), 0);
    }
}
