//! File system watching and change tracking.
//!
//! This module provides:
//! - The change filter (allow-list, temp files, excluded directories)
//! - The event buffer that deduplicates pending changes between cycles
//! - Directory watching using notify-rs
//! - Directory scanning for reconciliation

mod events;
mod filter;
mod scanner;
#[allow(clippy::module_inception)]
mod watcher;

pub use events::{ChangeKind, EventBuffer, PendingChangeSet};
pub use filter::ChangeFilter;
pub use scanner::{relative_key, scan_directory, WatchedFile};
pub use watcher::{ChangeObserver, DirectoryWatcher, WatcherStats, WatcherStatsSnapshot};
