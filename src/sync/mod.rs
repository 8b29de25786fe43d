//! Incremental synchronization between a directory and the index.
//!
//! This module provides:
//! - Text splitting into overlapping chunks
//! - Reconciliation of the directory listing against indexed documents
//! - The synchronizer applying upserts and deletes per file
//! - The background worker driving both the event and reconciliation paths

mod chunker;
mod locks;
mod reconciler;
mod synchronizer;
mod worker;

pub use chunker::{SplitterConfig, TextSplitter};
pub use locks::{KeyGuard, KeyedLocks};
pub use reconciler::{ReconcileDiff, Reconciler};
pub use synchronizer::{SyncReport, Synchronizer};
pub use worker::{SyncWorker, WorkerState};
