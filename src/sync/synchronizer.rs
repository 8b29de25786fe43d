//! Index mutations for individual files.
//!
//! An upsert always starts by deleting whatever the index holds for the
//! file, then loads, chunks and re-inserts it. Both the event path and the
//! reconciliation path end up here, and all work on one document key is
//! serialized through [`KeyedLocks`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use super::chunker::{SplitterConfig, TextSplitter};
use super::locks::KeyedLocks;
use super::reconciler::ReconcileDiff;
use crate::config::Config;
use crate::embeddings::mean_embedding;
use crate::error::{Error, LoaderError, StorageError};
use crate::loader::{ContentUnit, LoaderRegistry};
use crate::observability::metrics;
use crate::storage::{DocumentMetadata, NewChunk, VectorIndex, DOCUMENT_KEY, LAST_MODIFIED_KEY};
use crate::watcher::{relative_key, PendingChangeSet};
use crate::Result;

/// Outcome counts of a batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub upserted: usize,
    pub deleted: usize,
    /// Files skipped because of a per-file error.
    pub failed: usize,
}

impl SyncReport {
    /// Add another report's counts to this one.
    pub fn merge(&mut self, other: Self) {
        self.upserted += other.upserted;
        self.deleted += other.deleted;
        self.failed += other.failed;
    }

    /// Whether nothing was attempted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.upserted == 0 && self.deleted == 0 && self.failed == 0
    }
}

/// Applies file-level changes to a [`VectorIndex`].
pub struct Synchronizer {
    root: PathBuf,
    index: Arc<dyn VectorIndex>,
    loaders: Arc<LoaderRegistry>,
    splitter: TextSplitter,
    extensions: Option<HashSet<String>>,
    locks: KeyedLocks,
}

impl Synchronizer {
    /// Create a synchronizer for files below `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        index: Arc<dyn VectorIndex>,
        loaders: LoaderRegistry,
        splitter: TextSplitter,
    ) -> Self {
        Self {
            root: root.into(),
            index,
            loaders: Arc::new(loaders),
            splitter,
            extensions: None,
            locks: KeyedLocks::new(),
        }
    }

    /// Synchronizer with the default loaders and the configured splitter and
    /// allow-list.
    pub fn from_config(config: &Config, index: Arc<dyn VectorIndex>) -> Self {
        let splitter = TextSplitter::new(SplitterConfig {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        });
        Self::new(
            config.watch_dir.clone(),
            index,
            LoaderRegistry::with_defaults(),
            splitter,
        )
        .with_extensions(config.normalized_extensions())
    }

    /// Only sync files with these extensions.
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: HashSet<String> = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        self.extensions = (!set.is_empty()).then_some(set);
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Replace every index record for `relative` with freshly loaded content.
    ///
    /// Returns the number of chunks written. If loading fails, the stale
    /// records are already gone and the file stays absent until the next
    /// successful run.
    ///
    /// # Errors
    ///
    /// Returns a loader error for unreadable or unsupported files and a
    /// storage error if the index is unavailable.
    pub async fn upsert_file(&self, relative: &str) -> Result<usize> {
        let _guard = self.locks.lock(relative).await;

        self.remove_records(relative)?;

        let path = self.root.join(relative);
        let loaders = Arc::clone(&self.loaders);
        let task_path = path.clone();
        let units = match tokio::task::spawn_blocking(move || loaders.load(&task_path)).await {
            Ok(loaded) => loaded?,
            // A panicking loader only takes its own file down.
            Err(e) if e.is_panic() => {
                return Err(LoaderError::failed(&path, "loader panicked").into());
            }
            Err(e) => return Err(Error::internal(format!("loader task failed: {e}"))),
        };

        let metadata = DocumentMetadata::now();

        if units.is_empty() {
            tracing::warn!(document = relative, "Source yielded no content");
            let zero = vec![0.0; self.index.dimension()];
            self.index.add_document(relative, &zero, "", metadata)?;
            return Ok(0);
        }

        let chunks = self.build_chunks(relative, &units, metadata);
        self.index.add_chunks(&chunks)?;

        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let embeddings = self.index.get_chunk_embeddings(&ids)?;
        let embedding = mean_embedding(&embeddings).ok_or_else(|| {
            StorageError::Vector(format!("cannot average chunk embeddings of '{relative}'"))
        })?;

        let text = units
            .iter()
            .map(|u| u.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        self.index.add_document(relative, &embedding, &text, metadata)?;

        metrics::FILES_UPSERTED.inc();
        metrics::CHUNKS_WRITTEN.inc_by(chunks.len() as u64);
        tracing::debug!(document = relative, chunks = chunks.len(), "Upserted document");
        Ok(chunks.len())
    }

    /// Remove the document record and all chunks for `relative`.
    ///
    /// Missing records are not an error.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the index is unavailable.
    pub async fn delete_file(&self, relative: &str) -> Result<()> {
        let _guard = self.locks.lock(relative).await;
        let (existed, chunks) = self.remove_records(relative)?;

        metrics::FILES_DELETED.inc();
        tracing::debug!(document = relative, existed, chunks, "Deleted document");
        Ok(())
    }

    /// Apply a drained event buffer. Paths are absolute.
    ///
    /// # Errors
    ///
    /// Per-file failures are counted in the report; only a storage failure
    /// aborts the batch.
    pub async fn sync(&self, changes: &PendingChangeSet) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for path in changes.upserts() {
            if let Some(relative) = self.checked_key(path, &mut report) {
                self.run_upsert(&relative, &mut report).await?;
            }
        }

        for path in &changes.deleted {
            if let Some(relative) = self.checked_key(path, &mut report) {
                self.run_delete(&relative, &mut report).await?;
            }
        }

        Ok(report)
    }

    /// Apply a reconciliation diff. Paths are relative keys.
    ///
    /// # Errors
    ///
    /// Same policy as [`sync`](Self::sync).
    pub async fn apply_diff(&self, diff: &ReconcileDiff) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for relative in diff.new_files.iter().chain(&diff.modified_files) {
            self.run_upsert(relative, &mut report).await?;
        }

        for relative in &diff.deleted_files {
            self.run_delete(relative, &mut report).await?;
        }

        Ok(report)
    }

    async fn run_upsert(&self, relative: &str, report: &mut SyncReport) -> Result<()> {
        match self.upsert_file(relative).await {
            Ok(_) => {
                report.upserted += 1;
                Ok(())
            }
            Err(e) => per_file_failure(relative, e, report),
        }
    }

    async fn run_delete(&self, relative: &str, report: &mut SyncReport) -> Result<()> {
        match self.delete_file(relative).await {
            Ok(()) => {
                report.deleted += 1;
                Ok(())
            }
            Err(e) => per_file_failure(relative, e, report),
        }
    }

    /// Relative key for an absolute path, or `None` if it must be skipped.
    fn checked_key(&self, path: &Path, report: &mut SyncReport) -> Option<String> {
        let allowed = self.extension_allowed(path);
        debug_assert!(allowed, "change filter let through {}", path.display());
        if !allowed {
            tracing::error!(path = %path.display(), "Extension not allowed, skipping");
            report.failed += 1;
            return None;
        }

        match relative_key(&self.root, path) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::error!(error = %e, "Skipping path without an index key");
                report.failed += 1;
                None
            }
        }
    }

    fn extension_allowed(&self, path: &Path) -> bool {
        let Some(allowed) = &self.extensions else {
            return true;
        };
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| allowed.contains(&ext.to_lowercase()))
    }

    fn remove_records(&self, relative: &str) -> Result<(bool, usize)> {
        let existed = self.index.delete_document(relative)?;
        let chunks = self.index.delete_chunks_for_document(relative)?;
        Ok((existed, chunks))
    }

    fn build_chunks(
        &self,
        relative: &str,
        units: &[ContentUnit],
        metadata: DocumentMetadata,
    ) -> Vec<NewChunk> {
        let chunk = |unit: &ContentUnit, text: String| {
            let mut meta = unit.metadata.clone();
            meta.insert(DOCUMENT_KEY.to_string(), Value::from(relative));
            meta.insert(
                LAST_MODIFIED_KEY.to_string(),
                Value::from(metadata.last_modified),
            );
            NewChunk {
                id: Uuid::new_v4().to_string(),
                text,
                metadata: meta,
            }
        };

        let mut chunks: Vec<NewChunk> = units
            .iter()
            .flat_map(|unit| {
                self.splitter
                    .split(&unit.text)
                    .into_iter()
                    .map(move |text| (unit, text))
            })
            .map(|(unit, text)| chunk(unit, text))
            .collect();

        if chunks.is_empty() {
            chunks = units.iter().map(|u| chunk(u, u.text.clone())).collect();
        }
        chunks
    }
}

/// Count a per-file error, or hand back an error that must abort the batch.
fn per_file_failure(relative: &str, e: Error, report: &mut SyncReport) -> Result<()> {
    if !e.is_per_file() {
        return Err(e);
    }
    metrics::record_failure(e.kind());
    tracing::error!(document = relative, error = %e, "Failed to sync file");
    report.failed += 1;
    Ok(())
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("root", &self.root)
            .field("loaders", &self.loaders)
            .field("splitter", &self.splitter)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::loader::{Loader, PlainTextLoader, SOURCE_KEY};
    use crate::storage::SqliteIndex;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        index: Arc<SqliteIndex>,
        sync: Synchronizer,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(SqliteIndex::in_memory(Arc::new(HashEmbedder::new(64))).unwrap());
        let sync = Synchronizer::new(
            dir.path(),
            Arc::clone(&index) as Arc<dyn VectorIndex>,
            LoaderRegistry::with_defaults(),
            TextSplitter::new(SplitterConfig {
                chunk_size: 40,
                chunk_overlap: 10,
            }),
        )
        .with_extensions(["md", "txt", "pdf"]);
        Fixture { dir, index, sync }
    }

    #[tokio::test]
    async fn test_upsert_writes_chunks_and_document() {
        let f = fixture();
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(5);
        fs::write(f.dir.path().join("fox.txt"), &text).unwrap();

        let written = f.sync.upsert_file("fox.txt").await.unwrap();
        assert!(written > 1);
        assert_eq!(f.index.count_chunks().unwrap(), written);

        let docs = f.index.list_documents().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].0, "fox.txt");

        let hits = f.index.query_chunks("fox", 1, Some("fox.txt")).unwrap();
        assert_eq!(hits[0].metadata[DOCUMENT_KEY].as_str(), Some("fox.txt"));
        assert!(hits[0].metadata.contains_key(SOURCE_KEY));
        assert!(hits[0].metadata.contains_key(LAST_MODIFIED_KEY));
    }

    #[tokio::test]
    async fn test_upsert_replaces_previous_chunks() {
        let f = fixture();
        let path = f.dir.path().join("a.md");
        fs::write(&path, "# One\n\n".to_string() + &"alpha beta gamma ".repeat(10)).unwrap();
        f.sync.upsert_file("a.md").await.unwrap();

        fs::write(&path, "short").unwrap();
        let written = f.sync.upsert_file("a.md").await.unwrap();

        assert_eq!(written, 1);
        assert_eq!(f.index.count_chunks().unwrap(), 1);
        let hits = f.index.query_documents("short", 1, None).unwrap();
        assert_eq!(hits[0].text, "short");
    }

    #[tokio::test]
    async fn test_whitespace_file_falls_back_to_units() {
        let f = fixture();
        fs::write(f.dir.path().join("blank.txt"), "   \n").unwrap();

        let written = f.sync.upsert_file("blank.txt").await.unwrap();
        assert_eq!(written, 1);
        assert_eq!(f.index.list_documents().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_removes_stale_records() {
        let f = fixture();
        let path = f.dir.path().join("gone.txt");
        fs::write(&path, "soon gone").unwrap();
        f.sync.upsert_file("gone.txt").await.unwrap();

        fs::remove_file(&path).unwrap();
        let err = f.sync.upsert_file("gone.txt").await.unwrap_err();

        assert!(err.is_per_file());
        assert!(f.index.list_documents().unwrap().is_empty());
        assert_eq!(f.index.count_chunks().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let f = fixture();
        fs::write(f.dir.path().join("a.txt"), "content").unwrap();
        f.sync.upsert_file("a.txt").await.unwrap();

        f.sync.delete_file("a.txt").await.unwrap();
        f.sync.delete_file("a.txt").await.unwrap();

        assert!(f.index.list_documents().unwrap().is_empty());
        assert_eq!(f.index.count_chunks().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sync_continues_after_per_file_failure() {
        let f = fixture();
        fs::write(f.dir.path().join("good.txt"), "fine").unwrap();
        fs::write(f.dir.path().join("bad.pdf"), "not really a pdf").unwrap();

        let mut changes = PendingChangeSet::new();
        changes.created.insert(f.dir.path().join("bad.pdf"));
        changes.created.insert(f.dir.path().join("good.txt"));
        changes.deleted.insert(f.dir.path().join("never-indexed.md"));

        let report = f.sync.sync(&changes).await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                upserted: 1,
                deleted: 1,
                failed: 1
            }
        );
        let ids: Vec<String> = f
            .index
            .list_documents()
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["good.txt"]);
    }

    struct PanickingLoader;

    impl Loader for PanickingLoader {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn extensions(&self) -> &[&'static str] {
            &["pdf"]
        }

        fn load(&self, path: &Path) -> Result<Vec<ContentUnit>> {
            panic!("cannot parse {}", path.display());
        }
    }

    #[tokio::test]
    async fn test_panicking_loader_fails_only_its_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.pdf"), "%PDF-1.5 truncated").unwrap();
        fs::write(dir.path().join("b.txt"), "still indexed").unwrap();
        let index = Arc::new(SqliteIndex::in_memory(Arc::new(HashEmbedder::new(16))).unwrap());
        let mut loaders = LoaderRegistry::new();
        loaders.register(PlainTextLoader);
        loaders.register(PanickingLoader);
        let sync = Synchronizer::new(
            dir.path(),
            Arc::clone(&index) as Arc<dyn VectorIndex>,
            loaders,
            TextSplitter::default(),
        );

        let err = sync.upsert_file("a.pdf").await.unwrap_err();
        assert!(err.is_per_file());
        assert_eq!(err.kind(), "loader_failure");

        let diff = ReconcileDiff {
            new_files: BTreeSet::from(["a.pdf".to_string(), "b.txt".to_string()]),
            ..ReconcileDiff::default()
        };
        let report = sync.apply_diff(&diff).await.unwrap();
        assert_eq!(report.upserted, 1);
        assert_eq!(report.failed, 1);

        let ids: Vec<String> = index
            .list_documents()
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["b.txt"]);
    }

    #[tokio::test]
    async fn test_sync_skips_paths_outside_root() {
        let f = fixture();
        let mut changes = PendingChangeSet::new();
        changes.modified.insert(PathBuf::from("/elsewhere/notes.md"));

        let report = f.sync.sync(&changes).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.upserted, 0);
    }

    #[tokio::test]
    async fn test_apply_diff() {
        let f = fixture();
        fs::write(f.dir.path().join("new.md"), "# New\nbody").unwrap();
        fs::write(f.dir.path().join("old.txt"), "old").unwrap();
        f.sync.upsert_file("old.txt").await.unwrap();

        let diff = ReconcileDiff {
            new_files: ["new.md".to_string()].into(),
            modified_files: BTreeSet::new(),
            deleted_files: ["old.txt".to_string()].into(),
        };
        let report = f.sync.apply_diff(&diff).await.unwrap();

        assert_eq!(report.upserted, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(
            f.index.chunk_documents().unwrap(),
            BTreeSet::from(["new.md".to_string()])
        );
    }

    struct EmptyLoader;

    impl Loader for EmptyLoader {
        fn name(&self) -> &'static str {
            "empty"
        }

        fn extensions(&self) -> &[&'static str] {
            &["txt"]
        }

        fn load(&self, _path: &Path) -> Result<Vec<ContentUnit>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_source_without_units_is_recorded() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("empty.txt"), "").unwrap();
        let index = Arc::new(SqliteIndex::in_memory(Arc::new(HashEmbedder::new(8))).unwrap());
        let mut loaders = LoaderRegistry::new();
        loaders.register(EmptyLoader);
        let sync = Synchronizer::new(
            dir.path(),
            Arc::clone(&index) as Arc<dyn VectorIndex>,
            loaders,
            TextSplitter::default(),
        );

        assert_eq!(sync.upsert_file("empty.txt").await.unwrap(), 0);
        assert_eq!(index.list_documents().unwrap().len(), 1);
        assert_eq!(index.count_chunks().unwrap(), 0);
    }
}
