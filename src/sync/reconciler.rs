//! Full diff between the watched directory and the index.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::storage::VectorIndex;
use crate::watcher::{relative_key, scan_directory, ChangeFilter};
use crate::Result;

/// Relative paths that differ between disk and index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileDiff {
    /// On disk, not in the index.
    pub new_files: BTreeSet<String>,
    /// In both, with a disk mtime strictly newer than the indexed time.
    pub modified_files: BTreeSet<String>,
    /// In the index, no longer on disk.
    pub deleted_files: BTreeSet<String>,
}

impl ReconcileDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.modified_files.is_empty() && self.deleted_files.is_empty()
    }

    /// Total number of paths needing work.
    #[must_use]
    pub fn len(&self) -> usize {
        self.new_files.len() + self.modified_files.len() + self.deleted_files.len()
    }

    /// Compare a disk listing with the index's recorded state.
    ///
    /// Both maps go from relative path to modification time in seconds.
    /// Equal timestamps count as unmodified.
    #[must_use]
    pub fn compute(disk: &HashMap<String, f64>, indexed: &HashMap<String, f64>) -> Self {
        let mut diff = Self::default();

        for (path, mtime) in disk {
            match indexed.get(path) {
                None => {
                    diff.new_files.insert(path.clone());
                }
                Some(indexed_at) if mtime > indexed_at => {
                    diff.modified_files.insert(path.clone());
                }
                Some(_) => {}
            }
        }

        diff.deleted_files = indexed
            .keys()
            .filter(|path| !disk.contains_key(*path))
            .cloned()
            .collect();

        diff
    }
}

/// Computes [`ReconcileDiff`]s for one watched root.
#[derive(Debug, Clone)]
pub struct Reconciler {
    root: PathBuf,
    filter: ChangeFilter,
}

impl Reconciler {
    #[must_use]
    pub fn new(filter: ChangeFilter) -> Self {
        Self {
            root: filter.root().to_path_buf(),
            filter,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the root and diff it against `index`.
    ///
    /// This only reads; it never mutates the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be scanned or the index cannot be
    /// read.
    pub fn diff(&self, index: &dyn VectorIndex) -> Result<ReconcileDiff> {
        let mut disk = HashMap::new();
        for file in scan_directory(&self.root, &self.filter)? {
            match relative_key(&self.root, &file.path) {
                Ok(key) => {
                    disk.insert(key, file.modified);
                }
                Err(e) => tracing::warn!(error = %e, "Skipping scanned file"),
            }
        }

        let indexed: HashMap<String, f64> = index
            .list_documents()?
            .into_iter()
            .map(|(id, meta)| (id, meta.last_modified))
            .collect();

        let diff = ReconcileDiff::compute(&disk, &indexed);
        tracing::debug!(
            on_disk = disk.len(),
            indexed = indexed.len(),
            new = diff.new_files.len(),
            modified = diff.modified_files.len(),
            deleted = diff.deleted_files.len(),
            "Reconciliation diff computed"
        );
        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    fn set(entries: &[&str]) -> BTreeSet<String> {
        entries.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_compute_diff() {
        let disk = map(&[("a.txt", 10.0), ("b.md", 20.0), ("c.pdf", 30.0)]);
        let indexed = map(&[("a.txt", 10.0), ("b.md", 15.0), ("gone.txt", 5.0)]);

        let diff = ReconcileDiff::compute(&disk, &indexed);
        assert_eq!(diff.new_files, set(&["c.pdf"]));
        assert_eq!(diff.modified_files, set(&["b.md"]));
        assert_eq!(diff.deleted_files, set(&["gone.txt"]));
        assert_eq!(diff.len(), 3);
    }

    #[test]
    fn test_equal_or_older_mtime_is_unmodified() {
        let disk = map(&[("a.txt", 10.0), ("b.txt", 9.0)]);
        let indexed = map(&[("a.txt", 10.0), ("b.txt", 10.0)]);

        let diff = ReconcileDiff::compute(&disk, &indexed);
        assert!(diff.is_empty());
    }
}
