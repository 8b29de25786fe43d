//! Directory enumeration for reconciliation.
//!
//! Walks the watched root and reports every file the change filter accepts
//! together with its modification time.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use super::filter::ChangeFilter;
use crate::error::WatcherError;
use crate::Result;

/// A file found on disk during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchedFile {
    /// Absolute path.
    pub path: PathBuf,
    /// Lowercased extension without the dot.
    pub extension: String,
    /// Modification time in seconds since the Unix epoch.
    pub modified: f64,
}

/// Recursively list accepted files below `root`.
///
/// Unreadable entries are logged and skipped.
///
/// # Errors
///
/// Returns an error if `root` itself cannot be read.
pub fn scan_directory(root: &Path, filter: &ChangeFilter) -> Result<Vec<WatchedFile>> {
    if !root.is_dir() {
        return Err(WatcherError::ScanFailed {
            path: root.display().to_string(),
            reason: "not a directory".to_string(),
        }
        .into());
    }

    let mut files = Vec::new();
    let mut errors = 0u64;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && filter.skips_dir(e.path())));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Error walking directory");
                errors += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() || !filter.accepts(entry.path()) {
            continue;
        }

        // Files without a stable key could never be matched against the index.
        if let Err(e) = relative_key(root, entry.path()) {
            tracing::warn!(error = %e, "Skipping file without an index key");
            continue;
        }

        let mtime = entry
            .metadata()
            .map_err(std::io::Error::from)
            .and_then(|m| m.modified());

        let modified = match mtime {
            Ok(time) => time
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "Cannot read mtime");
                errors += 1;
                continue;
            }
        };

        let extension = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        files.push(WatchedFile {
            path: entry.path().to_path_buf(),
            extension,
            modified,
        });
    }

    tracing::debug!(
        path = %root.display(),
        found = files.len(),
        errors,
        "Directory scan complete"
    );

    Ok(files)
}

/// Index key for a path below `root`: components joined with `/`.
///
/// # Errors
///
/// Returns an error if `path` is not below `root` or is not valid UTF-8.
pub fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| WatcherError::OutsideRoot {
        path: path.display().to_string(),
        root: root.display().to_string(),
    })?;

    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<&str>>>()
        .ok_or_else(|| WatcherError::NonUtf8Path {
            path: path.display().to_string(),
        })?;

    if parts.is_empty() {
        return Err(WatcherError::OutsideRoot {
            path: path.display().to_string(),
            root: root.display().to_string(),
        }
        .into());
    }

    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn filter_for(root: &Path) -> ChangeFilter {
        ChangeFilter::new(root)
            .with_extensions(["md", "txt", "pdf"])
            .with_temp_markers(vec![".swp".to_string()])
            .with_excluded_dirs(vec![".docsync".to_string()])
    }

    #[test]
    fn test_scan_directory() {
        let tmp = TempDir::new().unwrap();
        let sub = tmp.path().join("notes");
        fs::create_dir(&sub).unwrap();
        fs::write(tmp.path().join("a.txt"), "alpha").unwrap();
        fs::write(sub.join("b.md"), "# beta").unwrap();
        fs::write(sub.join("b.md.swp"), "swap").unwrap();
        fs::write(tmp.path().join("image.png"), [0u8; 8]).unwrap();

        let data = tmp.path().join(".docsync");
        fs::create_dir(&data).unwrap();
        fs::write(data.join("ignored.md"), "internal").unwrap();

        let filter = filter_for(tmp.path());
        let mut files = scan_directory(tmp.path(), &filter).unwrap();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let names: Vec<_> = files
            .iter()
            .map(|f| relative_key(tmp.path(), &f.path).unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt", "notes/b.md"]);
        assert_eq!(files[1].extension, "md");
        assert!(files.iter().all(|f| f.modified > 0.0));
    }

    #[test]
    fn test_scan_missing_root() {
        let filter = ChangeFilter::new("/nonexistent/docsync-root");
        let result = scan_directory(Path::new("/nonexistent/docsync-root"), &filter);
        assert!(result.is_err());
    }

    #[test]
    fn test_relative_key() {
        let root = Path::new("/docs");
        assert_eq!(
            relative_key(root, Path::new("/docs/a/b/c.md")).unwrap(),
            "a/b/c.md"
        );
        assert!(relative_key(root, Path::new("/other/c.md")).is_err());
        assert!(relative_key(root, Path::new("/docs")).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_names_are_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        let latin1 = tmp.path().join(OsStr::from_bytes(b"caf\xe9.txt"));
        fs::write(&latin1, "latin-1 name").unwrap();
        fs::write(tmp.path().join("cafe.txt"), "ascii name").unwrap();

        let err = relative_key(tmp.path(), &latin1).unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));

        let files = scan_directory(tmp.path(), &filter_for(tmp.path())).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, tmp.path().join("cafe.txt"));
    }
}
