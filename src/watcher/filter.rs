//! Change filter deciding which paths are relevant to the index.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::config::Config;
use crate::Result;

/// Filter applied to every watched path and every scanned file.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    root: PathBuf,
    extensions: Option<HashSet<String>>,
    temp_markers: Vec<String>,
    excluded_dirs: Vec<String>,
    ignore: Option<Gitignore>,
}

impl ChangeFilter {
    /// Create a filter for `root` with no allow-list and no exclusions.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extensions: None,
            temp_markers: Vec::new(),
            excluded_dirs: Vec::new(),
            ignore: None,
        }
    }

    /// Build the filter described by a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an ignore pattern is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        let patterns: Vec<&str> = config.ignore_patterns.iter().map(String::as_str).collect();
        let filter = Self::new(&config.watch_dir)
            .with_extensions(config.normalized_extensions())
            .with_temp_markers(config.temp_markers.clone())
            .with_excluded_dirs(config.all_excluded_dirs());

        if patterns.is_empty() {
            Ok(filter)
        } else {
            filter.with_patterns(&patterns)
        }
    }

    /// Restrict accepted files to these extensions (case-insensitive).
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: HashSet<String> = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self.extensions = (!set.is_empty()).then_some(set);
        self
    }

    /// Reject file names containing any of these markers.
    #[must_use]
    pub fn with_temp_markers(mut self, markers: Vec<String>) -> Self {
        self.temp_markers = markers;
        self
    }

    /// Never accept anything below a directory with one of these names.
    #[must_use]
    pub fn with_excluded_dirs(mut self, dirs: Vec<String>) -> Self {
        self.excluded_dirs = dirs;
        self
    }

    /// Add gitignore-style exclusion patterns, relative to the root.
    ///
    /// # Errors
    ///
    /// Returns an error if patterns are invalid.
    pub fn with_patterns(mut self, patterns: &[&str]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(&self.root);

        for pattern in patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| crate::Error::config(format!("invalid pattern: {e}")))?;
        }

        let gitignore = builder
            .build()
            .map_err(|e| crate::Error::config(format!("failed to build ignore rules: {e}")))?;

        self.ignore = Some(gitignore);
        Ok(self)
    }

    /// The root this filter was built for.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check whether a changed path is relevant to the index.
    ///
    /// Deleted paths no longer exist on disk and are judged by name only.
    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        if path.is_dir() {
            return false;
        }

        if self.is_temp_file(path) {
            return false;
        }

        if !self.has_allowed_extension(path) {
            return false;
        }

        !self.is_excluded(path, false)
    }

    /// Check whether a directory should be skipped during a scan.
    #[must_use]
    pub fn skips_dir(&self, dir: &Path) -> bool {
        dir != self.root && self.is_excluded(dir, true)
    }

    /// Check whether the extension passes the allow-list.
    #[must_use]
    pub fn has_allowed_extension(&self, path: &Path) -> bool {
        let Some(allowed) = &self.extensions else {
            return true;
        };

        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| allowed.contains(&ext.to_lowercase()))
    }

    fn is_temp_file(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.temp_markers
            .iter()
            .any(|marker| !marker.is_empty() && name.contains(marker.as_str()))
    }

    fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        let under_root = path.strip_prefix(&self.root).ok();
        let relative = under_root.unwrap_or(path);

        // Directory names anywhere between the root and the file.
        let mut components: Vec<_> = relative.components().collect();
        if !is_dir {
            components.pop();
        }
        let in_excluded_dir = components.iter().any(|c| match c {
            Component::Normal(name) => self
                .excluded_dirs
                .iter()
                .any(|d| name.to_str() == Some(d.as_str())),
            _ => false,
        });
        if in_excluded_dir {
            return true;
        }

        // Gitignore matching panics on paths outside its root.
        match (&self.ignore, under_root) {
            (Some(gi), Some(rel)) if !rel.as_os_str().is_empty() => {
                gi.matched_path_or_any_parents(rel, is_dir).is_ignore()
            }
            _ => false,
        }
    }
}
