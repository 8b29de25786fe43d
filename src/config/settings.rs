//! Configuration settings and validation.

use crate::loader::LoaderRegistry;
use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Name of the data directory created inside the watched root by default.
pub const DEFAULT_DATA_DIR_NAME: &str = ".docsync";

/// Extensions indexed when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["md", "txt", "pdf"];

/// Name fragments that mark swap, lock, backup and editor temp files.
pub const DEFAULT_TEMP_MARKERS: &[&str] = &[".tmp", ".swp", "~", ".lock", "#"];

/// Main configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory whose contents are mirrored into the index.
    pub watch_dir: PathBuf,

    /// Directory for the `SQLite` index. Defaults to `<watch_dir>/.docsync`.
    pub data_dir: Option<PathBuf>,

    /// Allow-listed file extensions, without the leading dot.
    pub extensions: Vec<String>,

    /// Name fragments that mark temporary files.
    pub temp_markers: Vec<String>,

    /// Extra exclusion patterns in gitignore syntax.
    pub ignore_patterns: Vec<String>,

    /// Directory names that are never descended into.
    pub excluded_dirs: Vec<String>,

    /// Pause between worker cycles.
    pub sync_interval: Duration,

    /// Target chunk size in characters.
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,

    /// Dimension of the embedding vectors.
    pub embedding_dim: usize,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("./"),
            data_dir: None,
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            temp_markers: DEFAULT_TEMP_MARKERS
                .iter()
                .map(ToString::to_string)
                .collect(),
            ignore_patterns: Vec::new(),
            excluded_dirs: vec![".git".to_string()],
            sync_interval: Duration::from_secs(5),
            chunk_size: 1000,
            chunk_overlap: 200,
            embedding_dim: 384,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults for the given directory.
    #[must_use]
    pub fn new(watch_dir: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            ..Self::default()
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.sync_interval.is_zero() {
            return Err(Error::config("sync_interval cannot be 0"));
        }

        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size cannot be 0"));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }

        if self.embedding_dim == 0 {
            return Err(Error::config("embedding_dim cannot be 0"));
        }

        let extensions = self.normalized_extensions();
        if extensions.is_empty() {
            return Err(Error::config("at least one file extension is required"));
        }

        let loaders = LoaderRegistry::with_defaults();
        let unsupported: Vec<&str> = extensions
            .iter()
            .map(String::as_str)
            .filter(|ext| !loaders.supports(ext))
            .collect();
        if !unsupported.is_empty() {
            return Err(Error::config(format!(
                "no loader for extension(s) {}, supported: {}",
                unsupported.join(", "),
                loaders.extensions().join(", ")
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Extensions lowercased with any leading dot removed.
    #[must_use]
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect()
    }

    /// Directory holding the index database.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| self.watch_dir.join(DEFAULT_DATA_DIR_NAME))
    }

    /// Get the path to the `SQLite` database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("index.db")
    }

    /// Excluded directory names, including the data directory when it lives
    /// inside the watched root.
    #[must_use]
    pub fn all_excluded_dirs(&self) -> Vec<String> {
        let mut dirs = self.excluded_dirs.clone();
        let data_dir = self.data_dir();
        if data_dir.starts_with(&self.watch_dir) {
            if let Some(name) = data_dir.file_name().and_then(|n| n.to_str()) {
                if !dirs.iter().any(|d| d == name) {
                    dirs.push(name.to_string());
                }
            }
        }
        dirs
    }
}
