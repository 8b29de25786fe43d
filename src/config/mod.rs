//! Configuration management for docsync.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables (`DOCSYNC_*`)
//! - Built-in defaults (lowest priority)

mod settings;

pub use settings::{Config, DEFAULT_DATA_DIR_NAME, DEFAULT_EXTENSIONS, DEFAULT_TEMP_MARKERS};
