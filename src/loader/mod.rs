//! Content loaders selected by file extension.
//!
//! A loader turns a file into an ordered list of [`ContentUnit`]s (one for a
//! text file, one per page for a PDF). The [`LoaderRegistry`] maps extensions
//! to loaders; adding a format means registering another [`Loader`].

mod markdown;
mod pdf;
mod registry;
mod text;

use std::path::Path;

use serde_json::{Map, Value};

use crate::Result;

pub use markdown::{MarkdownLoader, TITLE_KEY};
pub use pdf::{PdfLoader, PAGE_KEY, TOTAL_PAGES_KEY};
pub use registry::LoaderRegistry;
pub use text::PlainTextLoader;

/// Metadata key naming the source file.
pub const SOURCE_KEY: &str = "source";

/// One piece of loaded content with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentUnit {
    pub text: String,
    pub metadata: Map<String, Value>,
}

impl ContentUnit {
    /// A unit whose metadata only records the source path.
    #[must_use]
    pub fn from_source(path: &Path, text: String) -> Self {
        let mut metadata = Map::new();
        metadata.insert(
            SOURCE_KEY.to_string(),
            Value::from(path.display().to_string()),
        );
        Self { text, metadata }
    }
}

/// Extracts content from one file format.
///
/// Loading is blocking; async callers should use `spawn_blocking`.
pub trait Loader: Send + Sync {
    /// Loader name for logs.
    fn name(&self) -> &'static str;

    /// Lowercase extensions handled, without the dot.
    fn extensions(&self) -> &[&'static str];

    /// Read `path` into content units.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::Failed` if the file cannot be read or parsed.
    fn load(&self, path: &Path) -> Result<Vec<ContentUnit>>;
}

/// Read a file as UTF-8, replacing invalid sequences.
fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| crate::error::LoaderError::failed(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
