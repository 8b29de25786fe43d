//! Extension to loader mapping.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::{ContentUnit, Loader, MarkdownLoader, PdfLoader, PlainTextLoader};
use crate::error::LoaderError;
use crate::Result;

/// Registry of loaders keyed by lowercase extension.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: HashMap<String, Arc<dyn Loader>>,
}

impl LoaderRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the text, markdown and PDF loaders.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PlainTextLoader);
        registry.register(MarkdownLoader);
        registry.register(PdfLoader);
        registry
    }

    /// Register `loader` for each of its extensions, replacing earlier entries.
    pub fn register<L: Loader + 'static>(&mut self, loader: L) {
        let loader: Arc<dyn Loader> = Arc::new(loader);
        for ext in loader.extensions() {
            self.loaders.insert(ext.to_lowercase(), Arc::clone(&loader));
        }
    }

    /// Whether a loader exists for `extension` (case-insensitive).
    #[must_use]
    pub fn supports(&self, extension: &str) -> bool {
        self.loaders.contains_key(&extension.to_lowercase())
    }

    /// All registered extensions, sorted.
    #[must_use]
    pub fn extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.loaders.keys().cloned().collect();
        exts.sort();
        exts
    }

    /// Loader for `extension` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::UnsupportedFileType` if none is registered.
    pub fn loader_for(&self, extension: &str, path: &Path) -> Result<Arc<dyn Loader>> {
        self.loaders
            .get(&extension.to_lowercase())
            .cloned()
            .ok_or_else(|| {
                LoaderError::UnsupportedFileType {
                    extension: extension.to_string(),
                    path: path.display().to_string(),
                }
                .into()
            })
    }

    /// Pick a loader from the path's extension and load the file.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedFileType` for unknown extensions, or the loader's
    /// error.
    pub fn load(&self, path: &Path) -> Result<Vec<ContentUnit>> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let loader = self.loader_for(extension, path)?;
        tracing::trace!(path = %path.display(), loader = loader.name(), "Loading file");
        loader.load(path)
    }
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("extensions", &self.extensions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_cover_documents() {
        let registry = LoaderRegistry::with_defaults();
        assert_eq!(registry.extensions(), vec!["markdown", "md", "pdf", "txt"]);
        assert!(registry.supports("PDF"));
        assert!(!registry.supports("png"));
    }

    #[test]
    fn test_loader_for_is_case_insensitive() {
        let registry = LoaderRegistry::with_defaults();
        let loader = registry.loader_for("MD", Path::new("a.MD")).unwrap();
        assert_eq!(loader.name(), "markdown");
    }

    #[test]
    fn test_unknown_extension_is_unsupported() {
        let registry = LoaderRegistry::with_defaults();
        let err = registry
            .loader_for("docx", Path::new("report.docx"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), "unsupported_file_type");

        let err = registry.load(Path::new("no_extension")).unwrap_err();
        assert_eq!(err.kind(), "unsupported_file_type");
    }

    #[test]
    fn test_load_dispatches_by_extension() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("readme.MD");
        std::fs::write(&path, "# Readme\nbody").unwrap();

        let units = LoaderRegistry::with_defaults().load(&path).unwrap();
        assert_eq!(units[0].metadata["title"].as_str(), Some("Readme"));
    }
}
