//! Plain text files.

use std::path::Path;

use super::{read_text, ContentUnit, Loader};
use crate::Result;

/// Loads a text file as a single unit.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextLoader;

impl Loader for PlainTextLoader {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extensions(&self) -> &[&'static str] {
        &["txt"]
    }

    fn load(&self, path: &Path) -> Result<Vec<ContentUnit>> {
        let text = read_text(path)?;
        Ok(vec![ContentUnit::from_source(path, text)])
    }
}
