//! Markdown files.

use std::path::Path;

use serde_json::Value;

use super::{read_text, ContentUnit, Loader};
use crate::Result;

/// Metadata key holding the document title.
pub const TITLE_KEY: &str = "title";

/// Loads a markdown file as a single unit and records its title.
///
/// The title is the first level-one ATX heading, or the file stem when the
/// document has none.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownLoader;

fn title_of(text: &str, path: &Path) -> String {
    let mut in_fence = false;
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(title) = trimmed.strip_prefix("# ") {
            let title = title.trim().trim_end_matches('#').trim();
            if !title.is_empty() {
                return title.to_string();
            }
        }
    }

    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl Loader for MarkdownLoader {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn extensions(&self) -> &[&'static str] {
        &["md", "markdown"]
    }

    fn load(&self, path: &Path) -> Result<Vec<ContentUnit>> {
        let text = read_text(path)?;
        let title = title_of(&text, path);

        let mut unit = ContentUnit::from_source(path, text);
        unit.metadata.insert(TITLE_KEY.to_string(), Value::from(title));
        Ok(vec![unit])
    }
}
