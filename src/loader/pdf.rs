//! PDF files, one content unit per page.

use std::path::Path;

use lopdf::Document;
use serde_json::Value;

use super::{ContentUnit, Loader};
use crate::error::LoaderError;
use crate::Result;

/// Metadata key holding the 0-based page number.
pub const PAGE_KEY: &str = "page";

/// Metadata key holding the page count of the document.
pub const TOTAL_PAGES_KEY: &str = "total_pages";

/// Loads a PDF with `lopdf`, producing one unit per page.
///
/// A page whose text cannot be extracted becomes an empty unit; a document
/// that cannot be parsed fails the whole load.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfLoader;

impl Loader for PdfLoader {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    fn load(&self, path: &Path) -> Result<Vec<ContentUnit>> {
        let bytes = std::fs::read(path).map_err(|e| LoaderError::failed(path, e))?;
        let doc = Document::load_mem(&bytes).map_err(|e| LoaderError::failed(path, e))?;

        let pages = doc.get_pages();
        let total_pages = pages.len();
        let mut units = Vec::with_capacity(total_pages);

        for (index, page_number) in pages.keys().enumerate() {
            let text = match doc.extract_text(&[*page_number]) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        page = index,
                        error = %e,
                        "Failed to extract PDF page text"
                    );
                    String::new()
                }
            };

            let mut unit = ContentUnit::from_source(path, text);
            unit.metadata.insert(PAGE_KEY.to_string(), Value::from(index));
            unit.metadata.insert(TOTAL_PAGES_KEY.to_string(), Value::from(total_pages));
            units.push(unit);
        }

        tracing::debug!(path = %path.display(), pages = total_pages, "Loaded PDF");
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use tempfile::TempDir;

    fn write_pdf(path: &Path, pages: &[&str]) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = i64::try_from(kids.len()).unwrap();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn test_one_unit_per_page() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.pdf");
        write_pdf(&path, &["first page", "second page"]);

        let units = PdfLoader.load(&path).unwrap();
        assert_eq!(units.len(), 2);
        for (i, unit) in units.iter().enumerate() {
            assert_eq!(unit.metadata[PAGE_KEY].as_u64(), Some(i as u64));
            assert_eq!(unit.metadata[TOTAL_PAGES_KEY].as_u64(), Some(2));
        }
    }

    #[test]
    fn test_invalid_pdf_is_loader_failure() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let err = PdfLoader.load(&path).unwrap_err();
        assert_eq!(err.kind(), "loader_failure");
    }
}
