//! Records stored in and returned by the index.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key linking a chunk to its document.
pub const DOCUMENT_KEY: &str = "document";

/// Metadata key holding the index write time.
pub const LAST_MODIFIED_KEY: &str = "last_modified";

/// A chunk to insert. The index computes its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    /// Unique id, unrelated to the file path.
    pub id: String,
    /// Text span.
    pub text: String,
    /// Must contain a string `document` entry.
    pub metadata: Map<String, Value>,
}

impl NewChunk {
    /// Relative path of the owning document, if present.
    #[must_use]
    pub fn document(&self) -> Option<&str> {
        self.metadata.get(DOCUMENT_KEY).and_then(Value::as_str)
    }
}

/// Per-document state recorded in the index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Seconds since the Unix epoch at which the document was written.
    pub last_modified: f64,
}

impl DocumentMetadata {
    /// Metadata stamped with the current time.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self {
            last_modified: now.timestamp_micros() as f64 / 1_000_000.0,
        }
    }
}

/// A ranked chunk returned by a query.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkHit {
    pub id: String,
    pub document: String,
    pub text: String,
    pub metadata: Map<String, Value>,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// A ranked document returned by a query.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentHit {
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
    pub score: f32,
}
