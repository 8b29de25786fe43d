//! The contract between the synchronizer and the vector index.

use std::collections::BTreeSet;

use super::models::{ChunkHit, DocumentHit, DocumentMetadata, NewChunk};
use crate::Result;

/// A vector index holding chunk records and one record per document.
///
/// Every call is atomic on its own; there are no cross-call transactions.
/// Deleting something that does not exist succeeds. Any error returned
/// means the index is unavailable.
pub trait VectorIndex: Send + Sync {
    /// Length of every stored embedding.
    fn dimension(&self) -> usize;

    /// Insert chunks in one batch, embedding their text.
    ///
    /// # Errors
    ///
    /// Fails if a chunk lacks `document` metadata or the write fails.
    fn add_chunks(&self, chunks: &[NewChunk]) -> Result<()>;

    /// Embeddings of the given chunks, in the order of `ids`.
    ///
    /// # Errors
    ///
    /// Fails if any id is unknown.
    fn get_chunk_embeddings(&self, ids: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Remove every chunk whose `document` metadata equals `document`.
    /// Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Fails if the delete fails.
    fn delete_chunks_for_document(&self, document: &str) -> Result<usize>;

    /// Insert or replace the document record `id`.
    ///
    /// # Errors
    ///
    /// Fails on a dimension mismatch or a failed write.
    fn add_document(
        &self,
        id: &str,
        embedding: &[f32],
        text: &str,
        metadata: DocumentMetadata,
    ) -> Result<()>;

    /// All document ids with their metadata, sorted by id.
    ///
    /// # Errors
    ///
    /// Fails if the read fails.
    fn list_documents(&self) -> Result<Vec<(String, DocumentMetadata)>>;

    /// Remove the document record `id`. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Fails if the delete fails.
    fn delete_document(&self, id: &str) -> Result<bool>;

    /// The `k` chunks most similar to `text`, optionally within one document.
    ///
    /// # Errors
    ///
    /// Fails if the read fails.
    fn query_chunks(&self, text: &str, k: usize, document: Option<&str>) -> Result<Vec<ChunkHit>>;

    /// The `k` documents most similar to `text`, optionally only those below
    /// directory `under` (a relative key prefix such as `notes/2024`).
    ///
    /// # Errors
    ///
    /// Fails if the read fails.
    fn query_documents(
        &self,
        text: &str,
        k: usize,
        under: Option<&str>,
    ) -> Result<Vec<DocumentHit>>;

    /// Total number of chunk records.
    ///
    /// # Errors
    ///
    /// Fails if the read fails.
    fn count_chunks(&self) -> Result<usize>;

    /// Distinct `document` values referenced by chunk records.
    ///
    /// # Errors
    ///
    /// Fails if the read fails.
    fn chunk_documents(&self) -> Result<BTreeSet<String>>;
}
