//! `SQLite`-backed [`VectorIndex`].
//!
//! Embeddings are stored as blobs and similarity is computed in process by a
//! brute-force cosine scan, which is fine for a single directory of documents.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};

use super::connection::Database;
use super::index::VectorIndex;
use super::models::{ChunkHit, DocumentHit, DocumentMetadata, NewChunk};
use super::schema::{migrate, verify_schema};
use super::vector::{blob_to_vector, vector_to_blob};
use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::StorageError;
use crate::Result;

/// Vector index stored in a `SQLite` database.
pub struct SqliteIndex {
    db: Database,
    embedder: Arc<dyn Embedder>,
}

struct ChunkRow {
    id: String,
    document: String,
    text: String,
    embedding: Vec<u8>,
    metadata: String,
}

fn read_chunk_row(row: &Row<'_>) -> rusqlite::Result<ChunkRow> {
    Ok(ChunkRow {
        id: row.get(0)?,
        document: row.get(1)?,
        text: row.get(2)?,
        embedding: row.get(3)?,
        metadata: row.get(4)?,
    })
}

fn db_error(context: &'static str) -> impl Fn(rusqlite::Error) -> StorageError {
    move |e| StorageError::Database(format!("{context}: {e}"))
}

fn rank<T>(mut hits: Vec<T>, k: usize, score: impl Fn(&T) -> f32) -> Vec<T> {
    hits.sort_by(|a, b| score(b).partial_cmp(&score(a)).unwrap_or(Ordering::Equal));
    hits.truncate(k);
    hits
}

impl SqliteIndex {
    /// Wrap an open database, applying migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn new(db: Database, embedder: Arc<dyn Embedder>) -> Result<Self> {
        db.with_conn(|conn| {
            migrate(conn)?;
            verify_schema(conn)
        })?;

        tracing::info!(
            path = db.path(),
            dimension = embedder.dimension(),
            "Index storage ready"
        );

        Ok(Self { db, embedder })
    }

    /// Open or create the index database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Self::new(Database::open(path)?, embedder)
    }

    /// In-memory index, mainly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Result<Self> {
        Self::new(Database::open_in_memory()?, embedder)
    }

    /// Underlying database handle.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() == self.dimension() {
            Ok(())
        } else {
            Err(StorageError::Vector(format!(
                "expected {} dimensions, got {}",
                self.dimension(),
                embedding.len()
            ))
            .into())
        }
    }

    fn load_chunks(conn: &Connection, document: Option<&str>) -> Result<Vec<ChunkRow>> {
        let rows = if let Some(document) = document {
            let mut stmt = conn
                .prepare(
                    "SELECT id, document, text, embedding, metadata FROM chunks WHERE document = ?",
                )
                .map_err(db_error("failed to prepare chunk query"))?;
            let rows = stmt
                .query_map([document], read_chunk_row)
                .map_err(db_error("failed to query chunks"))?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        } else {
            let mut stmt = conn
                .prepare("SELECT id, document, text, embedding, metadata FROM chunks")
                .map_err(db_error("failed to prepare chunk query"))?;
            let rows = stmt
                .query_map([], read_chunk_row)
                .map_err(db_error("failed to query chunks"))?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        };
        Ok(rows.map_err(db_error("failed to read chunk row"))?)
    }
}

impl VectorIndex for SqliteIndex {
    fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    fn add_chunks(&self, chunks: &[NewChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut rows = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let document = chunk.document().ok_or_else(|| {
                StorageError::Metadata(format!("chunk '{}' has no document", chunk.id))
            })?;
            let metadata = serde_json::to_string(&chunk.metadata)
                .map_err(|e| StorageError::Metadata(e.to_string()))?;
            rows.push((chunk, document, metadata));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts);
        if embeddings.len() != chunks.len() {
            return Err(StorageError::Vector(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            ))
            .into());
        }

        self.db.with_transaction(|conn| {
            let mut stmt = conn
                .prepare(
                    "INSERT OR REPLACE INTO chunks (id, document, text, embedding, metadata)
                     VALUES (?, ?, ?, ?, ?)",
                )
                .map_err(db_error("failed to prepare chunk insert"))?;

            for ((chunk, document, metadata), embedding) in rows.iter().zip(&embeddings) {
                stmt.execute(params![
                    chunk.id,
                    document,
                    chunk.text,
                    vector_to_blob(embedding),
                    metadata
                ])
                .map_err(db_error("failed to insert chunk"))?;
            }
            Ok(())
        })?;

        tracing::trace!(count = chunks.len(), "Inserted chunks");
        Ok(())
    }

    fn get_chunk_embeddings(&self, ids: &[String]) -> Result<Vec<Vec<f32>>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT embedding FROM chunks WHERE id = ?")
                .map_err(db_error("failed to prepare embedding query"))?;

            let mut embeddings = Vec::with_capacity(ids.len());
            for id in ids {
                let blob: Vec<u8> = stmt
                    .query_row([id], |row| row.get(0))
                    .optional()
                    .map_err(db_error("failed to read embedding"))?
                    .ok_or_else(|| StorageError::Vector(format!("chunk '{id}' not found")))?;
                embeddings.push(blob_to_vector(&blob)?);
            }
            Ok(embeddings)
        })
    }

    fn delete_chunks_for_document(&self, document: &str) -> Result<usize> {
        self.db.with_conn(|conn| {
            let removed = conn
                .execute("DELETE FROM chunks WHERE document = ?", [document])
                .map_err(db_error("failed to delete chunks"))?;
            Ok(removed)
        })
    }

    fn add_document(
        &self,
        id: &str,
        embedding: &[f32],
        text: &str,
        metadata: DocumentMetadata,
    ) -> Result<()> {
        self.check_dimension(embedding)?;
        let json =
            serde_json::to_string(&metadata).map_err(|e| StorageError::Metadata(e.to_string()))?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO documents (id, embedding, text, metadata, last_modified)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    embedding = excluded.embedding,
                    text = excluded.text,
                    metadata = excluded.metadata,
                    last_modified = excluded.last_modified",
                params![
                    id,
                    vector_to_blob(embedding),
                    text,
                    json,
                    metadata.last_modified
                ],
            )
            .map_err(db_error("failed to upsert document"))?;
            Ok(())
        })
    }

    fn list_documents(&self) -> Result<Vec<(String, DocumentMetadata)>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, last_modified FROM documents ORDER BY id")
                .map_err(db_error("failed to prepare document listing"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        DocumentMetadata {
                            last_modified: row.get(1)?,
                        },
                    ))
                })
                .map_err(db_error("failed to list documents"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_error("failed to read document row"))?;
            Ok(rows)
        })
    }

    fn delete_document(&self, id: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            let removed = conn
                .execute("DELETE FROM documents WHERE id = ?", [id])
                .map_err(db_error("failed to delete document"))?;
            Ok(removed > 0)
        })
    }

    fn query_chunks(&self, text: &str, k: usize, document: Option<&str>) -> Result<Vec<ChunkHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = self.embedder.embed_one(text);
        let rows = self.db.with_conn(|conn| Self::load_chunks(conn, document))?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let embedding = blob_to_vector(&row.embedding)?;
            let metadata: Map<String, Value> = serde_json::from_str(&row.metadata)
                .map_err(|e| StorageError::Metadata(format!("chunk '{}': {e}", row.id)))?;
            hits.push(ChunkHit {
                score: cosine_similarity(&query, &embedding),
                id: row.id,
                document: row.document,
                text: row.text,
                metadata,
            });
        }

        Ok(rank(hits, k, |h| h.score))
    }

    fn query_documents(
        &self,
        text: &str,
        k: usize,
        under: Option<&str>,
    ) -> Result<Vec<DocumentHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = self.embedder.embed_one(text);
        let prefix = under.map(|dir| format!("{}/", dir.trim_end_matches('/')));

        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, text, embedding, last_modified FROM documents
                     WHERE ?1 IS NULL OR substr(id, 1, length(?1)) = ?1",
                )
                .map_err(db_error("failed to prepare document query"))?;
            let rows = stmt
                .query_map([&prefix], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, f64>(3)?,
                    ))
                })
                .map_err(db_error("failed to query documents"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_error("failed to read document row"))?;
            Ok(rows)
        })?;

        let mut hits = Vec::with_capacity(rows.len());
        for (id, text, blob, last_modified) in rows {
            let embedding = blob_to_vector(&blob)?;
            hits.push(DocumentHit {
                score: cosine_similarity(&query, &embedding),
                id,
                text,
                metadata: DocumentMetadata { last_modified },
            });
        }

        Ok(rank(hits, k, |h| h.score))
    }

    fn count_chunks(&self) -> Result<usize> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                .map_err(db_error("failed to count chunks"))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }

    fn chunk_documents(&self) -> Result<BTreeSet<String>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT DISTINCT document FROM chunks")
                .map_err(db_error("failed to prepare chunk document query"))?;
            let documents = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(db_error("failed to query chunk documents"))?
                .collect::<rusqlite::Result<BTreeSet<_>>>()
                .map_err(db_error("failed to read chunk document"))?;
            Ok(documents)
        })
    }
}

impl SqliteIndex {
    /// Number of chunks per document, for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn chunk_counts(&self) -> Result<HashMap<String, usize>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT document, COUNT(*) FROM chunks GROUP BY document")
                .map_err(db_error("failed to prepare chunk count query"))?;
            let counts = stmt
                .query_map([], |row| {
                    let count: i64 = row.get(1)?;
                    Ok((row.get::<_, String>(0)?, usize::try_from(count).unwrap_or(0)))
                })
                .map_err(db_error("failed to count chunks"))?
                .collect::<rusqlite::Result<HashMap<_, _>>>()
                .map_err(db_error("failed to read chunk count"))?;
            Ok(counts)
        })
    }
}

impl std::fmt::Debug for SqliteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndex")
            .field("db", &self.db)
            .field("dimension", &self.dimension())
            .finish_non_exhaustive()
    }
}
