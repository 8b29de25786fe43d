//! Persistent vector index.
//!
//! This module provides:
//! - The [`VectorIndex`] contract used by the synchronizer
//! - A `SQLite` implementation storing document and chunk records
//! - Schema migrations and blob encoding for embeddings

mod connection;
mod index;
mod models;
mod schema;
mod sqlite;
mod vector;

pub use connection::Database;
pub use index::VectorIndex;
pub use models::{
    ChunkHit, DocumentHit, DocumentMetadata, NewChunk, DOCUMENT_KEY, LAST_MODIFIED_KEY,
};
pub use schema::{migrate, verify_schema, SCHEMA_VERSION};
pub use sqlite::SqliteIndex;
pub use vector::{blob_to_vector, vector_to_blob};
