//! Record types, snapshot schema, and errors for the document store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Current version of the on-disk snapshot schema.
pub(crate) const SNAPSHOT_VERSION: u32 = 1;

/// Errors emitted by document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem interaction failed while persisting or loading.
    #[error("Store I/O failure: {0}")]
    Io(#[from] std::io::Error),
    /// Snapshot could not be encoded or decoded.
    #[error("Store serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A vector of the wrong dimensionality was supplied or requested.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality the store was created with.
        expected: usize,
        /// Dimensionality of the offending vector.
        actual: usize,
    },
    /// A chunk referenced a document other than the one being added.
    #[error("Chunk {chunk_id} does not belong to document {document_id}")]
    ForeignChunk {
        /// Identifier of the offending chunk.
        chunk_id: String,
        /// Identifier of the document being added.
        document_id: String,
    },
    /// A persisted chunk referenced a document missing from the registry.
    #[error("Chunk {chunk_id} references missing document {document_id}")]
    OrphanChunk {
        /// Identifier of the orphaned chunk.
        chunk_id: String,
        /// Document id the chunk references.
        document_id: String,
    },
}

/// An ingested document registered with the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Unique document identifier assigned at ingestion.
    pub id: String,
    /// Original filename supplied by the uploader.
    pub filename: String,
    /// Detected document format (`pdf`, `docx`, `email`, `text`).
    pub format: String,
    /// RFC 3339 upload timestamp.
    pub uploaded_at: String,
    /// Number of chunks produced for this document.
    pub chunk_count: usize,
    /// Format-specific metadata captured by the loader.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A chunk of document text together with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique chunk identifier.
    pub id: String,
    /// Identifier of the parent document.
    pub document_id: String,
    /// Zero-based position of the chunk within its document.
    pub ordinal: usize,
    /// Chunk text content.
    pub text: String,
    /// Stable content digest used for within-document dedupe.
    pub chunk_hash: String,
    /// Byte offset of the chunk start within the cleaned document text.
    pub start: usize,
    /// Byte offset of the chunk end within the cleaned document text.
    pub end: usize,
    /// Embedding vector for the chunk text.
    pub embedding: Vec<f32>,
}

/// A chunk returned from a similarity search, with its score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Identifier of the matching chunk.
    pub id: String,
    /// Identifier of the chunk's parent document.
    pub document_id: String,
    /// Position of the chunk within its document.
    pub ordinal: usize,
    /// Chunk text content.
    pub text: String,
    /// Cosine similarity to the query vector, in `[-1, 1]`.
    pub score: f32,
}

/// Serialized form of the chunk index (`index.json`).
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct IndexSnapshot {
    /// Schema version for forward compatibility.
    pub version: u32,
    /// Dimensionality of every stored vector.
    pub dimension: usize,
    /// Flat chunk records in insertion order.
    pub records: Vec<ChunkRecord>,
}

/// Compute the stable content digest for a chunk of text.
pub fn compute_chunk_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_hash_is_stable_and_content_sensitive() {
        assert_eq!(compute_chunk_hash("alpha"), compute_chunk_hash("alpha"));
        assert_ne!(compute_chunk_hash("alpha"), compute_chunk_hash("beta"));
        assert_eq!(compute_chunk_hash("alpha").len(), 64);
    }
}
