//! Core data types and error definitions for the processing pipeline.

use crate::embedding::EmbeddingError;
use crate::loader::LoaderError;
use crate::query::QueryInfo;
use crate::query::synthesis::LlmError;
use crate::store::StoreError;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible window size.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Errors emitted by the document processing pipeline.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Uploaded file could not be converted to text.
    #[error("Failed to load document: {0}")]
    Loader(#[from] LoaderError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Document store interaction failed.
    #[error("Document store failure: {0}")]
    Store(#[from] StoreError),
    /// Answer synthesis failed after bounded retries.
    #[error("Answer synthesis failed: {0}")]
    Llm(#[from] LlmError),
    /// Query text was empty after trimming.
    #[error("Query must not be empty")]
    EmptyQuery,
}

impl ProcessingError {
    /// Whether the error was caused by the caller's input rather than a
    /// downstream failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Loader(_) | Self::EmptyQuery)
    }
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Identifier assigned to the stored document.
    pub document_id: String,
    /// Number of chunks indexed for the document.
    pub chunk_count: usize,
    /// Chunk window size used during processing.
    pub chunk_size: usize,
    /// Chunks skipped within the request due to duplicate content.
    pub skipped_duplicates: usize,
    /// Format-specific metadata captured by the loader.
    pub metadata: Map<String, Value>,
}

/// Parameters supplied to the query pipeline.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Natural-language query text.
    pub query: String,
    /// Optional override for the number of chunks to retrieve.
    pub top_k: Option<usize>,
    /// Optional override for the minimum similarity score.
    pub score_threshold: Option<f32>,
}

/// A retrieved chunk surfaced to API consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchHit {
    /// Identifier of the matching chunk.
    pub chunk_id: String,
    /// Identifier of the chunk's parent document.
    pub document_id: String,
    /// Original filename of the parent document, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Position of the chunk within its document.
    pub ordinal: usize,
    /// Chunk text content.
    pub text: String,
    /// Similarity score, highest first in a result list.
    pub score: f32,
}

/// Coverage decision derived from the query attributes and retrieval results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Whether matching policy material was found.
    pub approved: bool,
    /// Human-readable grounds for the decision.
    pub reason: String,
    /// Attribute-specific detail entries.
    pub details: Map<String, Value>,
}

/// Full result of a processed query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    /// Synthesized or extractive answer text.
    pub answer: String,
    /// Structured attributes extracted from the query.
    pub query_info: QueryInfo,
    /// Retrieved chunks ordered by similarity.
    pub matches: Vec<MatchHit>,
    /// Coverage decision for the query.
    pub decision: Decision,
    /// Mean similarity score of the retrieved chunks, zero when none matched.
    pub confidence: f32,
    /// Human-readable justification lines for the decision.
    pub justification: Vec<String>,
}

/// Liveness snapshot reported by the health endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    /// Fixed status marker.
    pub status: &'static str,
    /// Number of documents currently in the store.
    pub documents: usize,
    /// Number of chunks currently in the store.
    pub chunks: usize,
}
