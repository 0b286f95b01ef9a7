//! Document processing pipeline: cleanup, chunking, and orchestration.

pub mod chunking;
pub mod service;
pub mod types;

pub use service::{DocumentApi, DocumentService};
pub use types::{
    ChunkingError, Decision, HealthSnapshot, IngestOutcome, MatchHit, ProcessingError,
    QueryOutcome, QueryRequest,
};
