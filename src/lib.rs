#![deny(missing_docs)]

//! Core library for the docquery document ingestion and semantic query server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Format detection and plain-text extraction for uploads.
pub mod loader;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Document processing pipeline utilities.
pub mod processing;
/// Query attribute extraction and answer synthesis.
pub mod query;
/// Persistent vector store over document chunks.
pub mod store;
