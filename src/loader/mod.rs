//! Format detection and plain-text extraction for uploaded documents.
//!
//! Loaders are pure conversions: raw bytes plus a declared format in, extracted
//! text and whatever metadata the format exposes out. Nothing is retained
//! between calls and malformed input is reported immediately, without retries.

mod docx;
mod email;
mod pdf;

use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

/// Errors raised while converting an uploaded file into plain text.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The file extension does not correspond to a supported format.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    /// The file claimed a supported format but could not be parsed.
    #[error("Failed to parse {format} document: {message}")]
    Parse {
        /// Format that was being parsed.
        format: &'static str,
        /// Underlying parser diagnostic.
        message: String,
    },
}

/// Document formats accepted by the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Portable Document Format (`.pdf`).
    Pdf,
    /// Office Open XML word-processing document (`.docx`).
    Docx,
    /// RFC 2822 email message (`.eml`).
    Email,
    /// Plain UTF-8 text (`.txt`).
    Text,
}

impl DocumentFormat {
    /// Determine the format from a filename extension.
    pub fn from_filename(filename: &str) -> Result<Self, LoaderError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "eml" => Ok(Self::Email),
            "txt" => Ok(Self::Text),
            other => Err(LoaderError::UnsupportedFormat(format!(".{other}"))),
        }
    }

    /// Stable lowercase name used in responses and persisted metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Email => "email",
            Self::Text => "text",
        }
    }
}

/// Extracted text plus format-specific metadata for an uploaded document.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Plain text recovered from the file.
    pub text: String,
    /// Format-specific metadata (email headers, document properties).
    pub metadata: Map<String, Value>,
}

/// Convert raw file bytes of the given format into plain text.
///
/// PDF extraction is CPU-bound and runs on the blocking pool; the remaining
/// formats decode inline.
pub async fn extract_text(
    format: DocumentFormat,
    bytes: Vec<u8>,
) -> Result<LoadedDocument, LoaderError> {
    match format {
        DocumentFormat::Pdf => pdf::extract(bytes).await,
        DocumentFormat::Docx => docx::extract(&bytes),
        DocumentFormat::Email => email::extract(&bytes),
        DocumentFormat::Text => Ok(LoadedDocument {
            text: String::from_utf8_lossy(&bytes).into_owned(),
            metadata: Map::new(),
        }),
    }
}
