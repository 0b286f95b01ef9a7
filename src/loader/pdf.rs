//! PDF text extraction.

use super::{LoadedDocument, LoaderError};
use serde_json::Map;

/// Extract text from PDF bytes on the blocking pool.
///
/// `pdf-extract` walks every page synchronously, so the work is moved off the
/// async runtime.
pub(super) async fn extract(bytes: Vec<u8>) -> Result<LoadedDocument, LoaderError> {
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|err| LoaderError::Parse {
            format: "pdf",
            message: format!("extraction task failed: {err}"),
        })?
        .map_err(|err| LoaderError::Parse {
            format: "pdf",
            message: err.to_string(),
        })?;

    Ok(LoadedDocument {
        text,
        metadata: Map::new(),
    })
}
