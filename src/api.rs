//! HTTP surface for the document query server.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /documents/upload` – Accept a multipart file upload, extract its
//!   text, chunk and embed it, and persist it in the document store. Returns
//!   the assigned document id and ingestion counters.
//! - `POST /query` – Answer a natural-language question against the indexed
//!   corpus: attribute extraction, similarity search, decision, and answer
//!   synthesis in one call.
//! - `GET /health` – Liveness probe with current corpus counts.
//! - `GET /metrics` – Observe ingestion and query counters.
//! - `GET /commands` (also served at `/`) – Machine-readable command catalog
//!   for quick discovery by tools/hosts.

use crate::processing::{DocumentApi, ProcessingError, QueryRequest};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Maximum accepted upload size. PDFs scan-heavy policy documents routinely
/// reach tens of megabytes.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Build the HTTP router exposing the document API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: DocumentApi + 'static,
{
    Router::new()
        .route(
            "/documents/upload",
            post(upload_document::<S>).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/query", post(run_query::<S>))
        .route("/health", get(get_health::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .route("/", get(get_commands))
        .with_state(service)
}

/// Success response for the `POST /documents/upload` endpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    /// Identifier assigned to the stored document.
    document_id: String,
    /// Fixed success marker.
    status: &'static str,
    /// Number of chunks indexed for the document.
    chunks_processed: usize,
    /// Duplicate chunks skipped within this upload.
    skipped_duplicates: usize,
    /// Format-specific metadata captured during extraction.
    metadata: serde_json::Map<String, serde_json::Value>,
}

/// Ingest an uploaded file into the document store.
///
/// Expects a multipart form with a single `file` field carrying the document
/// bytes; the filename extension selects the loader.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: DocumentApi,
{
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::BadRequest(format!("Malformed multipart body: {error}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("Upload is missing a filename".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|error| AppError::BadRequest(format!("Failed to read upload: {error}")))?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, bytes) =
        upload.ok_or_else(|| AppError::BadRequest("Missing 'file' field in upload".to_string()))?;
    let outcome = service.ingest_document(&filename, bytes).await?;
    tracing::info!(
        document_id = %outcome.document_id,
        chunks = outcome.chunk_count,
        skipped_duplicates = outcome.skipped_duplicates,
        "Upload request completed"
    );
    Ok(Json(UploadResponse {
        document_id: outcome.document_id,
        status: "success",
        chunks_processed: outcome.chunk_count,
        skipped_duplicates: outcome.skipped_duplicates,
        metadata: outcome.metadata,
    }))
}

/// Request body for the `POST /query` endpoint.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody {
    /// Natural-language question to answer.
    query: String,
    /// Optional override for the number of chunks to retrieve.
    #[serde(default)]
    top_k: Option<usize>,
    /// Optional override for the minimum similarity score.
    #[serde(default)]
    score_threshold: Option<f32>,
}

/// Answer a query against the indexed corpus.
async fn run_query<S>(
    State(service): State<Arc<S>>,
    Json(body): Json<QueryBody>,
) -> Result<Response, AppError>
where
    S: DocumentApi,
{
    let outcome = service
        .answer_query(QueryRequest {
            query: body.query,
            top_k: body.top_k,
            score_threshold: body.score_threshold,
        })
        .await?;
    Ok(Json(outcome).into_response())
}

/// Liveness probe with current corpus counts.
async fn get_health<S>(State(service): State<Arc<S>>) -> Response
where
    S: DocumentApi,
{
    Json(service.health().await).into_response()
}

/// Return a concise metrics snapshot with ingestion and query counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Response
where
    S: DocumentApi,
{
    Json(service.metrics_snapshot()).into_response()
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload_document",
                method: "POST",
                path: "/documents/upload",
                description: "Upload a PDF, DOCX, EML, or TXT file as a multipart 'file' field. The document is extracted, chunked, embedded, and indexed; the response carries the assigned document id and chunk counters.",
                request_example: None,
            },
            CommandDescriptor {
                name: "query",
                method: "POST",
                path: "/query",
                description: "Answer a natural-language question against the indexed corpus. Returns the answer, extracted query attributes, matching chunks, and a coverage decision.",
                request_example: Some(json!({
                    "query": "46-year-old male, knee surgery in Pune, 3-month-old insurance policy",
                    "topK": 3,
                    "scoreThreshold": 0.5
                })),
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Liveness probe reporting current document and chunk counts.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and query counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    BadRequest(String),
    Processing(ProcessingError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Processing(error) => {
                let status = if error.is_client_error() {
                    StatusCode::BAD_REQUEST
                } else if matches!(error, ProcessingError::Llm(_)) {
                    StatusCode::BAD_GATEWAY
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, error.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self::Processing(inner)
    }
}
