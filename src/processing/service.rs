//! Pipeline orchestration: ingestion and query answering.

use super::chunking::{self, ChunkSpan};
use super::types::{
    Decision, HealthSnapshot, IngestOutcome, MatchHit, ProcessingError, QueryOutcome, QueryRequest,
};
use crate::config::get_config;
use crate::embedding::{EmbeddingClient, EmbeddingError, get_embedding_client};
use crate::loader::{self, DocumentFormat};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::query::synthesis::{AnswerClient, compose_extractive_answer, get_answer_client};
use crate::query::{QueryInfo, extract_query_info};
use crate::store::{ChunkRecord, DocumentStore, StoredDocument, compute_chunk_hash};
use async_trait::async_trait;
use serde_json::{Map, json};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Operations exposed by the document pipeline to transport layers.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Ingest an uploaded file end to end: extract, clean, chunk, embed, index.
    async fn ingest_document(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, ProcessingError>;

    /// Answer a natural-language query against the indexed corpus.
    async fn answer_query(&self, request: QueryRequest) -> Result<QueryOutcome, ProcessingError>;

    /// Report liveness together with current corpus counts.
    async fn health(&self) -> HealthSnapshot;

    /// Return a snapshot of the pipeline activity counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Production pipeline wiring the loader, embedder, store, and synthesizer.
pub struct DocumentService {
    embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
    answer_client: Option<Box<dyn AnswerClient + Send + Sync>>,
    store: RwLock<DocumentStore>,
    store_dir: PathBuf,
    metrics: Arc<PipelineMetrics>,
}

impl DocumentService {
    /// Construct the service from global configuration, restoring any
    /// persisted store snapshot.
    pub fn new() -> Self {
        let config = get_config();
        let store_dir = PathBuf::from(&config.store_dir);
        let store = DocumentStore::load(&store_dir, config.embedding_dimension);
        Self {
            embedding_client: get_embedding_client(),
            answer_client: get_answer_client(),
            store: RwLock::new(store),
            store_dir,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Flush the store to disk. Called on graceful shutdown.
    pub async fn flush(&self) -> Result<(), ProcessingError> {
        let store = self.store.read().await;
        store.persist(&self.store_dir)?;
        Ok(())
    }
}

impl Default for DocumentService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn ingest_document(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, ProcessingError> {
        let config = get_config();
        let format = DocumentFormat::from_filename(filename)?;
        tracing::info!(filename, format = format.as_str(), size = bytes.len(), "Ingesting document");

        let loaded = loader::extract_text(format, bytes).await?;
        let cleaned = chunking::clean_text(&loaded.text);
        let spans = chunking::chunk_text(&cleaned, config.chunk_size, config.chunk_overlap)?;
        let (spans, skipped_duplicates) = dedupe_spans(spans);

        let document_id = Uuid::new_v4().to_string();
        let mut records = Vec::with_capacity(spans.len());
        if !spans.is_empty() {
            let texts: Vec<String> = spans.iter().map(|(span, _)| span.text.clone()).collect();
            let embeddings = self.embedding_client.generate_embeddings(texts).await?;
            if embeddings.len() != spans.len() {
                return Err(ProcessingError::Embedding(EmbeddingError::GenerationFailed(
                    format!(
                        "provider returned {} vectors for {} chunks",
                        embeddings.len(),
                        spans.len()
                    ),
                )));
            }
            for ((span, chunk_hash), embedding) in spans.into_iter().zip(embeddings) {
                records.push(ChunkRecord {
                    id: Uuid::new_v4().to_string(),
                    document_id: document_id.clone(),
                    ordinal: span.ordinal,
                    text: span.text,
                    chunk_hash,
                    start: span.start,
                    end: span.end,
                    embedding,
                });
            }
        }

        let chunk_count = records.len();
        let document = StoredDocument {
            id: document_id.clone(),
            filename: filename.to_string(),
            format: format.as_str().to_string(),
            uploaded_at: current_timestamp_rfc3339(),
            chunk_count,
            metadata: loaded.metadata.clone(),
        };

        {
            // Hold the write lock across index update and persist so readers
            // never observe a store that is ahead of the snapshot write.
            let mut store = self.store.write().await;
            store.add_document(document, records)?;
            store.persist(&self.store_dir)?;
        }

        self.metrics
            .record_document(chunk_count as u64, config.chunk_size as u64);
        tracing::info!(document_id = %document_id, chunk_count, skipped_duplicates, "Document indexed");

        Ok(IngestOutcome {
            document_id,
            chunk_count,
            chunk_size: config.chunk_size,
            skipped_duplicates,
            metadata: loaded.metadata,
        })
    }

    async fn answer_query(&self, request: QueryRequest) -> Result<QueryOutcome, ProcessingError> {
        let config = get_config();
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(ProcessingError::EmptyQuery);
        }

        let query_info = extract_query_info(&query);
        tracing::debug!(query = %query, info = ?query_info, "Processing query");

        let mut vectors = self
            .embedding_client
            .generate_embeddings(vec![query.clone()])
            .await?;
        let vector = vectors.pop().ok_or_else(|| {
            ProcessingError::Embedding(EmbeddingError::GenerationFailed(
                "provider returned no vectors for the query".to_string(),
            ))
        })?;
        if vector.len() != config.embedding_dimension {
            return Err(ProcessingError::Embedding(
                EmbeddingError::DimensionMismatch {
                    expected: config.embedding_dimension,
                    actual: vector.len(),
                },
            ));
        }

        let limit = request
            .top_k
            .unwrap_or(config.search_default_limit)
            .clamp(1, config.search_max_limit);
        let threshold = request
            .score_threshold
            .unwrap_or(config.search_default_score_threshold)
            .clamp(0.0, 1.0);

        let (hits, matches) = {
            let store = self.store.read().await;
            let hits = store.search(&vector, limit, threshold)?;
            let matches = hits
                .iter()
                .map(|hit| MatchHit {
                    chunk_id: hit.id.clone(),
                    document_id: hit.document_id.clone(),
                    source: store
                        .document(&hit.document_id)
                        .map(|doc| doc.filename.clone()),
                    ordinal: hit.ordinal,
                    text: hit.text.clone(),
                    score: hit.score,
                })
                .collect::<Vec<_>>();
            (hits, matches)
        };

        let confidence = if matches.is_empty() {
            0.0
        } else {
            matches.iter().map(|hit| hit.score).sum::<f32>() / matches.len() as f32
        };
        let decision = build_decision(&query_info, !matches.is_empty());
        let justification = build_justification(&query_info, &matches);

        let answer = match (&self.answer_client, hits.first()) {
            (Some(client), Some(_)) => {
                let passages: Vec<String> = hits.iter().map(|hit| hit.text.clone()).collect();
                client.synthesize_answer(&query, &passages).await?
            }
            _ => compose_extractive_answer(&justification, &hits),
        };

        self.metrics.record_query();
        tracing::info!(
            matches = matches.len(),
            confidence,
            approved = decision.approved,
            "Query answered"
        );

        Ok(QueryOutcome {
            answer,
            query_info,
            matches,
            decision,
            confidence,
            justification,
        })
    }

    async fn health(&self) -> HealthSnapshot {
        let store = self.store.read().await;
        HealthSnapshot {
            status: "healthy",
            documents: store.document_count(),
            chunks: store.chunk_count(),
        }
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Drop spans whose content digest repeats within the document, keeping the
/// first occurrence. Returns the survivors paired with their digests.
fn dedupe_spans(spans: Vec<ChunkSpan>) -> (Vec<(ChunkSpan, String)>, usize) {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(spans.len());
    let mut skipped = 0usize;

    for span in spans {
        let hash = compute_chunk_hash(&span.text);
        if seen.insert(hash.clone()) {
            kept.push((span, hash));
        } else {
            skipped += 1;
        }
    }

    (kept, skipped)
}

fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().to_string())
}

fn build_decision(info: &QueryInfo, found_matches: bool) -> Decision {
    let mut details = Map::new();
    if let Some(procedure) = &info.procedure {
        details.insert(
            "procedure".to_string(),
            json!({ "name": procedure, "covered": found_matches }),
        );
    }
    if let Some(months) = info.policy_duration_months {
        details.insert(
            "policyDuration".to_string(),
            json!({ "months": months, "meetsRequirements": found_matches }),
        );
    }

    let reason = if found_matches {
        "Relevant policy information was found for this query".to_string()
    } else {
        "No relevant policy information was found for this query".to_string()
    };

    Decision {
        approved: found_matches,
        reason,
        details,
    }
}

fn build_justification(info: &QueryInfo, matches: &[MatchHit]) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(procedure) = &info.procedure {
        lines.push(format!("Query is about: {procedure}"));
    }
    if let Some(age) = info.age {
        let gender = info.gender.as_deref().unwrap_or("patient");
        lines.push(format!("Patient: {age} year old {gender}"));
    }
    if let Some(location) = &info.location {
        lines.push(format!("Location: {location}"));
    }
    if let Some(months) = info.policy_duration_months {
        lines.push(format!("Policy duration: {months} months"));
    }

    let mut sources: Vec<String> = Vec::new();
    for hit in matches {
        if let Some(source) = &hit.source
            && !sources.contains(source)
        {
            sources.push(source.clone());
        }
    }
    if !sources.is_empty() {
        lines.push(format!("Found relevant information in: {}", sources.join(", ")));
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CONFIG, Config, EmbeddingProvider, LlmProvider};

    fn span(text: &str, ordinal: usize) -> ChunkSpan {
        ChunkSpan {
            text: text.to_string(),
            start: 0,
            end: text.len(),
            ordinal,
        }
    }

    fn hit(source: Option<&str>, score: f32) -> MatchHit {
        MatchHit {
            chunk_id: "c1".into(),
            document_id: "d1".into(),
            source: source.map(str::to_string),
            ordinal: 0,
            text: "text".into(),
            score,
        }
    }

    // Tests in this module share the process-wide config, so they also share
    // one store directory that outlives every test.
    fn install_test_config() {
        static STORE_DIR: std::sync::OnceLock<tempfile::TempDir> = std::sync::OnceLock::new();
        let dir = STORE_DIR.get_or_init(|| tempfile::tempdir().expect("tempdir"));
        let _ = CONFIG.set(Config {
            store_dir: dir.path().display().to_string(),
            embedding_provider: EmbeddingProvider::Builtin,
            embedding_model: "builtin".into(),
            embedding_dimension: 64,
            ollama_url: None,
            chunk_size: 200,
            chunk_overlap: 40,
            llm_provider: LlmProvider::Disabled,
            llm_model: "llama3".into(),
            llm_timeout_secs: 5,
            llm_max_retries: 0,
            server_port: None,
            search_default_limit: 3,
            search_max_limit: 50,
            search_default_score_threshold: 0.0,
        });
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let (kept, skipped) = dedupe_spans(vec![
            span("alpha", 0),
            span("beta", 1),
            span("alpha", 2),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(skipped, 1);
        assert_eq!(kept[0].0.text, "alpha");
        assert_eq!(kept[0].0.ordinal, 0);
        assert_eq!(kept[1].0.text, "beta");
    }

    #[test]
    fn decision_reflects_retrieval_outcome() {
        let info = extract_query_info("46-year-old male, knee surgery, 3-month-old policy");
        let approved = build_decision(&info, true);
        assert!(approved.approved);
        assert!(approved.details.contains_key("procedure"));
        assert!(approved.details.contains_key("policyDuration"));

        let denied = build_decision(&info, false);
        assert!(!denied.approved);
        assert!(denied.reason.contains("No relevant"));
    }

    #[test]
    fn justification_lists_attributes_and_sources() {
        let info = extract_query_info("46-year-old male, knee surgery in Pune, 3-month-old policy");
        let lines = build_justification(
            &info,
            &[hit(Some("policy.pdf"), 0.9), hit(Some("policy.pdf"), 0.8)],
        );

        assert!(lines.contains(&"Query is about: knee surgery".to_string()));
        assert!(lines.contains(&"Patient: 46 year old male".to_string()));
        assert!(lines.contains(&"Location: Pune".to_string()));
        assert!(lines.contains(&"Policy duration: 3 months".to_string()));
        // Duplicate sources collapse to one entry.
        assert!(lines.contains(&"Found relevant information in: policy.pdf".to_string()));
    }

    #[test]
    fn justification_is_empty_for_unstructured_query_without_matches() {
        let info = extract_query_info("what does the contract say");
        assert!(build_justification(&info, &[]).is_empty());
    }

    #[tokio::test]
    async fn ingest_then_query_round_trip() {
        install_test_config();

        let service = DocumentService::new();
        let outcome = service
            .ingest_document(
                "claims.txt",
                b"Claim approved for knee surgery. Payout processed within thirty days."
                    .to_vec(),
            )
            .await
            .expect("ingest");
        assert!(outcome.chunk_count >= 1);

        let result = service
            .answer_query(QueryRequest {
                query: "knee surgery claim".into(),
                top_k: Some(3),
                score_threshold: Some(0.0),
            })
            .await
            .expect("query");

        assert!(!result.matches.is_empty());
        assert_eq!(result.matches[0].source.as_deref(), Some("claims.txt"));
        assert!(result.decision.approved);
        assert!(result.answer.contains("knee surgery"));

        let health = service.health().await;
        assert_eq!(health.documents, 1);
        assert!(health.chunks >= 1);

        let metrics = service.metrics_snapshot();
        assert_eq!(metrics.documents_ingested, 1);
        assert_eq!(metrics.queries_answered, 1);
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        install_test_config();

        let service = DocumentService::new();
        let error = service
            .answer_query(QueryRequest {
                query: "   ".into(),
                top_k: None,
                score_threshold: None,
            })
            .await
            .expect_err("empty query");
        assert!(matches!(error, ProcessingError::EmptyQuery));
        assert!(error.is_client_error());
    }
}
