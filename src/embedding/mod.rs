//! Embedding client abstraction and adapters.
//!
//! Two providers are supported: a deterministic builtin feature-hash embedder
//! that needs no external service, and an Ollama adapter that calls a local
//! runtime over HTTP. Both produce vectors of the configured dimensionality.

use crate::config::{EmbeddingProvider, get_config};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const EMBEDDING_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// No text, or only empty text, was supplied.
    #[error("Cannot embed empty input")]
    EmptyInput,
    /// Provider produced a vector of the wrong dimensionality.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality configured for the server.
        expected: usize,
        /// Dimensionality actually produced.
        actual: usize,
    },
    /// Provider was unreachable.
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),
    /// Provider was reached but failed to produce embeddings.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied piece of text.
    ///
    /// For a fixed provider and model the output is a pure function of the
    /// input text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Deterministic embedding client hashing token features into a fixed vector.
///
/// Each whitespace-separated token is lowercased, hashed, and accumulated into
/// one slot of the vector; the result is L2-normalized so dot products behave
/// as cosine similarities. Identical input always yields identical output.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Construct an embedder producing vectors of the given dimensionality.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut slot_bytes = [0u8; 8];
            slot_bytes.copy_from_slice(&digest[..8]);
            let slot = (u64::from_le_bytes(slot_bytes) % self.dimension as u64) as usize;
            // The ninth digest byte picks a stable sign so unrelated texts
            // do not all crowd into the positive orthant.
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            embedding[slot] += sign;
        }

        let norm = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbedder {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.dimension == 0 {
            return Err(EmbeddingError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        if texts.is_empty() || texts.iter().all(|text| text.trim().is_empty()) {
            return Err(EmbeddingError::EmptyInput);
        }

        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}

/// Embedding adapter for a local Ollama runtime.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Construct an adapter for the given Ollama base URL and model.
    pub fn new(base_url: String, model: String) -> Self {
        let http = Client::builder()
            .user_agent("docquery/embed")
            .timeout(EMBEDDING_HTTP_TIMEOUT)
            .build()
            .expect("Failed to construct reqwest::Client for embeddings");
        Self {
            http,
            base_url,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embeddings", self.base_url.trim_end_matches('/'))
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let payload = json!({
            "model": self.model,
            "prompt": text,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                EmbeddingError::Unavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbeddingResponse = response.json().await.map_err(|error| {
            EmbeddingError::GenerationFailed(format!("failed to decode Ollama response: {error}"))
        })?;

        Ok(body.embedding)
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() || texts.iter().all(|text| text.trim().is_empty()) {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for text in &texts {
            embeddings.push(self.embed_one(text).await?);
        }
        Ok(embeddings)
    }
}

/// Build an embedding client suitable for the current configuration.
pub fn get_embedding_client() -> Box<dyn EmbeddingClient + Send + Sync> {
    let config = get_config();
    match config.embedding_provider {
        EmbeddingProvider::Builtin => Box::new(HashEmbedder::new(config.embedding_dimension)),
        EmbeddingProvider::Ollama => {
            let base_url = config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            Box::new(OllamaEmbeddingClient::new(
                base_url,
                config.embedding_model.clone(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(64);
        let first = embedder
            .generate_embeddings(vec!["knee surgery claim".into()])
            .await
            .expect("embeddings");
        let second = embedder
            .generate_embeddings(vec!["knee surgery claim".into()])
            .await
            .expect("embeddings");
        assert_eq!(first, second);
        assert_eq!(first[0].len(), 64);
    }

    #[tokio::test]
    async fn hash_embedder_normalizes_vectors() {
        let embedder = HashEmbedder::new(32);
        let vectors = embedder
            .generate_embeddings(vec!["some short passage of text".into()])
            .await
            .expect("embeddings");
        let norm = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hash_embedder_rejects_empty_input() {
        let embedder = HashEmbedder::new(32);
        let error = embedder
            .generate_embeddings(Vec::new())
            .await
            .expect_err("empty input");
        assert!(matches!(error, EmbeddingError::EmptyInput));

        let error = embedder
            .generate_embeddings(vec!["   ".into()])
            .await
            .expect_err("blank input");
        assert!(matches!(error, EmbeddingError::EmptyInput));
    }

    #[tokio::test]
    async fn similar_texts_score_higher_than_unrelated_ones() {
        let embedder = HashEmbedder::new(256);
        let vectors = embedder
            .generate_embeddings(vec![
                "claim approved for knee surgery".into(),
                "knee surgery claim status".into(),
                "quarterly revenue projections spreadsheet".into(),
            ])
            .await
            .expect("embeddings");

        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        assert!(dot(&vectors[0], &vectors[1]) > dot(&vectors[0], &vectors[2]));
    }

    #[tokio::test]
    async fn ollama_client_decodes_embeddings() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embeddings");
                then.status(200)
                    .json_body(serde_json::json!({ "embedding": [0.25, -0.5, 0.75] }));
            })
            .await;

        let client = OllamaEmbeddingClient::new(server.base_url(), "nomic-embed-text".into());
        let vectors = client
            .generate_embeddings(vec!["hello".into()])
            .await
            .expect("embeddings");

        mock.assert();
        assert_eq!(vectors, vec![vec![0.25, -0.5, 0.75]]);
    }

    #[tokio::test]
    async fn ollama_client_surfaces_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embeddings");
                then.status(500).body("model not loaded");
            })
            .await;

        let client = OllamaEmbeddingClient::new(server.base_url(), "nomic-embed-text".into());
        let error = client
            .generate_embeddings(vec!["hello".into()])
            .await
            .expect_err("error response");
        assert!(matches!(error, EmbeddingError::GenerationFailed(message) if message.contains("500")));
    }
}
