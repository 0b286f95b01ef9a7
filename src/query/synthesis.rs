//! Answer synthesis from retrieved chunks.
//!
//! When an LLM provider is configured, retrieved passages and the original
//! query are handed to it for abstractive synthesis; each call is bounded by a
//! timeout and retried a bounded number of times with a linear backoff. When no
//! provider is configured the pipeline composes a deterministic extractive
//! answer instead, so the server remains fully functional offline.

use crate::config::{LlmProvider, get_config};
use crate::store::ScoredChunk;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Errors surfaced while synthesizing an answer with a language model.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider was unreachable.
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    Generation(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// The call did not complete within the configured bound.
    #[error("LLM call timed out after {0}s")]
    Timeout(u64),
}

/// Interface implemented by answer-synthesis providers.
#[async_trait]
pub trait AnswerClient: Send + Sync {
    /// Compose an answer to `query` grounded in the retrieved passages.
    async fn synthesize_answer(
        &self,
        query: &str,
        passages: &[String],
    ) -> Result<String, LlmError>;
}

/// Build an answer client based on configuration, or `None` when answer
/// synthesis is handled extractively.
pub fn get_answer_client() -> Option<Box<dyn AnswerClient + Send + Sync>> {
    let config = get_config();
    match config.llm_provider {
        LlmProvider::Disabled => None,
        LlmProvider::Ollama => {
            let base_url = config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            Some(Box::new(OllamaAnswerClient::new(
                base_url,
                config.llm_model.clone(),
                Duration::from_secs(config.llm_timeout_secs),
                config.llm_max_retries,
            )))
        }
    }
}

/// Answer-synthesis adapter for a local Ollama runtime.
pub struct OllamaAnswerClient {
    http: Client,
    base_url: String,
    model: String,
    timeout: Duration,
    max_retries: u32,
}

impl OllamaAnswerClient {
    /// Construct an adapter with explicit timeout and retry bounds.
    pub fn new(base_url: String, model: String, timeout: Duration, max_retries: u32) -> Self {
        let http = Client::builder()
            .user_agent("docquery/answer")
            .build()
            .expect("Failed to construct reqwest::Client for answer synthesis");
        Self {
            http,
            base_url,
            model,
            timeout,
            max_retries,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                // Lower temperature for reproducible answers.
                "temperature": 0.1,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LlmError::Unavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LlmError::Unavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Generation(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaGenerateResponse = response.json().await.map_err(|error| {
            LlmError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(LlmError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl AnswerClient for OllamaAnswerClient {
    async fn synthesize_answer(
        &self,
        query: &str,
        passages: &[String],
    ) -> Result<String, LlmError> {
        let prompt = build_prompt(query, passages);
        let mut last_error = LlmError::Unavailable("no attempt made".into());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                tracing::debug!(attempt, "Retrying LLM call");
            }

            match tokio::time::timeout(self.timeout, self.generate(&prompt)).await {
                Ok(Ok(answer)) => return Ok(answer),
                Ok(Err(error)) => {
                    tracing::warn!(attempt, error = %error, "LLM call failed");
                    last_error = error;
                }
                Err(_) => {
                    let error = LlmError::Timeout(self.timeout.as_secs());
                    tracing::warn!(attempt, error = %error, "LLM call timed out");
                    last_error = error;
                }
            }
        }

        Err(last_error)
    }
}

fn build_prompt(query: &str, passages: &[String]) -> String {
    let mut prompt = String::from(
        "Answer the question using only the context below. \
         If the context does not contain the answer, say so.\n\nContext:\n",
    );
    for (index, passage) in passages.iter().enumerate() {
        prompt.push_str(&format!("[{}] {passage}\n", index + 1));
    }
    prompt.push_str(&format!("\nQuestion: {query}\nAnswer:"));
    prompt
}

/// Compose a deterministic answer from retrieved chunks without an LLM.
///
/// Used when no provider is configured. Leads with the justification lines
/// derived from the query, then quotes the most relevant passage.
pub fn compose_extractive_answer(justification: &[String], matches: &[ScoredChunk]) -> String {
    let Some(top) = matches.first() else {
        return "No relevant information found for this query.".to_string();
    };

    let mut answer = String::new();
    if !justification.is_empty() {
        answer.push_str(&justification.join(". "));
        answer.push_str(". ");
    }
    answer.push_str(&format!(
        "Most relevant passage: \"{}\"",
        truncate_chars(&top.text, 300)
    ));
    answer
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit).collect();
    format!("{}…", cut.trim_end())
}
