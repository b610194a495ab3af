//! Text embedding backends for the document index.
//!
//! Two HTTP backends implement [`EmbeddingBackend`]: a local Ollama server
//! (`/api/embeddings`) and Google's `embedContent` endpoint. Chunks and
//! queries must go through the same backend and model, otherwise cosine
//! scores between them are meaningless.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config::EmbeddingConfig;

/// Vector width of `text-embedding-004`.
pub const GEMINI_DIMENSIONS: usize = 768;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const RETRY_BASE_MS: u64 = 1000;

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Vector for a stored chunk.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Vector for a user question. Defaults to [`EmbeddingBackend::embed`].
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(text).await
    }

    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding backend returned {code}: {message}")]
    Api { code: u16, message: String },

    #[error("expected {expected}-dim vector, backend returned {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("no embedding in backend response")]
    MissingEmbedding,

    #[error("gemini embeddings need an API key")]
    MissingApiKey,

    #[error("embedding still failing after {attempts} attempts")]
    RetryExhausted { attempts: usize },

    #[error("unknown embedding backend '{0}'")]
    UnknownBackend(String),
}

/// Build the backend named by `embedding.backend`.
///
/// `gemini_api_key` comes from runtime settings; when absent the
/// `GEMINI_API_KEY` environment variable is consulted.
pub fn create_backend(
    config: &EmbeddingConfig,
    gemini_api_key: Option<String>,
) -> Result<Box<dyn EmbeddingBackend>, EmbeddingError> {
    let retry = RetryPolicy {
        attempts: config.max_retries,
        base_delay_ms: RETRY_BASE_MS,
    };
    match config.backend.as_str() {
        "ollama" => Ok(Box::new(OllamaEmbeddingClient::new(
            &config.ollama_url,
            &config.ollama_model,
            retry,
        )?)),
        "gemini" => {
            let key = gemini_api_key
                .filter(|k| !k.is_empty())
                .or_else(|| std::env::var("GEMINI_API_KEY").ok())
                .unwrap_or_default();
            Ok(Box::new(GeminiEmbeddingClient::new(
                key,
                &config.gemini_model,
                config.gemini_dimensions as usize,
                retry,
            )?))
        }
        other => Err(EmbeddingError::UnknownBackend(other.to_string())),
    }
}

/// Exponential backoff with jitter, capped at ten seconds per wait.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    fn delays(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.base_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.attempts)
    }
}

fn api_error(code: u16, message: String, backend: &str) -> EmbeddingError {
    tracing::warn!(backend, code, message = %message, "Embedding request rejected");
    EmbeddingError::Api { code, message }
}

// ====================================================================
// Gemini
// ====================================================================

#[derive(Debug, Clone, Copy, Serialize)]
enum EmbedTask {
    #[serde(rename = "RETRIEVAL_DOCUMENT")]
    Document,
    #[serde(rename = "RETRIEVAL_QUERY")]
    Query,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: EmbedTask,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: Option<Values>,
}

#[derive(Deserialize)]
struct Values {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

#[derive(Debug, Clone)]
pub struct GeminiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    retry: RetryPolicy,
}

impl GeminiEmbeddingClient {
    pub fn new(
        api_key: String,
        model: &str,
        dimensions: usize,
        retry: RetryPolicy,
    ) -> Result<Self, EmbeddingError> {
        if api_key.is_empty() {
            return Err(EmbeddingError::MissingApiKey);
        }
        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(30)).build()?,
            base_url: GEMINI_BASE_URL.to_string(),
            api_key,
            model: model.to_string(),
            dimensions,
            retry,
        })
    }

    /// Point the client at another host, e.g. a mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn embed_as(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>, EmbeddingError> {
        Retry::spawn(self.retry.delays(), || self.request(text, task))
            .await
            .map_err(|e| {
                tracing::error!(
                    attempts = self.retry.attempts,
                    error = %e,
                    "Gemini embedding gave up"
                );
                EmbeddingError::RetryExhausted {
                    attempts: self.retry.attempts,
                }
            })
    }

    async fn request(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: [Part { text }],
            },
            task_type: task,
            output_dimensionality: self.dimensions,
        };

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorEnvelope>(&raw) {
                Ok(env) => api_error(env.error.code, env.error.message, "gemini"),
                Err(_) => api_error(status.as_u16(), raw, "gemini"),
            });
        }

        let values = response
            .json::<EmbedContentResponse>()
            .await?
            .embedding
            .ok_or(EmbeddingError::MissingEmbedding)?
            .values;
        if values.len() != self.dimensions {
            return Err(EmbeddingError::InvalidDimensions {
                expected: self.dimensions,
                actual: values.len(),
            });
        }
        Ok(values)
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_as(text, EmbedTask::Document).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_as(text, EmbedTask::Query).await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ====================================================================
// Ollama
// ====================================================================

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct OllamaEmbeddingClient {
    http: Client,
    endpoint: String,
    model: String,
    retry: RetryPolicy,
}

impl OllamaEmbeddingClient {
    pub fn new(base_url: &str, model: &str, retry: RetryPolicy) -> Result<Self, EmbeddingError> {
        // First request after a cold start loads the model
        let http = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            retry,
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&OllamaRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), raw, "ollama"));
        }

        let body: OllamaResponse = response.json().await?;
        if body.embedding.is_empty() {
            return Err(EmbeddingError::MissingEmbedding);
        }
        Ok(body.embedding)
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Retry::spawn(self.retry.delays(), || self.request(text)).await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
