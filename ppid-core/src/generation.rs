//! Text generation backends.
//!
//! `TextGenerator` is the single port the responder talks to. Three
//! providers implement it:
//! - **Groq**: OpenAI-compatible `/chat/completions`
//! - **Gemini**: `models/{model}:generateContent`
//! - **Ollama**: local `/api/generate`
//!
//! Which one is live is decided by [`select_provider`] at startup and again
//! whenever the operator changes settings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GenerationConfig;
use crate::models::Settings;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the backend's text as-is. An empty string is a valid answer;
    /// failures are always `Err`.
    async fn complete(&self, system: &str, user: &str) -> Result<String, GenerationError>;

    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Missing API key for {0}")]
    MissingApiKey(&'static str),

    #[error("Unknown generation provider: {0}")]
    UnknownProvider(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Groq,
    Gemini,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "groq",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Ollama => "ollama",
        }
    }
}

/// Resolve the provider. An explicit preference wins when its credentials
/// exist; otherwise Groq key, then Gemini key, then local Ollama.
pub fn select_provider(
    preference: &str,
    groq_key: Option<&str>,
    gemini_key: Option<&str>,
) -> Result<ProviderKind, GenerationError> {
    let has = |k: Option<&str>| k.map(|k| !k.is_empty()).unwrap_or(false);

    match preference {
        "groq" if has(groq_key) => return Ok(ProviderKind::Groq),
        "gemini" if has(gemini_key) => return Ok(ProviderKind::Gemini),
        "ollama" => return Ok(ProviderKind::Ollama),
        "groq" | "gemini" => {
            tracing::warn!(preference, "Preferred provider has no API key, falling back");
        }
        "auto" | "" => {}
        other => return Err(GenerationError::UnknownProvider(other.to_string())),
    }

    if has(groq_key) {
        Ok(ProviderKind::Groq)
    } else if has(gemini_key) {
        Ok(ProviderKind::Gemini)
    } else {
        Ok(ProviderKind::Ollama)
    }
}

/// Build the generator for the current config and runtime settings.
/// Settings keys take precedence over `GROQ_API_KEY` / `GEMINI_API_KEY`.
pub fn build_generator(
    config: &GenerationConfig,
    settings: &Settings,
) -> Result<Arc<dyn TextGenerator>, GenerationError> {
    let groq_key = settings
        .groq_api_key
        .clone()
        .or_else(|| std::env::var("GROQ_API_KEY").ok());
    let gemini_key = settings
        .gemini_api_key
        .clone()
        .or_else(|| std::env::var("GEMINI_API_KEY").ok());
    let preference = settings.provider.as_deref().unwrap_or(&config.provider);

    let kind = select_provider(preference, groq_key.as_deref(), gemini_key.as_deref())?;
    let options = SamplingOptions {
        temperature: settings.temperature,
        max_tokens: config.max_tokens,
    };

    let generator: Arc<dyn TextGenerator> = match kind {
        ProviderKind::Groq => Arc::new(GroqClient::new(
            groq_key.unwrap_or_default(),
            config.groq_model.clone(),
            options,
        )?),
        ProviderKind::Gemini => Arc::new(GeminiClient::new(
            gemini_key.unwrap_or_default(),
            config.gemini_model.clone(),
            options,
        )?),
        ProviderKind::Ollama => Arc::new(OllamaClient::new(
            config.ollama_url.clone(),
            config.ollama_model.clone(),
            options,
        )?),
    };

    tracing::info!(provider = kind.as_str(), "Text generator selected");
    Ok(generator)
}

#[derive(Debug, Clone, Copy)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            max_tokens: 1024,
        }
    }
}

fn http_client() -> Result<Client, GenerationError> {
    // Overall deadline is enforced by the caller; this only guards sockets.
    Ok(Client::builder().timeout(Duration::from_secs(120)).build()?)
}

async fn api_error(response: reqwest::Response) -> GenerationError {
    let code = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    GenerationError::Api { code, message }
}

// ============================================================================
// Groq
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct GroqClient {
    client: Client,
    api_key: String,
    model: String,
    options: SamplingOptions,
    base_url: String,
}

impl GroqClient {
    pub fn new(
        api_key: String,
        model: String,
        options: SamplingOptions,
    ) -> Result<Self, GenerationError> {
        Self::with_base_url(
            api_key,
            model,
            options,
            "https://api.groq.com/openai/v1".to_string(),
        )
    }

    pub fn with_base_url(
        api_key: String,
        model: String,
        options: SamplingOptions,
        base_url: String,
    ) -> Result<Self, GenerationError> {
        if api_key.is_empty() {
            return Err(GenerationError::MissingApiKey("groq"));
        }
        Ok(Self {
            client: http_client()?,
            api_key,
            model,
            options,
            base_url,
        })
    }
}

#[async_trait]
impl TextGenerator for GroqClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| GenerationError::Malformed("no choices in response".into()))
    }

    fn name(&self) -> &str {
        "groq"
    }
}

// ============================================================================
// Gemini
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiTextPart<'a>>,
}

#[derive(Serialize)]
struct GeminiTextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    options: SamplingOptions,
    base_url: String,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        model: String,
        options: SamplingOptions,
    ) -> Result<Self, GenerationError> {
        Self::with_base_url(
            api_key,
            model,
            options,
            "https://generativelanguage.googleapis.com/v1beta".to_string(),
        )
    }

    pub fn with_base_url(
        api_key: String,
        model: String,
        options: SamplingOptions,
        base_url: String,
    ) -> Result<Self, GenerationError> {
        if api_key.is_empty() {
            return Err(GenerationError::MissingApiKey("gemini"));
        }
        Ok(Self {
            client: http_client()?,
            api_key,
            model,
            options,
            base_url,
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, GenerationError> {
        let request = GenerateContentRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiTextPart { text: system }],
            },
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiTextPart { text: user }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.options.temperature,
                max_output_tokens: self.options.max_tokens,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: GenerateContentResponse = response.json().await?;
        let candidate = body
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::Malformed("no candidates in response".into()))?;

        Ok(candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// Ollama
// ============================================================================

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: Option<String>,
}

pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    options: SamplingOptions,
}

impl OllamaClient {
    pub fn new(
        base_url: String,
        model: String,
        options: SamplingOptions,
    ) -> Result<Self, GenerationError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            options,
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, GenerationError> {
        let request = OllamaGenerateRequest {
            model: &self.model,
            system,
            prompt: user,
            stream: false,
            options: OllamaOptions {
                temperature: self.options.temperature,
                num_predict: self.options.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: OllamaGenerateResponse = response.json().await?;
        body.response
            .ok_or_else(|| GenerationError::Malformed("missing `response` field".into()))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

// ============================================================================
// TESTS
// ============================================================================
