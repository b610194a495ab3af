use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::PpidError;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PpidConfig {
    pub service: ServiceConfig,
    pub http: HttpConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub rag: RagConfig,
    pub conversation: ConversationConfig,
    pub pacing: PacingConfig,
    pub transport: TransportConfig,
    pub operator: OperatorConfig,
    pub intents: IntentConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
    pub data_dir: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/ppid-assistant.sock".to_string(),
            log_level: "info".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8766,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `ollama` or `gemini`
    pub backend: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub gemini_model: String,
    pub gemini_dimensions: u32,
    pub max_retries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "nomic-embed-text".to_string(),
            gemini_model: "text-embedding-004".to_string(),
            gemini_dimensions: 768,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    /// `auto`, `groq`, `gemini` or `ollama`
    pub provider: String,
    pub groq_model: String,
    pub gemini_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub timeout_seconds: u64,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "auto".to_string(),
            groq_model: "llama-3.3-70b-versatile".to_string(),
            gemini_model: "gemini-1.5-flash".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "ppid-assistant".to_string(),
            timeout_seconds: 30,
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RagConfig {
    pub docs_folder: String,
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub refresh_interval_seconds: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            docs_folder: "./dokumen_ppid".to_string(),
            top_k: 6,
            // Large enough that a multi-page guide stays in one chunk
            chunk_size: 15000,
            chunk_overlap: 500,
            refresh_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConversationConfig {
    pub inactivity_minutes: i64,
    pub purge_hours: i64,
    pub sweep_interval_minutes: u64,
    pub buffer_capacity: usize,
    pub recap_retention: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            inactivity_minutes: 30,
            purge_hours: 24,
            sweep_interval_minutes: 5,
            buffer_capacity: 30,
            recap_retention: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PacingConfig {
    pub cooldown_ms: u64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub typing_ms_per_char: u64,
    pub typing_cap_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 2000,
            min_delay_ms: 100,
            max_delay_ms: 500,
            typing_ms_per_char: 15,
            typing_cap_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TransportConfig {
    pub gateway_url: String,
    pub credentials_path: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://127.0.0.1:8790".to_string(),
            credentials_path: "./data/wa_auth".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OperatorConfig {
    pub command_timeout_seconds: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            command_timeout_seconds: 30,
        }
    }
}

/// Phrase-list overrides for the intent classifier. Empty lists keep the
/// built-in defaults.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct IntentConfig {
    pub handoff: Vec<String>,
    pub gratitude: Vec<String>,
    pub closing: Vec<String>,
    pub follow_up_triggers: Vec<String>,
}

impl PpidConfig {
    /// Load from a TOML file (optional) layered with `PPID__SECTION__KEY`
    /// environment variables.
    pub fn load(path: &str) -> Result<Self, PpidError> {
        let layered = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("PPID").separator("__"))
            .build()?;
        Ok(layered.try_deserialize()?)
    }

    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.service.data_dir)
    }

    pub fn docs_folder(&self) -> PathBuf {
        expand_path(&self.rag.docs_folder)
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir().join("vectorstore").join("vectors.json")
    }

    pub fn credentials_path(&self) -> PathBuf {
        expand_path(&self.transport.credentials_path)
    }
}

/// Expand `~` and `$VAR` in a configured path. Falls back to the raw string
/// when a variable is undefined.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            tracing::warn!(path = raw, error = %e, "Path expansion failed, using raw path");
            PathBuf::from(raw)
        }
    }
}
