//! In-process doubles for engine scenarios.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ppid_core::ipc::{ConnectionState, MediaPayload};
use ppid_core::models::{DocumentChunk, Settings, SourceType};
use ppid_core::{EmbeddingBackend, EmbeddingError, GenerationError, PpidConfig, TextGenerator};
use ppid_ingest::VectorIndex;
use ppid_server::transport::Presence;
use ppid_server::{App, AppDeps, GeneratorFactory, Transport, TransportError};

pub const CHAT: &str = "6281234567890@s.whatsapp.net";

// ============================================================================
// Transport
// ============================================================================

pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    media: Mutex<Vec<(String, MediaPayload, Option<String>)>>,
    presence: Mutex<Vec<(String, Presence)>>,
    connected: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            media: Mutex::new(Vec::new()),
            presence: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn sent_to(&self, chat_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == chat_id)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn last_to(&self, chat_id: &str) -> Option<String> {
        self.sent_to(chat_id).pop()
    }

    /// Attachments with their captions, in send order.
    pub fn media_to(&self, chat_id: &str) -> Vec<(MediaPayload, Option<String>)> {
        self.media
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _, _)| c == chat_id)
            .map(|(_, m, caption)| (m.clone(), caption.clone()))
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn presence_count(&self) -> usize {
        self.presence.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_media(
        &self,
        chat_id: &str,
        media: &MediaPayload,
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.media.lock().unwrap().push((
            chat_id.to_string(),
            media.clone(),
            caption.map(str::to_string),
        ));
        Ok(())
    }

    async fn send_presence(&self, chat_id: &str, presence: Presence) -> Result<(), TransportError> {
        self.presence
            .lock()
            .unwrap()
            .push((chat_id.to_string(), presence));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.set_connected(false);
        Ok(())
    }

    fn mark_connection(&self, state: ConnectionState) {
        self.set_connected(state == ConnectionState::Open);
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Answers from a fixed script. Summary and question prompts are
/// recognised by their system prompt.
pub struct ScriptedGenerator {
    reply: Mutex<String>,
    pub calls: AtomicUsize,
}

pub const SUMMARY_JSON: &str =
    r#"{"summary": "Menanyakan jam layanan", "category": "Informasi Umum", "evaluation": "Jawaban tepat"}"#;

pub const QUESTIONS: &str = "1. Bagaimana cara mengajukan permohonan informasi?\n2. Berapa lama proses keberatan?\nok\n- Apakah layanan PPID dipungut biaya?";

impl ScriptedGenerator {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_reply(&self, reply: &str) {
        *self.reply.lock().unwrap() = reply.to_string();
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, system: &str, _user: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if system.contains("Balas HANYA dengan JSON") {
            return Ok(SUMMARY_JSON.to_string());
        }
        if system.contains("menyusun daftar pertanyaan") {
            return Ok(QUESTIONS.to_string());
        }
        Ok(self.reply.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn factory_for(generator: Arc<ScriptedGenerator>) -> GeneratorFactory {
    Arc::new(move |_settings: &Settings| Ok(generator.clone() as Arc<dyn TextGenerator>))
}

// ============================================================================
// Embedding
// ============================================================================

/// Three axes: opening hours, fees, anything else.
pub struct KeywordEmbedder;

#[async_trait]
impl EmbeddingBackend for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let t = text.to_lowercase();
        let hours = t.contains("jam") as u8 as f32;
        let fees = t.contains("biaya") as u8 as f32;
        let other = if hours == 0.0 && fees == 0.0 { 1.0 } else { 0.1 };
        Ok(vec![hours, fees, other])
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

// ============================================================================
// App
// ============================================================================

pub struct Harness {
    pub app: Arc<App>,
    pub transport: Arc<RecordingTransport>,
    pub generator: Arc<ScriptedGenerator>,
}

/// Config rooted in `dir` with instant pacing and no cooldown.
pub fn test_config(dir: &Path) -> PpidConfig {
    let mut config = PpidConfig::default();
    config.service.data_dir = dir.join("data").display().to_string();
    config.service.socket_path = dir.join("ppid.sock").display().to_string();
    config.rag.docs_folder = dir.join("docs").display().to_string();
    config.transport.credentials_path = dir.join("wa_auth").display().to_string();
    config.pacing.cooldown_ms = 0;
    config.pacing.min_delay_ms = 0;
    config.pacing.max_delay_ms = 0;
    config.pacing.typing_ms_per_char = 0;
    config.pacing.typing_cap_ms = 0;
    config.generation.timeout_seconds = 5;
    config.operator.command_timeout_seconds = 5;
    config
}

pub async fn harness_with(config: PpidConfig, reply: &str) -> Harness {
    let transport = RecordingTransport::new();
    let generator = ScriptedGenerator::new(reply);
    let app = App::build(
        config,
        AppDeps {
            transport: transport.clone(),
            embedder: Arc::new(KeywordEmbedder),
            generator_factory: factory_for(generator.clone()),
        },
    )
    .await
    .expect("app builds");
    Harness {
        app,
        transport,
        generator,
    }
}

pub async fn harness(dir: &Path, reply: &str) -> Harness {
    harness_with(test_config(dir), reply).await
}

/// Write a small knowledge index where `build` will load it.
pub async fn seed_index(config: &PpidConfig) {
    let chunk = |content: &str, embedding: Vec<f32>| DocumentChunk {
        content: content.to_string(),
        source_id: "layanan.md".to_string(),
        source_type: SourceType::Markdown,
        embedding,
    };
    let index = VectorIndex::new(vec![
        chunk("Jam layanan PPID: Senin-Jumat 08.00-16.00.", vec![1.0, 0.0, 0.1]),
        chunk("Layanan informasi publik tidak dipungut biaya.", vec![0.0, 1.0, 0.1]),
    ]);
    index.save(&config.index_path()).await.expect("index saved");
}
