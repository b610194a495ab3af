//! Response generation: persona prompt, bounded backend calls and the
//! fixed apology fallback.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;

use ppid_core::generation::{GenerationError, TextGenerator};
use ppid_core::models::{BufferedMessage, Role, Settings};

use crate::messages;

/// Rebuilds the generator after a settings change.
pub type GeneratorFactory =
    Arc<dyn Fn(&Settings) -> Result<Arc<dyn TextGenerator>, GenerationError> + Send + Sync>;

const QUESTION_SAMPLE_CHARS: usize = 1500;
const MAX_PROPOSED_QUESTIONS: usize = 5;

#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationSummary {
    pub summary: String,
    pub category: String,
    #[serde(default)]
    pub evaluation: Option<String>,
}

impl ConversationSummary {
    pub fn failed() -> Self {
        Self {
            summary: "failed".to_string(),
            category: "uncategorized".to_string(),
            evaluation: None,
        }
    }
}

pub struct Responder {
    generator: RwLock<Arc<dyn TextGenerator>>,
    timeout: Duration,
}

impl Responder {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self {
            generator: RwLock::new(generator),
            timeout,
        }
    }

    pub async fn set_generator(&self, generator: Arc<dyn TextGenerator>) {
        tracing::info!(provider = generator.name(), "Text generator switched");
        *self.generator.write().await = generator;
    }

    pub async fn provider_name(&self) -> String {
        self.generator.read().await.name().to_string()
    }

    /// One backend call bounded by the generation timeout, trimmed.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, ResponderError> {
        let generator = self.generator.read().await.clone();
        match tokio::time::timeout(self.timeout, generator.complete(system, user)).await {
            Ok(result) => Ok(result?.trim().to_string()),
            Err(_) => Err(ResponderError::Timeout(self.timeout)),
        }
    }

    /// Answer `query` from `context`. Never empty: failures, timeouts and
    /// blank answers all become the apology text.
    pub async fn generate(&self, query: &str, context: &str, humor_level: u8) -> String {
        let system = persona_prompt(humor_level, context);
        match self.complete(&system, query).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => {
                tracing::warn!("Generator returned empty text");
                messages::APOLOGY.to_string()
            }
            Err(e) => {
                tracing::error!(error = %e, "Generation failed");
                messages::APOLOGY.to_string()
            }
        }
    }

    pub async fn summarize(&self, buffer: &[BufferedMessage]) -> ConversationSummary {
        let transcript: Vec<String> = buffer
            .iter()
            .map(|m| {
                let who = match m.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                format!("{}: {}", who, m.text)
            })
            .collect();

        match self.complete(SUMMARY_PROMPT, &transcript.join("\n")).await {
            Ok(text) => parse_summary(&text).unwrap_or_else(|| {
                tracing::warn!("Summary was not valid JSON");
                ConversationSummary::failed()
            }),
            Err(e) => {
                tracing::error!(error = %e, "Summary generation failed");
                ConversationSummary::failed()
            }
        }
    }

    /// Up to five questions citizens are likely to ask, drawn from a sample
    /// of indexed context.
    pub async fn generate_questions(&self, sample_context: &str) -> Vec<String> {
        if sample_context.trim().is_empty() {
            return Vec::new();
        }
        let sample: String = sample_context.chars().take(QUESTION_SAMPLE_CHARS).collect();
        let prompt = format!(
            "Berdasarkan informasi berikut, buatlah 5 pertanyaan yang mungkin ditanyakan oleh masyarakat. Format: satu pertanyaan per baris, tanpa nomor.\n\nInformasi:\n{}\n\nPertanyaan yang mungkin:",
            sample
        );

        match self
            .complete("Anda membantu petugas PPID menyusun daftar pertanyaan.", &prompt)
            .await
        {
            Ok(text) => parse_questions(&text),
            Err(e) => {
                tracing::error!(error = %e, "Question generation failed");
                Vec::new()
            }
        }
    }
}

const SUMMARY_PROMPT: &str = "Anda menganalisis percakapan layanan informasi publik PPID BRIDA Jawa Tengah. \
Balas HANYA dengan JSON tanpa teks lain, dengan format: \
{\"summary\": \"ringkasan singkat permintaan dan hasilnya\", \"category\": \"kategori layanan\", \
\"evaluation\": \"penilaian singkat kualitas jawaban asisten\"}";

pub fn humor_band(level: u8) -> &'static str {
    match level {
        0 => "Formal, baku, objektif, dan sangat profesional (Standar Pemerintahan).",
        1..=30 => "Ramah, sedikit santai, namun tetap profesional 100%.",
        31..=70 => "Santai dan bersahabat (Casual), boleh memakai bahasa sehari-hari yang sopan.",
        _ => "Ceria dan jenaka (Playful), boleh menyisipkan humor ringan dan emoji secukupnya tanpa mengurangi ketepatan informasi. \
Jika pengguna merayu atau bercanda (misal 'sayang aku ga?'), balas dengan candaan singkat yang tetap sopan \
(cukup satu kalimat, tanpa menanggapi lebih jauh), lalu kembalikan percakapan ke layanan PPID.",
    }
}

pub fn persona_prompt(humor_level: u8, context: &str) -> String {
    let context = if context.trim().is_empty() {
        "(Tidak ada dokumen yang relevan.)"
    } else {
        context
    };
    format!(
        "Anda adalah PPID Assistant, konsultan virtual Pejabat Pengelola Informasi dan Dokumentasi \
BRIDA (Badan Riset dan Inovasi Daerah) Provinsi Jawa Tengah.\n\n\
GAYA BAHASA: {}\n\n\
ATURAN:\n\
1. Jawab dalam Bahasa Indonesia berdasarkan KONTEKS di bawah. Kutip informasi apa adanya.\n\
2. Pertanyaan dengan kata berbeda tetapi bermakna sama tetap dijawab dari konteks yang sesuai.\n\
3. Jangan pernah mengarang nomor SK, nomor peraturan, tanggal, atau angka yang tidak ada di konteks.\n\
4. Jika informasi tidak tersedia, sampaikan dengan sopan dan arahkan ke email brida@jatengprov.go.id.\n\
5. Gunakan format WhatsApp: *tebal* untuk penekanan, daftar bernomor untuk langkah.\n\n\
KONTEKS:\n{}",
        humor_band(humor_level),
        context
    )
}

/// Lenient JSON extraction: tolerates code fences and prose around the
/// object.
pub fn parse_summary(text: &str) -> Option<ConversationSummary> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

pub fn parse_questions(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| {
            l.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '-' || c == '*')
                .trim()
        })
        .filter(|l| l.chars().count() > 10 && l.contains('?'))
        .take(MAX_PROPOSED_QUESTIONS)
        .map(str::to_string)
        .collect()
}
