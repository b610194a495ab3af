//! Phrase-based intent detection and contact-name helpers.

use once_cell::sync::Lazy;
use regex::Regex;

use ppid_core::config::IntentConfig;

static RATING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-5]$").expect("valid rating regex"));

static INTRODUCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:nama saya|namaku|nama aku|saya bernama|perkenalkan,? saya)\s+([[:alpha:]]+)")
        .expect("valid introduction regex")
});

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid non-word regex"));

const HANDOFF: &[&str] = &[
    "bicara dengan manusia",
    "bicara dengan cs",
    "hubungi cs",
    "customer service",
    "bicara dengan admin",
    "mau komplain",
    "butuh bantuan manusia",
    "operator",
    "hubungi petugas",
    "sambungkan ke cs",
    "minta cs",
    "ingin bicara dengan orang",
    "mau bicara dengan orang",
    "berbicara dengan petugas",
    "terhubung dengan cs",
    "mau ngobrol sama orang",
];

const GRATITUDE: &[&str] = &["terima kasih", "makasih", "thanks", "matur nuwun", "suwun"];

const CLOSING: &[&str] = &[
    "tidak ada",
    "tidak",
    "sudah cukup",
    "cukup",
    "itu saja",
    "terima kasih",
    "makasih",
    "thanks",
    "ok",
    "oke",
    "siap",
    "sudah",
    "selesai",
    "clear",
];

const FOLLOW_UP_TRIGGERS: &[&str] = &[
    "formulir",
    "form",
    "silakan mengisi",
    "dapat mengunjungi",
    "informasi lebih lanjut",
    "prosesnya",
    "langkah",
];

pub trait IntentClassifier: Send + Sync {
    fn is_handoff_request(&self, text: &str) -> bool;

    fn is_gratitude(&self, text: &str) -> bool;

    /// Short conversation-ending reply such as "tidak ada" or "oke".
    fn is_closing(&self, text: &str) -> bool;

    /// The generated answer points the user at a procedure worth a
    /// follow-up question.
    fn needs_follow_up(&self, answer: &str) -> bool;
}

/// Case-insensitive phrase lists. Handoff, gratitude and follow-up match as
/// substrings; closing phrases must be the whole reply or its first or last
/// words.
#[derive(Debug, Clone)]
pub struct PhraseClassifier {
    handoff: Vec<String>,
    gratitude: Vec<String>,
    closing: Vec<String>,
    follow_up: Vec<String>,
}

fn phrases(configured: &[String], defaults: &[&str]) -> Vec<String> {
    if configured.is_empty() {
        defaults.iter().map(|p| p.to_string()).collect()
    } else {
        configured.iter().map(|p| p.to_lowercase()).collect()
    }
}

impl PhraseClassifier {
    pub fn from_config(config: &IntentConfig) -> Self {
        Self {
            handoff: phrases(&config.handoff, HANDOFF),
            gratitude: phrases(&config.gratitude, GRATITUDE),
            closing: phrases(&config.closing, CLOSING),
            follow_up: phrases(&config.follow_up_triggers, FOLLOW_UP_TRIGGERS),
        }
    }
}

impl Default for PhraseClassifier {
    fn default() -> Self {
        Self::from_config(&IntentConfig::default())
    }
}

fn contains_any(text: &str, list: &[String]) -> bool {
    let lower = text.to_lowercase();
    list.iter().any(|p| lower.contains(p.as_str()))
}

impl IntentClassifier for PhraseClassifier {
    fn is_handoff_request(&self, text: &str) -> bool {
        contains_any(text, &self.handoff)
    }

    fn is_gratitude(&self, text: &str) -> bool {
        contains_any(text, &self.gratitude)
    }

    fn is_closing(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        let reply = lower
            .trim()
            .trim_end_matches(|c: char| c.is_ascii_punctuation());
        self.closing.iter().any(|p| {
            reply == p
                || reply.starts_with(&format!("{} ", p))
                || reply.ends_with(&format!(" {}", p))
        })
    }

    fn needs_follow_up(&self, answer: &str) -> bool {
        contains_any(answer, &self.follow_up)
    }
}

/// Survey reply: exactly one digit 1-5 after trimming.
pub fn parse_rating(text: &str) -> Option<i32> {
    let trimmed = text.trim();
    if RATING.is_match(trimmed) {
        trimmed.parse().ok()
    } else {
        None
    }
}

/// Name from a self-introduction ("nama saya budi" -> "Budi").
pub fn extract_name(text: &str) -> Option<String> {
    let caps = INTRODUCTION.captures(text)?;
    let raw = caps.get(1)?.as_str();
    let mut chars = raw.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect())
}

/// Push name stripped of emoji and punctuation; `None` when nothing is left.
pub fn clean_contact(push_name: Option<&str>) -> Option<String> {
    let cleaned = NON_WORD.replace_all(push_name?, "");
    let trimmed = cleaned.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
