use std::fmt;

use serde::{Deserialize, Serialize};

/// Operator-adjustable runtime settings, persisted in `settings.json`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 0 = formal ... 100 = playful.
    pub humor_level: u8,
    pub temperature: f32,
    pub provider: Option<String>,
    pub groq_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            humor_level: 0,
            temperature: 0.6,
            provider: None,
            groq_api_key: None,
            gemini_api_key: None,
        }
    }
}

// Keys must never reach logs.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("humor_level", &self.humor_level)
            .field("temperature", &self.temperature)
            .field("provider", &self.provider)
            .field("groq_api_key", &self.groq_api_key.as_ref().map(|_| "***"))
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Partial update sent by the operator console; absent fields are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub humor_level: Option<u8>,
    pub temperature: Option<f32>,
    pub provider: Option<String>,
    pub groq_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
}

impl Settings {
    pub fn merge(&mut self, patch: SettingsPatch) {
        if let Some(h) = patch.humor_level {
            self.humor_level = h.min(100);
        }
        if let Some(t) = patch.temperature {
            self.temperature = t;
        }
        if let Some(p) = patch.provider {
            self.provider = Some(p).filter(|p| !p.is_empty());
        }
        if let Some(k) = patch.groq_api_key {
            self.groq_api_key = Some(k).filter(|k| !k.is_empty());
        }
        if let Some(k) = patch.gemini_api_key {
            self.gemini_api_key = Some(k).filter(|k| !k.is_empty());
        }
    }

    /// Copy safe to hand to the operator console.
    pub fn masked(&self) -> serde_json::Value {
        serde_json::json!({
            "humor_level": self.humor_level,
            "temperature": self.temperature,
            "provider": self.provider,
            "groq_api_key": self.groq_api_key.as_deref().map(mask_secret),
            "gemini_api_key": self.gemini_api_key.as_deref().map(mask_secret),
        })
    }
}

fn mask_secret(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("****{}", tail)
    }
}
