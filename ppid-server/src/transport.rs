//! Messaging transport port.
//!
//! Outbound traffic goes through [`Transport`]. Inbound messages and
//! connection updates are pushed by the gateway process to the HTTP API
//! (`POST /inbound`, `POST /connection`) and arrive here as plain DTOs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use ppid_core::ipc::{ConnectionState, MediaPayload};

use crate::messages;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway error {code}: {message}")]
    Gateway { code: u16, message: String },

    #[error("transport not connected")]
    NotConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Composing,
    Paused,
    Available,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Document,
    Audio,
    Video,
    Sticker,
}

/// One inbound chat message as reported by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    pub chat_id: String,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub media: Option<MediaKind>,
    /// Stamped by the dispatcher on arrival; the cooldown is measured
    /// against it.
    #[serde(skip)]
    pub received_at: Option<Instant>,
}

impl InboundMessage {
    pub fn text(chat_id: impl Into<String>, push_name: &str, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            push_name: Some(push_name.to_string()),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Plain text, else the media caption, else a placeholder for images
    /// and documents. Other media without a caption carries no text.
    pub fn text_content(&self) -> Option<String> {
        let non_blank = |s: &Option<String>| s.as_ref().filter(|t| !t.trim().is_empty()).cloned();

        non_blank(&self.text)
            .or_else(|| non_blank(&self.caption))
            .or_else(|| match self.media {
                Some(MediaKind::Image) => Some(messages::IMAGE_PLACEHOLDER.to_string()),
                Some(MediaKind::Document) => Some(messages::DOCUMENT_PLACEHOLDER.to_string()),
                _ => None,
            })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionUpdate {
    #[serde(default)]
    pub state: Option<ConnectionState>,
    #[serde(default)]
    pub qr: Option<String>,
    /// Set on `close` when the session was logged out on the phone.
    #[serde(default)]
    pub logged_out: bool,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), TransportError>;

    /// Send an attachment, with `caption` shown under it when present.
    async fn send_media(
        &self,
        chat_id: &str,
        media: &MediaPayload,
        caption: Option<&str>,
    ) -> Result<(), TransportError>;

    async fn send_presence(&self, chat_id: &str, presence: Presence) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    async fn logout(&self) -> Result<(), TransportError>;

    /// Connection state reported by the gateway.
    fn mark_connection(&self, _state: ConnectionState) {}
}

/// Drives a messaging gateway over its local HTTP API.
pub struct GatewayTransport {
    client: reqwest::Client,
    base_url: String,
    connected: AtomicBool,
}

impl GatewayTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            connected: AtomicBool::new(false),
        })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), TransportError> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(TransportError::Gateway {
                code: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for GatewayTransport {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.post("/send", serde_json::json!({ "chat_id": chat_id, "text": text }))
            .await
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
        let kind = if media.is_image() {
            MediaKind::Image
        } else {
            MediaKind::Document
        };
        self.post(
            "/send-media",
            serde_json::json!({
                "chat_id": chat_id,
                "kind": kind,
                "mimetype": media.mimetype,
                "filename": media.filename,
                "data": media.data,
                "caption": caption,
            }),
        )
        .await
    }

    async fn send_presence(&self, chat_id: &str, presence: Presence) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.post(
            "/presence",
            serde_json::json!({ "chat_id": chat_id, "state": presence }),
        )
        .await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.post("/logout", serde_json::json!({})).await?;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn mark_connection(&self, state: ConnectionState) {
        self.connected
            .store(state == ConnectionState::Open, Ordering::SeqCst);
    }
}

/// Delete the stored session credentials so the next start asks for a new
/// pairing. Already gone is fine.
pub async fn remove_credentials(path: &std::path::Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            tracing::info!(path = %path.display(), "Session credentials removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Group chats and status broadcasts are never answered.
pub fn is_group_or_broadcast(chat_id: &str) -> bool {
    chat_id.ends_with("@g.us") || chat_id == "status@broadcast"
}

/// Log-safe form of a chat id: `6281****90`.
pub fn mask_chat_id(chat_id: &str) -> String {
    let local = chat_id.split('@').next().unwrap_or_default();
    let chars: Vec<char> = local.chars().collect();
    if chars.len() <= 6 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}****{}", head, tail)
}
