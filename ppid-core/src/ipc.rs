//! Operator console protocol.
//!
//! Carried as length-prefixed MessagePack frames over the Unix socket and
//! as JSON on `POST /command`.

use serde::{Deserialize, Serialize};

use crate::models::{EvaluationStatus, SettingsPatch};

pub const PROTOCOL_VERSION: &str = "0.1.0";

/// An attachment for a manual reply, base64 encoded as the console
/// read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub mimetype: String,
    pub filename: String,
    pub data: String,
}

impl MediaPayload {
    /// Images go out as pictures, everything else as a document.
    pub fn is_image(&self) -> bool {
        self.mimetype.starts_with("image/")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OperatorCommand {
    Ping,
    Status,
    Start,
    Stop,
    /// `text` may be empty when `media` is attached; it becomes the
    /// caption then.
    ManualReply {
        chat_id: String,
        #[serde(default)]
        text: String,
        #[serde(default)]
        media: Option<MediaPayload>,
    },
    ReleaseHandover {
        chat_id: String,
    },
    Train {
        question: String,
        answer: String,
    },
    TestPrompt {
        query: String,
    },
    UpdateSettings {
        settings: SettingsPatch,
    },
    GetSettings,
    Logout,
    GetSurveyStats,
    GetRecaps {
        #[serde(default)]
        limit: Option<usize>,
    },
    ExportRecapsCsv,
    GetEvaluations,
    ResolveEvaluation {
        id: String,
        status: EvaluationStatus,
    },
    GetKnowledgeGaps,
    DismissKnowledgeGap {
        question: String,
    },
    GenerateQuestions,
    ListDocuments,
    Reindex,
    /// Turns the connection into an `OperatorEvent` stream.
    Subscribe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl OperatorResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Close,
}

/// One-way notifications pushed to subscribed operator consoles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OperatorEvent {
    MessageIn {
        chat_id: String,
        name: String,
        text: String,
        #[serde(default)]
        needs_review: bool,
    },
    MessageOut {
        chat_id: String,
        name: String,
        text: String,
    },
    HandoverRequest {
        chat_id: String,
        name: String,
        text: String,
    },
    SurveyUpdate {
        chat_id: String,
        rating: i32,
    },
    Qr {
        code: String,
    },
    ConnectionState {
        state: ConnectionState,
    },
    Error {
        message: String,
    },
    LoggedOut,
}
