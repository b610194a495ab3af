use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    #[default]
    Pending,
    Trained,
    Ignored,
}

/// Negative feedback left after a low survey rating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: String,
    pub chat_id: String,
    pub customer_name: Option<String>,
    pub rating: Option<i32>,
    pub feedback: String,
    pub timestamp: DateTime<Utc>,
    pub status: EvaluationStatus,
}

/// A user question the retriever had no context for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGap {
    pub question: String,
    pub chat_id: String,
    pub contact: String,
    pub timestamp: DateTime<Utc>,
}
