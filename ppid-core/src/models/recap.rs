use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecapStatus {
    Resolved,
    InProgress,
    Alert,
}

impl RecapStatus {
    /// >=4 resolved, <=2 alert, otherwise still being handled.
    pub fn from_rating(rating: Option<i32>) -> Self {
        match rating {
            Some(r) if r >= 4 => RecapStatus::Resolved,
            Some(r) if r <= 2 => RecapStatus::Alert,
            _ => RecapStatus::InProgress,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecapStatus::Resolved => "successfully handled",
            RecapStatus::InProgress => "being handled",
            RecapStatus::Alert => "alert, awaiting CS response",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recap {
    pub id: String,
    pub chat_id: String,
    pub customer_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    pub category: String,
    pub rating: Option<i32>,
    pub status: RecapStatus,
    pub evaluation: Option<String>,
}
