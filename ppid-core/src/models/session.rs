use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a conversation currently sits in the escalation/survey flow.
///
/// A single enum keeps "survey pending", "feedback pending" and "handed off"
/// mutually exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Normal,
    AwaitingSurvey,
    AwaitingFeedback,
    HandedOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedMessage {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub chat_id: String,
    pub last_activity_at: DateTime<Utc>,
    pub customer_name: Option<String>,
    pub message_count: u64,
    pub phase: Phase,
    pub survey_asked: bool,
    pub last_rating: Option<i32>,
    pub last_question: Option<String>,
    pub buffer: VecDeque<BufferedMessage>,
    pub needs_follow_up: bool,
    /// Latched once the standard follow-up question has been appended in
    /// the current conversation lifecycle.
    pub follow_up_asked: bool,
}

impl ConversationSession {
    pub fn new(chat_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            chat_id: chat_id.into(),
            last_activity_at: now,
            customer_name: None,
            message_count: 0,
            phase: Phase::Normal,
            survey_asked: false,
            last_rating: None,
            last_question: None,
            buffer: VecDeque::new(),
            needs_follow_up: false,
            follow_up_asked: false,
        }
    }

    /// Append to the transcript, evicting the oldest entries past `capacity`.
    pub fn push_message(&mut self, role: Role, text: &str, now: DateTime<Utc>, capacity: usize) {
        self.buffer.push_back(BufferedMessage {
            role,
            text: text.to_string(),
            timestamp: now,
        });
        while self.buffer.len() > capacity {
            self.buffer.pop_front();
        }
    }

    pub fn is_survey_pending(&self) -> bool {
        self.phase == Phase::AwaitingSurvey
    }

    pub fn is_feedback_pending(&self) -> bool {
        self.phase == Phase::AwaitingFeedback
    }

    pub fn is_handed_off(&self) -> bool {
        self.phase == Phase::HandedOff
    }

    /// Start a new conversation lifecycle after an expiry. History stays in
    /// the buffer. A survey or feedback reply that is still outstanding
    /// keeps its phase so a late answer is recorded.
    pub fn reset_lifecycle(&mut self) {
        self.follow_up_asked = false;
        if !matches!(self.phase, Phase::AwaitingSurvey | Phase::AwaitingFeedback) {
            self.survey_asked = false;
        }
    }
}
