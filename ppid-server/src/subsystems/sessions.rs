//! Conversation session store.
//!
//! In-memory map keyed by chat id. Every mutation goes through a DashMap
//! entry guard, so updates to one chat are linearised while different
//! chats never contend. The map is snapshotted to `sessions.json` after
//! each sweep and on shutdown, and restored at startup.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use ppid_core::config::ConversationConfig;
use ppid_core::models::{ConversationSession, Phase, Role};
use ppid_core::{JsonRepository, StoreError};

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Sessions that just moved to `AwaitingSurvey` and should receive the
    /// inactivity survey: `(chat_id, customer_name)`.
    pub survey_due: Vec<(String, Option<String>)>,
    pub purged: usize,
}

pub struct SessionStore {
    sessions: DashMap<String, ConversationSession>,
    config: ConversationConfig,
    repo: JsonRepository<ConversationSession>,
}

impl SessionStore {
    pub fn new(config: ConversationConfig, snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
            repo: JsonRepository::new(snapshot_path),
        }
    }

    fn inactivity(&self) -> Duration {
        Duration::minutes(self.config.inactivity_minutes)
    }

    fn purge_after(&self) -> Duration {
        Duration::hours(self.config.purge_hours)
    }

    pub fn get(&self, chat_id: &str) -> Option<ConversationSession> {
        self.sessions.get(chat_id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// No session, or no activity for longer than the inactivity window.
    pub fn is_expired(&self, chat_id: &str, now: DateTime<Utc>) -> bool {
        match self.sessions.get(chat_id) {
            Some(s) => now - s.last_activity_at > self.inactivity(),
            None => true,
        }
    }

    /// Record activity for `chat_id`, creating the session when needed.
    /// Returns `true` when the chat was expired before this touch, in which
    /// case a new lifecycle starts.
    pub fn touch(&self, chat_id: &str, name: Option<&str>, now: DateTime<Utc>) -> bool {
        let inactivity = self.inactivity();
        let mut entry = self.sessions.entry(chat_id.to_string()).or_insert_with(|| {
            let mut fresh = ConversationSession::new(chat_id, now);
            // Backdate so the first touch reads as an expiry
            fresh.last_activity_at = now - inactivity - Duration::seconds(1);
            fresh
        });

        let session = entry.value_mut();
        let expired = now - session.last_activity_at > inactivity;
        if expired {
            session.reset_lifecycle();
        }
        session.last_activity_at = now;
        session.message_count += 1;
        session.needs_follow_up = false;
        if let Some(name) = name {
            session.customer_name = Some(name.to_string());
        }
        expired
    }

    pub fn append_to_buffer(&self, chat_id: &str, role: Role, text: &str, now: DateTime<Utc>) {
        let capacity = self.config.buffer_capacity;
        if let Some(mut s) = self.sessions.get_mut(chat_id) {
            s.push_message(role, text, now, capacity);
        }
    }

    /// Apply `f` to the session under its entry lock.
    pub fn update<R>(&self, chat_id: &str, f: impl FnOnce(&mut ConversationSession) -> R) -> Option<R> {
        self.sessions.get_mut(chat_id).map(|mut s| f(s.value_mut()))
    }

    pub fn handed_off(&self) -> Vec<ConversationSession> {
        self.sessions
            .iter()
            .filter(|s| s.is_handed_off())
            .map(|s| s.clone())
            .collect()
    }

    /// Purge sessions idle past the purge window and latch the inactivity
    /// survey for idle sessions that were never surveyed. State changes
    /// here; sending is the caller's job.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let purge_after = self.purge_after();
        let inactivity = self.inactivity();

        let before = self.sessions.len();
        self.sessions
            .retain(|_, s| now - s.last_activity_at < purge_after);
        let purged = before.saturating_sub(self.sessions.len());

        let mut survey_due = Vec::new();
        for mut s in self.sessions.iter_mut() {
            if now - s.last_activity_at >= inactivity
                && s.phase == Phase::Normal
                && !s.survey_asked
            {
                s.phase = Phase::AwaitingSurvey;
                s.survey_asked = true;
                survey_due.push((s.chat_id.clone(), s.customer_name.clone()));
            }
        }

        if purged > 0 || !survey_due.is_empty() {
            tracing::info!(purged, surveys = survey_due.len(), "Session sweep");
        }
        SweepReport { survey_due, purged }
    }

    pub async fn snapshot(&self) -> Result<usize, StoreError> {
        let all: Vec<ConversationSession> = self.sessions.iter().map(|s| s.clone()).collect();
        self.repo.save(&all).await?;
        Ok(all.len())
    }

    /// Load the last snapshot. A missing file restores nothing; a malformed
    /// one is logged and ignored.
    pub async fn restore(&self) -> usize {
        let loaded = self.repo.load().await;
        let count = loaded.len();
        for session in loaded {
            self.sessions.insert(session.chat_id.clone(), session);
        }
        if count > 0 {
            tracing::info!(sessions = count, "Restored sessions snapshot");
        }
        count
    }
}
