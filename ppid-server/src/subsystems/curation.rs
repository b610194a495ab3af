//! Knowledge gaps and operator evaluations.

use std::path::Path;

use chrono::Utc;

use ppid_core::models::{Evaluation, EvaluationStatus, KnowledgeGap};
use ppid_core::{JsonRepository, StoreError};

pub const AUTO_GENERATED_CHAT: &str = "auto-generated";
pub const AUTO_GENERATED_CONTACT: &str = "AI Analysis";

pub struct Curation {
    gaps: JsonRepository<KnowledgeGap>,
    evaluations: JsonRepository<Evaluation>,
}

impl Curation {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            gaps: JsonRepository::new(data_dir.join("knowledge_gaps.json")),
            evaluations: JsonRepository::new(data_dir.join("evaluations.json")),
        }
    }

    /// Record an unanswerable question. Exact duplicates are ignored;
    /// returns whether a new record was written.
    pub async fn log_gap(&self, question: &str, chat_id: &str, contact: &str) -> Result<bool, StoreError> {
        let question = question.trim();
        self.gaps
            .update(|gaps| {
                if gaps.iter().any(|g| g.question == question) {
                    return false;
                }
                gaps.push(KnowledgeGap {
                    question: question.to_string(),
                    chat_id: chat_id.to_string(),
                    contact: contact.to_string(),
                    timestamp: Utc::now(),
                });
                true
            })
            .await
    }

    pub async fn gaps(&self) -> Vec<KnowledgeGap> {
        self.gaps.load().await
    }

    pub async fn dismiss_gap(&self, question: &str) -> Result<bool, StoreError> {
        let question = question.trim();
        self.gaps
            .update(|gaps| {
                let before = gaps.len();
                gaps.retain(|g| g.question != question);
                gaps.len() != before
            })
            .await
    }

    pub async fn record_evaluation(
        &self,
        chat_id: &str,
        customer_name: Option<String>,
        rating: Option<i32>,
        feedback: &str,
    ) -> Result<Evaluation, StoreError> {
        let evaluation = Evaluation {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            customer_name,
            rating,
            feedback: feedback.to_string(),
            timestamp: Utc::now(),
            status: EvaluationStatus::Pending,
        };
        let record = evaluation.clone();
        self.evaluations.update(move |all| all.push(record)).await?;
        Ok(evaluation)
    }

    pub async fn evaluations(&self) -> Vec<Evaluation> {
        self.evaluations.load().await
    }

    /// `Ok(false)` when no evaluation has this id.
    pub async fn resolve_evaluation(&self, id: &str, status: EvaluationStatus) -> Result<bool, StoreError> {
        self.evaluations
            .update(|all| match all.iter_mut().find(|e| e.id == id) {
                Some(e) => {
                    e.status = status;
                    true
                }
                None => false,
            })
            .await
    }
}
