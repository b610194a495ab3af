//! Survey log, conversation recaps and analytics.

use std::path::Path;

use chrono::Utc;

use ppid_core::models::{Recap, RecapStatus, SurveyResult, SurveyStats};
use ppid_core::{JsonRepository, StoreError};

use crate::app::App;

const CSV_HEADER: [&str; 8] = [
    "Timestamp",
    "Customer",
    "Category",
    "Status",
    "Rating",
    "Evaluation",
    "Summary",
    "Chat ID",
];

pub struct RecapLog {
    surveys: JsonRepository<SurveyResult>,
    recaps: JsonRepository<Recap>,
    retention: usize,
}

impl RecapLog {
    pub fn new(data_dir: &Path, retention: usize) -> Self {
        Self {
            surveys: JsonRepository::new(data_dir.join("survey_results.json")),
            recaps: JsonRepository::new(data_dir.join("recaps.json")),
            retention: retention.max(1),
        }
    }

    pub async fn record_survey(&self, result: SurveyResult) -> Result<(), StoreError> {
        self.surveys.update(move |all| all.push(result)).await
    }

    pub async fn survey_stats(&self) -> SurveyStats {
        SurveyStats::from_results(&self.surveys.load().await)
    }

    /// Newest first; the oldest recaps beyond the retention cap are dropped.
    pub async fn push_recap(&self, recap: Recap) -> Result<(), StoreError> {
        let retention = self.retention;
        self.recaps
            .update(move |all| {
                all.insert(0, recap);
                all.truncate(retention);
            })
            .await
    }

    pub async fn recaps(&self, limit: Option<usize>) -> Vec<Recap> {
        let mut all = self.recaps.load().await;
        if let Some(limit) = limit {
            all.truncate(limit);
        }
        all
    }

    /// `None` when there is nothing to export.
    pub async fn export_csv(&self) -> Option<String> {
        let all = self.recaps.load().await;
        (!all.is_empty()).then(|| recaps_to_csv(&all))
    }
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// RFC 4180: every field quoted, CRLF line endings.
pub fn recaps_to_csv(recaps: &[Recap]) -> String {
    let mut lines = Vec::with_capacity(recaps.len() + 1);
    lines.push(
        CSV_HEADER
            .iter()
            .map(|h| csv_field(h))
            .collect::<Vec<_>>()
            .join(","),
    );

    for r in recaps {
        let rating = r.rating.map(|v| v.to_string()).unwrap_or_default();
        let row = [
            r.timestamp.to_rfc3339(),
            r.customer_name.clone().unwrap_or_default(),
            r.category.clone(),
            r.status.label().to_string(),
            rating,
            r.evaluation.clone().unwrap_or_default(),
            r.summary.clone(),
            r.chat_id.clone(),
        ];
        lines.push(row.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(","));
    }

    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

/// Summarise the chat's buffer into a recap. No-op with fewer than two
/// buffered messages. Operator feedback, when given, is kept as the
/// evaluation; otherwise the model's own assessment is. The buffer is
/// cleared once the recap is stored.
pub async fn generate_recap(
    app: &App,
    chat_id: &str,
    final_rating: Option<i32>,
    feedback: Option<&str>,
) -> Option<Recap> {
    let session = app.sessions.get(chat_id)?;
    if session.buffer.len() < 2 {
        return None;
    }

    let buffer: Vec<_> = session.buffer.iter().cloned().collect();
    let summary = app.responder.summarize(&buffer).await;

    let recap = Recap {
        id: uuid::Uuid::new_v4().to_string(),
        chat_id: chat_id.to_string(),
        customer_name: session.customer_name.clone(),
        timestamp: Utc::now(),
        summary: summary.summary,
        category: summary.category,
        rating: final_rating,
        status: RecapStatus::from_rating(final_rating),
        evaluation: feedback.map(str::to_string).or(summary.evaluation),
    };

    if let Err(e) = app.recaps.push_recap(recap.clone()).await {
        tracing::error!(error = %e, "Failed to store recap");
        return None;
    }
    app.sessions.update(chat_id, |s| s.buffer.clear());
    tracing::info!(status = recap.status.label(), "Recap stored");
    Some(recap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn recap(id: &str, rating: Option<i32>) -> Recap {
        Recap {
            id: id.into(),
            chat_id: "6281@s.whatsapp.net".into(),
            customer_name: Some("Budi".into()),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 29, 10, 30, 0).unwrap(),
            summary: "Tanya \"jam\" layanan".into(),
            category: "Informasi Umum".into(),
            rating,
            status: RecapStatus::from_rating(rating),
            evaluation: None,
        }
    }

    #[tokio::test]
    async fn recaps_are_newest_first_and_capped() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecapLog::new(dir.path(), 3);
        for i in 0..5 {
            log.push_recap(recap(&i.to_string(), Some(5))).await.unwrap();
        }
        let all = log.recaps(None).await;
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["4", "3", "2"]);
        assert_eq!(log.recaps(Some(1)).await.len(), 1);
    }

    #[tokio::test]
    async fn survey_stats_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecapLog::new(dir.path(), 500);
        for rating in [5, 4, 1, 3] {
            log.record_survey(SurveyResult {
                chat_id: "c".into(),
                rating,
                timestamp: Utc::now(),
                customer_name: None,
            })
            .await
            .unwrap();
        }
        let before = log.survey_stats().await;
        assert_eq!(before.total, 4);
        assert_eq!(before.average, 3.3);

        let reopened = RecapLog::new(dir.path(), 500);
        assert_eq!(reopened.survey_stats().await, before);
    }

    #[test]
    fn csv_quotes_every_field() {
        let csv = recaps_to_csv(&[recap("1", None)]);
        let mut lines = csv.split("\r\n");
        assert_eq!(
            lines.next().unwrap(),
            "\"Timestamp\",\"Customer\",\"Category\",\"Status\",\"Rating\",\"Evaluation\",\"Summary\",\"Chat ID\""
        );
        assert_eq!(
            lines.next().unwrap(),
            "\"2024-01-29T10:30:00+00:00\",\"Budi\",\"Informasi Umum\",\"being handled\",\"\",\"\",\"Tanya \"\"jam\"\" layanan\",\"6281@s.whatsapp.net\""
        );
    }

    #[tokio::test]
    async fn empty_export_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecapLog::new(dir.path(), 500);
        assert!(log.export_csv().await.is_none());
        log.push_recap(recap("1", Some(2))).await.unwrap();
        assert!(log.export_csv().await.unwrap().contains("alert, awaiting CS response"));
    }
}
