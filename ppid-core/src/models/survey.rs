use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded satisfaction rating. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyResult {
    pub chat_id: String,
    /// 1-5 when recorded by the state machine; legacy data may hold other
    /// values, which statistics clamp.
    pub rating: i32,
    pub timestamp: DateTime<Utc>,
    pub customer_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyStats {
    pub total: usize,
    /// Mean rating rounded to one decimal, 0.0 when empty.
    pub average: f64,
    /// Counts for ratings 1..=5.
    pub distribution: [usize; 5],
    /// Last ten results, newest first.
    pub recent: Vec<SurveyResult>,
}

impl SurveyStats {
    pub fn from_results(results: &[SurveyResult]) -> Self {
        let mut distribution = [0usize; 5];
        let mut sum: i64 = 0;

        for r in results {
            sum += r.rating as i64;
            let idx = (r.rating.clamp(1, 5) - 1) as usize;
            distribution[idx] += 1;
        }

        let total = results.len();
        let average = if total > 0 {
            ((sum as f64 / total as f64) * 10.0).round() / 10.0
        } else {
            0.0
        };

        let recent = results.iter().rev().take(10).cloned().collect();

        Self {
            total,
            average,
            distribution,
            recent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(rating: i32) -> SurveyResult {
        SurveyResult {
            chat_id: "c".into(),
            rating,
            timestamp: Utc::now(),
            customer_name: None,
        }
    }

    #[test]
    fn out_of_range_ratings_are_clamped_into_buckets() {
        let results: Vec<_> = [0, 7, 3, 5, -2].into_iter().map(result).collect();
        let stats = SurveyStats::from_results(&results);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.distribution.iter().sum::<usize>(), stats.total);
        assert_eq!(stats.distribution, [2, 0, 1, 0, 2]);
    }

    #[test]
    fn average_and_recent_order() {
        let results: Vec<_> = (1..=12).map(|i| result((i % 5) + 1)).collect();
        let stats = SurveyStats::from_results(&results);
        assert_eq!(stats.recent.len(), 10);
        assert_eq!(stats.recent[0].rating, results[11].rating);
        assert_eq!(stats.recent[9].rating, results[2].rating);
        assert!(stats.average > 0.0 && stats.average <= 5.0);
    }

    #[test]
    fn empty_stats() {
        let stats = SurveyStats::from_results(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.average, 0.0);
        assert!(stats.recent.is_empty());
    }
}
