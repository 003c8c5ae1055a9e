//! Aggregation of item results into a run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;
use uuid::Uuid;

use crate::models::{ItemKey, ItemResult, Outcome};
use crate::worker_pool::REASON_CANCELLED;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl LanguageCounts {
    fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEntry {
    pub post_id: i64,
    pub lang: String,
    pub reason: String,
}

/// Outcome of one run, as returned to the CMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Planned entries
    pub total: usize,
    pub created_count: usize,
    pub updated_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub per_language_counts: BTreeMap<String, LanguageCounts>,
    /// Sorted by post id, then language code
    pub failures: Vec<FailureEntry>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn empty(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            total: 0,
            created_count: 0,
            updated_count: 0,
            skipped_count: 0,
            failed_count: 0,
            per_language_counts: BTreeMap::new(),
            failures: Vec::new(),
            cancelled: false,
            started_at,
            finished_at: started_at,
        }
    }

    /// Sum of the four outcome counts; equals `total` for a finished run.
    pub fn accounted(&self) -> usize {
        self.created_count + self.updated_count + self.skipped_count + self.failed_count
    }

    fn record(&mut self, result: &ItemResult) {
        match result.outcome {
            Outcome::Created => self.created_count += 1,
            Outcome::Updated => self.updated_count += 1,
            Outcome::Skipped => self.skipped_count += 1,
            Outcome::Failed => {
                self.failed_count += 1;
                self.failures.push(FailureEntry {
                    post_id: result.post_id,
                    lang: result.language_code.clone(),
                    reason: result.reason.clone().unwrap_or_default(),
                });
            }
        }
        self.per_language_counts
            .entry(result.language_code.clone())
            .or_default()
            .add(result.outcome);
    }
}

/// Fold a complete set of results into a summary. Each result counts once.
pub fn summarize<'a, I>(results: I) -> RunSummary
where
    I: IntoIterator<Item = &'a ItemResult>,
{
    let now = Utc::now();
    let mut summary = RunSummary::empty(Uuid::new_v4(), now);
    for result in results {
        summary.total += 1;
        summary.record(result);
    }
    summary.failures.sort_by(|a, b| (a.post_id, &a.lang).cmp(&(b.post_id, &b.lang)));
    summary
}

/// Accumulates results for a known set of planned keys.
#[derive(Debug)]
pub struct Reporter {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    planned: BTreeSet<ItemKey>,
    results: BTreeMap<ItemKey, ItemResult>,
}

impl Reporter {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>, planned: impl IntoIterator<Item = ItemKey>) -> Self {
        Self {
            run_id,
            started_at,
            planned: planned.into_iter().collect(),
            results: BTreeMap::new(),
        }
    }

    /// Record one result. Returns false if it was ignored as unplanned or
    /// as a duplicate of a key already reported.
    pub fn record(&mut self, result: ItemResult) -> bool {
        let key = result.key();
        if !self.planned.contains(&key) {
            warn!(run_id = %self.run_id, "Ignoring result for unplanned {}", key);
            return false;
        }
        if self.results.contains_key(&key) {
            warn!(run_id = %self.run_id, "Ignoring duplicate result for {}", key);
            return false;
        }
        self.results.insert(key, result);
        true
    }

    /// Close the run. Planned keys with no result count as skipped.
    pub fn finish(mut self, cancelled: bool) -> RunSummary {
        let missing: Vec<ItemKey> = self
            .planned
            .iter()
            .filter(|key| !self.results.contains_key(*key))
            .cloned()
            .collect();
        if !missing.is_empty() {
            warn!(run_id = %self.run_id, "{} planned items never reported, marking skipped", missing.len());
        }
        for key in missing {
            let result = ItemResult::skipped(&key, REASON_CANCELLED);
            self.results.insert(key, result);
        }

        let mut summary = summarize(self.results.values());
        summary.run_id = self.run_id;
        summary.started_at = self.started_at;
        summary.finished_at = Utc::now();
        summary.cancelled = cancelled;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(post_id: i64, lang: &str) -> ItemKey {
        ItemKey::new(post_id, lang)
    }

    fn reporter(keys: &[(i64, &str)]) -> Reporter {
        Reporter::new(
            Uuid::new_v4(),
            Utc::now(),
            keys.iter().map(|(id, lang)| key(*id, lang)),
        )
    }

    // ==================== summarize ====================

    #[test]
    fn test_summarize_counts_each_outcome() {
        let results = vec![
            ItemResult::created(&key(1, "es")),
            ItemResult::updated(&key(1, "fr")),
            ItemResult::skipped(&key(2, "es"), "up to date"),
            ItemResult::failed(&key(2, "fr"), "timeout"),
        ];
        let summary = summarize(&results);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.created_count, 1);
        assert_eq!(summary.updated_count, 1);
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(summary.failed_count, 1);
        assert_eq!(summary.accounted(), summary.total);
        assert_eq!(
            summary.per_language_counts["fr"],
            LanguageCounts {
                updated: 1,
                failed: 1,
                ..Default::default()
            }
        );
        assert_eq!(
            summary.failures,
            vec![FailureEntry {
                post_id: 2,
                lang: "fr".to_string(),
                reason: "timeout".to_string(),
            }]
        );
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&Vec::<ItemResult>::new());
        assert_eq!(summary.total, 0);
        assert!(summary.per_language_counts.is_empty());
        assert!(summary.failures.is_empty());
    }

    #[test]
    fn test_failures_sorted_by_post_then_language() {
        let results = vec![
            ItemResult::failed(&key(3, "es"), "a"),
            ItemResult::failed(&key(1, "fr"), "b"),
            ItemResult::failed(&key(1, "de"), "c"),
        ];
        let order: Vec<_> = summarize(&results)
            .failures
            .into_iter()
            .map(|f| (f.post_id, f.lang))
            .collect();
        assert_eq!(
            order,
            vec![(1, "de".to_string()), (1, "fr".to_string()), (3, "es".to_string())]
        );
    }

    // ==================== Reporter ====================

    #[test]
    fn test_reporter_ignores_duplicates_and_unplanned() {
        let mut reporter = reporter(&[(1, "es"), (1, "fr")]);

        assert!(reporter.record(ItemResult::created(&key(1, "es"))));
        assert!(!reporter.record(ItemResult::failed(&key(1, "es"), "late duplicate")));
        assert!(!reporter.record(ItemResult::created(&key(9, "es"))));

        let summary = reporter.finish(false);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.created_count, 1);
        assert_eq!(summary.failed_count, 0);
    }

    #[test]
    fn test_unreported_keys_become_cancelled_skips() {
        let mut reporter = reporter(&[(1, "es"), (2, "es"), (3, "es")]);
        reporter.record(ItemResult::updated(&key(2, "es")));

        let summary = reporter.finish(true);
        assert!(summary.cancelled);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.updated_count, 1);
        assert_eq!(summary.skipped_count, 2);
        assert_eq!(summary.accounted(), summary.total);
    }

    #[test]
    fn test_finish_keeps_run_identity() {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let summary = Reporter::new(run_id, started_at, Vec::<ItemKey>::new()).finish(false);
        assert_eq!(summary.run_id, run_id);
        assert_eq!(summary.started_at, started_at);
        assert!(summary.finished_at >= started_at);
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let mut reporter = reporter(&[(4, "fr")]);
        reporter.record(ItemResult::failed(&key(4, "fr"), "store write failed: disk full"));
        let json = serde_json::to_value(reporter.finish(false)).unwrap();

        assert_eq!(json["failedCount"], 1);
        assert_eq!(json["perLanguageCounts"]["fr"]["failed"], 1);
        assert_eq!(json["failures"][0]["postId"], 4);
        assert_eq!(json["failures"][0]["lang"], "fr");
        assert!(json["runId"].is_string());
        assert!(json["startedAt"].is_string());
    }
}
