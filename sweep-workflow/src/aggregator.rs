use chrono::{DateTime, Utc};
use std::collections::HashMap;
use sweep_core::{CampaignReport, RunResult, TaskId};
use uuid::Uuid;

/// Collects terminal results as workers finish. Later records for the same
/// task replace earlier ones, so every task appears exactly once.
#[derive(Debug, Default)]
pub struct FailureAggregator {
    results: HashMap<TaskId, RunResult>,
}

impl FailureAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: RunResult) {
        if !result.is_success() {
            tracing::warn!(
                "Recorded failure of {}: {}",
                result.task_id,
                result.error_detail.as_deref().unwrap_or("unknown error")
            );
        }
        if let Some(previous) = self.results.insert(result.task_id.clone(), result) {
            tracing::debug!("Replaced earlier result for {}", previous.task_id);
        }
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = RunResult>) {
        for result in results {
            self.record(result);
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn failed_count(&self) -> usize {
        self.results.values().filter(|r| !r.is_success()).count()
    }

    /// Build the report with results in generation order (baseline first,
    /// then by traffic value and trial).
    pub fn finish(
        self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        max_jobs: usize,
        peak_running: usize,
    ) -> CampaignReport {
        let mut results: Vec<RunResult> = self.results.into_values().collect();
        results.sort_by_key(|r| (r.task.kind, r.task.traffic_value, r.task.trial));

        CampaignReport {
            run_id,
            started_at,
            completed_at: Utc::now(),
            max_jobs,
            peak_running,
            results,
        }
    }
}
