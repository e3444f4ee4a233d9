use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{Task, TaskId};
use crate::error::{CampaignError, StageError};

// ===== Run Outcome =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failure,
}

// ===== Run Result =====

/// Terminal record for one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    pub task_id: TaskId,
    pub task: Task,
    pub outcome: RunOutcome,
    pub error_kind: Option<String>,
    pub error_detail: Option<String>,
    /// Stages whose tool was actually invoked.
    pub stages_run: Vec<String>,
    /// Stages short-circuited because their outputs were already valid.
    pub stages_skipped: Vec<String>,
    pub duration_ms: u64,
}

impl RunResult {
    pub fn success(
        task: Task,
        stages_run: Vec<String>,
        stages_skipped: Vec<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            task_id: task.id(),
            task,
            outcome: RunOutcome::Success,
            error_kind: None,
            error_detail: None,
            stages_run,
            stages_skipped,
            duration_ms,
        }
    }

    pub fn failure(task: Task, error: &StageError) -> Self {
        Self {
            task_id: task.id(),
            task,
            outcome: RunOutcome::Failure,
            error_kind: Some(error.kind().to_string()),
            error_detail: Some(error.to_string()),
            stages_run: Vec::new(),
            stages_skipped: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn with_stages(mut self, stages_run: Vec<String>, stages_skipped: Vec<String>) -> Self {
        self.stages_run = stages_run;
        self.stages_skipped = stages_skipped;
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }
}

// ===== Campaign Report =====

/// Union of all terminal results; the sole campaign-level report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub max_jobs: usize,
    pub peak_running: usize,
    pub results: Vec<RunResult>,
}

impl CampaignReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn failed_ids(&self) -> Vec<TaskId> {
        self.failed().map(|r| r.task_id.clone()).collect()
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(RunResult::is_success)
    }

    /// Number of external tool invocations across the campaign.
    pub fn tool_invocations(&self) -> usize {
        self.results.iter().map(|r| r.stages_run.len()).sum()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }

    /// Raises the aggregate failure when any task failed. Succeeded
    /// artifacts stay on disk either way.
    pub fn ensure_success(&self) -> Result<(), CampaignError> {
        let tasks: Vec<String> = self.failed().map(|r| r.task_id.to_string()).collect();
        if tasks.is_empty() {
            Ok(())
        } else {
            Err(CampaignError::AggregateFailure {
                failed: tasks.len(),
                total: self.total(),
                tasks,
            })
        }
    }
}
