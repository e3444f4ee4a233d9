use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use sweep_core::{
    CampaignConfig, CampaignError, CampaignReport, CoreError, Result, RunResult, StageError, Task,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregator::FailureAggregator;
use crate::engine::{Scheduler, TaskEvent};
use crate::executor::{StageExecutor, TaskInspection};
use crate::generator::TaskGenerator;
use crate::publisher;
use crate::tool::ToolRunner;

/// Top-level driver: generate, prepare shared inputs, schedule, aggregate.
pub struct Campaign {
    config: Arc<CampaignConfig>,
    executor: Arc<StageExecutor>,
    scheduler: Scheduler,
    cancel: CancellationToken,
}

impl Campaign {
    pub fn new(config: Arc<CampaignConfig>, runner: Arc<dyn ToolRunner>) -> Self {
        let executor = Arc::new(StageExecutor::new(Arc::clone(&config), runner));
        let max_jobs = config.execution.effective_max_jobs();
        let scheduler = Scheduler::new(Arc::clone(&executor), max_jobs);
        Self {
            config,
            executor,
            scheduler,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.scheduler = self.scheduler.with_cancellation(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.scheduler.subscribe()
    }

    pub fn plan(&self) -> Result<Vec<Task>> {
        TaskGenerator::new(&self.config.sweep).generate()
    }

    /// Produce each distinct traffic value's matrix once. Returns the values
    /// whose preparation failed.
    pub async fn prepare_matrix_variants(&self, tasks: &[Task]) -> BTreeMap<u32, StageError> {
        let values: BTreeSet<u32> = tasks.iter().filter_map(|t| t.traffic_value).collect();
        let mut failures = BTreeMap::new();

        for value in values {
            if self.cancel.is_cancelled() {
                failures.insert(value, StageError::Cancelled);
                continue;
            }
            if let Err(err) = self.executor.prepare_matrix_variant(value).await {
                tracing::error!("Matrix variant for {} failed: {}", value, err);
                failures.insert(value, err);
            }
        }

        failures
    }

    /// Run every task to a terminal state and write the report. A report is
    /// returned even when tasks failed; see [`Campaign::run`].
    pub async fn execute(&self) -> Result<CampaignReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let tasks = self.plan()?;
        tracing::info!("Campaign {} starting with {} task(s)", run_id, tasks.len());

        let matrix_failures = self.prepare_matrix_variants(&tasks).await;
        let (blocked, runnable): (Vec<Task>, Vec<Task>) = tasks.into_iter().partition(|task| {
            task.traffic_value
                .is_some_and(|value| matrix_failures.contains_key(&value))
        });

        let blocked: Vec<RunResult> = blocked
            .into_iter()
            .map(|task| {
                let err = match task.traffic_value.and_then(|v| matrix_failures.get(&v)) {
                    Some(StageError::Cancelled) => StageError::Cancelled,
                    _ => StageError::PrerequisiteMissing {
                        path: self
                            .config
                            .matrix_variant_path(task.traffic_value.unwrap_or_default()),
                    },
                };
                RunResult::failure(task, &err)
            })
            .collect();

        let run = self.scheduler.run_with_blocked(runnable, blocked).await;
        let mut aggregator = FailureAggregator::new();
        aggregator.extend(run.results);

        let max_jobs = self.scheduler.max_jobs();
        let report = aggregator.finish(run_id, started_at, max_jobs, run.peak_running);
        let path = self.write_report(&report)?;
        tracing::info!(
            "Campaign {} finished: {} succeeded, {} failed, report at {}",
            run_id,
            report.succeeded().count(),
            report.failed().count(),
            path.display()
        );
        Ok(report)
    }

    /// Like [`Campaign::execute`], but raises the aggregate failure when
    /// any task failed.
    pub async fn run(&self) -> std::result::Result<CampaignReport, CampaignError> {
        let report = self.execute().await?;
        report.ensure_success()?;
        Ok(report)
    }

    pub fn write_report(&self, report: &CampaignReport) -> Result<PathBuf> {
        let path = self.config.paths.report_path();
        let json = serde_json::to_vec_pretty(report)?;
        publisher::write_atomic(&path, &json).map_err(|e| CoreError::Io(e.to_string()))?;
        Ok(path)
    }

    /// Classify every task's artifacts without invoking any tool.
    pub async fn inspect(&self) -> Result<Vec<TaskInspection>> {
        let tasks = self.plan()?;
        let mut inspections = Vec::with_capacity(tasks.len());
        for task in &tasks {
            inspections.push(self.executor.inspect(task).await);
        }
        Ok(inspections)
    }
}
