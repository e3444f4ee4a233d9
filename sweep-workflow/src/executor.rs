use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sweep_core::{
    ArtifactState, CampaignConfig, InvalidReason, RunResult, StageError, Task, TaskId, TaskKind,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{PipelineBuilder, Stage, StageKind};
use crate::publisher;
use crate::tool::{ToolInvocation, ToolOutput, ToolRunner};
use crate::validator::{self, ArtifactSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Outputs were already valid; no tool was invoked.
    Skipped,
    /// The tool ran and its outputs were published.
    Ran,
}

/// Runs a task's stages in order inside one worker slot.
pub struct StageExecutor {
    pipeline: PipelineBuilder,
    runner: Arc<dyn ToolRunner>,
    task_timeout: Option<Duration>,
}

impl StageExecutor {
    pub fn new(config: Arc<CampaignConfig>, runner: Arc<dyn ToolRunner>) -> Self {
        let task_timeout = config.execution.task_timeout();
        Self {
            pipeline: PipelineBuilder::new(config),
            runner,
            task_timeout,
        }
    }

    pub fn pipeline(&self) -> &PipelineBuilder {
        &self.pipeline
    }

    /// Execute every stage of `task`. The first failing stage aborts the
    /// rest; stages published before it stay on disk for the next run.
    pub async fn run_task(&self, task: &Task, cancel: &CancellationToken) -> RunResult {
        let started = Instant::now();
        let deadline = self.task_timeout.map(|timeout| started + timeout);
        let mut stages_run = Vec::new();
        let mut stages_skipped = Vec::new();

        for stage in self.pipeline.stages_for(task) {
            match self.run_stage(&stage, deadline, cancel).await {
                Ok(StageOutcome::Skipped) => stages_skipped.push(stage.name().to_string()),
                Ok(StageOutcome::Ran) => stages_run.push(stage.name().to_string()),
                Err(err) => {
                    tracing::warn!("Task {} failed in {}: {}", task.id(), stage.name(), err);
                    return RunResult::failure(task.clone(), &err)
                        .with_stages(stages_run, stages_skipped)
                        .with_duration(elapsed_ms(started));
                }
            }
        }

        tracing::info!(
            "Task {} succeeded ({} stage(s) run, {} skipped)",
            task.id(),
            stages_run.len(),
            stages_skipped.len()
        );
        RunResult::success(task.clone(), stages_run, stages_skipped, elapsed_ms(started))
    }

    async fn run_stage(
        &self,
        stage: &Stage,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome, StageError> {
        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }

        let mut up_to_date = true;
        for output in &stage.outputs {
            let artifact = &output.artifact;
            match classify(artifact, &artifact.path).await {
                ArtifactState::Valid { .. } => {}
                ArtifactState::Absent => up_to_date = false,
                ArtifactState::Invalid { reason } => {
                    up_to_date = false;
                    tracing::warn!(
                        "Discarding invalid artifact {} ({})",
                        artifact.path.display(),
                        reason
                    );
                    validator::discard(&artifact.path)
                        .map_err(|e| StageError::io(&artifact.path, &e))?;
                }
            }
        }

        if up_to_date {
            tracing::info!("Skipping {}: outputs already valid", stage.name());
            return Ok(StageOutcome::Skipped);
        }

        for input in &stage.prerequisites {
            if !input.exists() {
                return Err(StageError::PrerequisiteMissing {
                    path: input.clone(),
                });
            }
        }

        let mut temps = Vec::with_capacity(stage.outputs.len());
        for output in &stage.outputs {
            temps.push(publisher::prepare(&output.artifact.path)?);
        }

        let invocation = stage.invocation()?;
        tracing::debug!("Running {}: {}", stage.name(), invocation.command_line());

        let output = match self.invoke(&invocation, deadline, cancel).await {
            Ok(output) => output,
            Err(err) => {
                publisher::discard_temps(&temps);
                return Err(err);
            }
        };

        if !output.is_success() {
            publisher::discard_temps(&temps);
            if !output.stderr_tail.is_empty() {
                tracing::warn!("{} stderr: {}", stage.name(), output.stderr_tail);
            }
            return Err(StageError::ToolInvocationFailure {
                stage: stage.name().to_string(),
                code: output.code,
                stderr_tail: output.stderr_tail,
            });
        }

        // Every output must validate before any of them is published.
        for (output, temp) in stage.outputs.iter().zip(&temps) {
            let state = classify(&output.artifact, temp).await;
            if let Some(err) = post_run_error(state, &output.artifact.path) {
                publisher::discard_temps(&temps);
                return Err(err);
            }
        }

        for (output, temp) in stage.outputs.iter().zip(&temps) {
            publisher::publish(temp, &output.artifact.path)?;
        }

        Ok(StageOutcome::Ran)
    }

    async fn invoke(
        &self,
        invocation: &ToolInvocation,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, StageError> {
        let timed_out = || StageError::ToolTimeout {
            stage: invocation.stage.clone(),
            timeout_secs: self.task_timeout.map(|t| t.as_secs()).unwrap_or_default(),
        };
        // An earlier stage may have used up the budget; never start the tool then.
        if deadline.is_some_and(|deadline| deadline <= Instant::now()) {
            return Err(timed_out());
        }

        let run = self.runner.run(invocation);
        let bounded = async {
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, run)
                    .await
                    .map_err(|_| timed_out())?,
                None => run.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StageError::Cancelled),
            result = bounded => result,
        }
    }

    /// Materialize the matrix for one traffic value from the template.
    /// Runs outside the worker pool, once per value.
    pub async fn prepare_matrix_variant(&self, value: u32) -> Result<StageOutcome, StageError> {
        let artifact = self.pipeline.matrix_variant(value);
        match classify(&artifact, &artifact.path).await {
            ArtifactState::Valid { .. } => {
                tracing::info!("Matrix variant for {} already valid", value);
                return Ok(StageOutcome::Skipped);
            }
            ArtifactState::Absent => {}
            ArtifactState::Invalid { reason } => {
                tracing::warn!(
                    "Discarding invalid matrix variant {} ({})",
                    artifact.path.display(),
                    reason
                );
                validator::discard(&artifact.path)
                    .map_err(|e| StageError::io(&artifact.path, &e))?;
            }
        }

        let config = self.pipeline.config();
        let template_path = &config.paths.matrix_template;
        let template = match tokio::fs::read_to_string(template_path).await {
            Ok(template) => template,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StageError::PrerequisiteMissing {
                    path: template_path.clone(),
                })
            }
            Err(e) => return Err(StageError::io(template_path, &e)),
        };

        // Without the token every value would get the same demand.
        let placeholder = config.matrix.placeholder.as_str();
        if !template.contains(placeholder) {
            return Err(StageError::Template {
                stage: StageKind::MatrixVariant.name().to_string(),
                placeholder: placeholder.to_string(),
            });
        }
        let content = template.replace(placeholder, &value.to_string());

        let temp = publisher::prepare(&artifact.path)?;
        publisher::write_synced(&temp, content.as_bytes()).map_err(|e| StageError::io(&temp, &e))?;

        let state = classify(&artifact, &temp).await;
        if let Some(err) = post_run_error(state, &artifact.path) {
            publisher::discard_temps([&temp]);
            return Err(err);
        }
        publisher::publish(&temp, &artifact.path)?;

        tracing::info!("Prepared matrix variant {}", artifact.path.display());
        Ok(StageOutcome::Ran)
    }

    /// Classify every output of `task` without touching anything.
    pub async fn inspect(&self, task: &Task) -> TaskInspection {
        let mut stages = Vec::new();

        if let (TaskKind::Mixed, Some(value)) = (task.kind, task.traffic_value) {
            let artifact = self.pipeline.matrix_variant(value);
            stages.push(StageInspection {
                stage: StageKind::MatrixVariant,
                artifacts: vec![ArtifactInspection {
                    state: classify(&artifact, &artifact.path).await,
                    path: artifact.path,
                }],
            });
        }

        for stage in self.pipeline.stages_for(task) {
            let mut artifacts = Vec::with_capacity(stage.outputs.len());
            for output in stage.outputs {
                artifacts.push(ArtifactInspection {
                    state: classify(&output.artifact, &output.artifact.path).await,
                    path: output.artifact.path,
                });
            }
            stages.push(StageInspection {
                stage: stage.kind,
                artifacts,
            });
        }

        TaskInspection {
            task_id: task.id(),
            task: task.clone(),
            stages,
        }
    }
}

async fn classify(artifact: &ArtifactSpec, path: &Path) -> ArtifactState {
    let artifact = artifact.clone();
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || artifact.validate_at(&path))
        .await
        .unwrap_or_else(|e| ArtifactState::Invalid {
            reason: InvalidReason::Malformed {
                detail: format!("validation did not complete: {}", e),
            },
        })
}

fn post_run_error(state: ArtifactState, final_path: &Path) -> Option<StageError> {
    let path = final_path.to_path_buf();
    match state {
        ArtifactState::Valid { .. } => None,
        ArtifactState::Absent => Some(StageError::ArtifactMissing { path }),
        ArtifactState::Invalid {
            reason:
                InvalidReason::TooSmall {
                    size_bytes,
                    min_size_bytes,
                },
        } => Some(StageError::ArtifactTooSmall {
            path,
            size: size_bytes,
            min_size_bytes,
        }),
        ArtifactState::Invalid {
            reason: InvalidReason::Malformed { detail },
        } => Some(StageError::ArtifactMalformed {
            path,
            reason: detail,
        }),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// ===== Dry-run inspection =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactInspection {
    pub path: PathBuf,
    pub state: ArtifactState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageInspection {
    pub stage: StageKind,
    pub artifacts: Vec<ArtifactInspection>,
}

impl StageInspection {
    pub fn is_up_to_date(&self) -> bool {
        self.artifacts.iter().all(|a| a.state.is_valid())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskInspection {
    pub task_id: TaskId,
    pub task: Task,
    pub stages: Vec<StageInspection>,
}

impl TaskInspection {
    pub fn is_complete(&self) -> bool {
        self.stages.iter().all(StageInspection::is_up_to_date)
    }

    /// Stages a rerun would execute.
    pub fn pending_stages(&self) -> Vec<StageKind> {
        self.stages
            .iter()
            .filter(|s| !s.is_up_to_date())
            .map(|s| s.stage)
            .collect()
    }
}
