use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(err: validator::ValidationErrors) -> Self {
        CoreError::Validation(err.to_string())
    }
}

/// Failure of a single pipeline stage. Contained to the owning task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("{stage}: tool exited with {}", exit_label(.code))]
    ToolInvocationFailure {
        stage: String,
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("{stage}: failed to start `{program}`: {reason}")]
    ToolSpawn {
        stage: String,
        program: String,
        reason: String,
    },

    #[error("{stage}: task exceeded its {timeout_secs}s time budget")]
    ToolTimeout { stage: String, timeout_secs: u64 },

    #[error("artifact missing after tool run: {}", .path.display())]
    ArtifactMissing { path: PathBuf },

    #[error(
        "artifact too small: {} is {size} bytes, needs more than {min_size_bytes}",
        .path.display()
    )]
    ArtifactTooSmall {
        path: PathBuf,
        size: u64,
        min_size_bytes: u64,
    },

    #[error("artifact malformed: {}: {reason}", .path.display())]
    ArtifactMalformed { path: PathBuf, reason: String },

    #[error("prerequisite missing: {}", .path.display())]
    PrerequisiteMissing { path: PathBuf },

    #[error("{stage}: unresolved placeholder `{placeholder}`")]
    Template { stage: String, placeholder: String },

    #[error("cancelled before completion")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error on {}: {reason}", .path.display())]
    Io { path: PathBuf, reason: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    }
}

impl StageError {
    /// Stable label used in campaign reports.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::ToolInvocationFailure { .. } => "tool_invocation_failure",
            StageError::ToolSpawn { .. } => "tool_spawn",
            StageError::ToolTimeout { .. } => "tool_timeout",
            StageError::ArtifactMissing { .. } => "artifact_missing",
            StageError::ArtifactTooSmall { .. } => "artifact_too_small",
            StageError::ArtifactMalformed { .. } => "artifact_malformed",
            StageError::PrerequisiteMissing { .. } => "prerequisite_missing",
            StageError::Template { .. } => "template",
            StageError::Cancelled => "cancelled",
            StageError::Internal(_) => "internal",
            StageError::Io { .. } => "io",
        }
    }

    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        StageError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

/// Campaign-level outcome raised once the grid has drained.
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("{failed} of {total} tasks failed: {}", .tasks.join(", "))]
    AggregateFailure {
        failed: usize,
        total: usize,
        tasks: Vec<String>,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}
