use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

// ===== Task Kind =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Public transit alone, no private demand.
    Baseline,
    /// Public transit plus assigned private-vehicle routes at one traffic value.
    Mixed,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Baseline => write!(f, "baseline"),
            TaskKind::Mixed => write!(f, "mixed"),
        }
    }
}

// ===== Task Identity =====

/// Stable, human-readable task key, e.g. `baseline#3` or `mixed-1000#2`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ===== Task =====

/// One cell of the campaign grid. Immutable once generated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Task {
    pub kind: TaskKind,
    pub traffic_value: Option<u32>,
    pub trial: u32,
    pub seed: u64,
}

impl Task {
    pub fn baseline(trial: u32, base_seed: u64) -> Self {
        Self {
            kind: TaskKind::Baseline,
            traffic_value: None,
            trial,
            seed: base_seed + u64::from(trial),
        }
    }

    pub fn mixed(traffic_value: u32, trial: u32, base_seed: u64) -> Self {
        Self {
            kind: TaskKind::Mixed,
            traffic_value: Some(traffic_value),
            trial,
            seed: base_seed + u64::from(trial) + u64::from(traffic_value),
        }
    }

    pub fn id(&self) -> TaskId {
        match (self.kind, self.traffic_value) {
            (TaskKind::Mixed, Some(value)) => TaskId(format!("mixed-{}#{}", value, self.trial)),
            _ => TaskId(format!("baseline#{}", self.trial)),
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.kind == TaskKind::Baseline
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (seed {})", self.id(), self.seed)
    }
}

// ===== Task Status =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TaskStatus::Running)
    }

    /// Pending tasks may also fail directly (cancelled or missing matrix
    /// variant) without ever holding a worker slot.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Succeeded)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }

    pub fn transition(self, next: TaskStatus) -> Result<TaskStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidState(format!(
                "Cannot move task from {:?} to {:?}",
                self, next
            )))
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}
