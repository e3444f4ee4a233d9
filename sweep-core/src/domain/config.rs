use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::error::{CoreError, Result};
use super::artifact::{
    matrix_variant_name, routes_name, sim_output_name, stop_events_baseline_name,
    stop_events_mixed_name, trips_name,
};

// ===== Campaign Configuration =====

/// Immutable description of one sweep campaign. Loaded once at startup and
/// shared by the generator, the executor and the scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct CampaignConfig {
    #[validate(nested)]
    pub sweep: SweepConfig,
    #[validate(nested)]
    pub execution: ExecutionConfig,
    pub paths: PathsConfig,
    #[validate(nested)]
    pub naming: NamingConfig,
    pub window: TimeWindow,
    #[validate(nested)]
    pub matrix: MatrixConfig,
    pub thresholds: ThresholdConfig,
    #[validate(nested)]
    pub tools: ToolsConfig,
}

impl CampaignConfig {
    /// Field-level validation plus the cross-field rules.
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        self.check_consistency()?;
        Ok(self)
    }

    fn check_consistency(&self) -> Result<()> {
        let values = &self.sweep.traffic_values;
        if values.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(CoreError::Validation(format!(
                "sweep.traffic_values must be strictly ascending, got {:?}",
                values
            )));
        }

        if self.sweep.task_count() == 0 {
            return Err(CoreError::Validation(
                "Campaign has no tasks: set baseline_trials or traffic_values with trials_per_value"
                    .to_string(),
            ));
        }

        if self.window.end <= self.window.begin {
            return Err(CoreError::Validation(format!(
                "window.end ({}) must be after window.begin ({})",
                self.window.end, self.window.begin
            )));
        }

        if self.execution.task_timeout_secs == Some(0) {
            return Err(CoreError::Validation(
                "execution.task_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    // ===== Artifact paths =====

    pub fn matrix_variant_path(&self, value: u32) -> PathBuf {
        self.paths
            .matrix_dir()
            .join(matrix_variant_name(value, &self.paths.matrix_template))
    }

    pub fn trips_path(&self, value: u32, trial: u32) -> PathBuf {
        self.paths.trips_dir().join(trips_name(value, trial))
    }

    pub fn routes_path(&self, value: u32, trial: u32) -> PathBuf {
        self.paths.routes_dir().join(routes_name(value, trial))
    }

    pub fn baseline_stop_events_path(&self, trial: u32) -> PathBuf {
        self.paths.sim_dir().join(stop_events_baseline_name(trial))
    }

    pub fn mixed_stop_events_path(&self, value: u32, trial: u32) -> PathBuf {
        self.paths.sim_dir().join(stop_events_mixed_name(value, trial))
    }

    pub fn sim_output_path(&self, value: u32, trial: u32) -> PathBuf {
        self.paths.sim_dir().join(sim_output_name(
            &self.naming.prefix,
            value,
            trial,
            &self.naming.city,
        ))
    }
}

// ===== Sweep =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct SweepConfig {
    /// Strictly ascending traffic intensities.
    pub traffic_values: Vec<u32>,
    pub trials_per_value: u32,
    pub baseline_trials: u32,
    pub base_seed: u64,
    /// Accept grids where two tasks derive the same seed.
    pub allow_seed_collisions: bool,
}

impl SweepConfig {
    pub fn task_count(&self) -> usize {
        self.baseline_trials as usize + self.traffic_values.len() * self.trials_per_value as usize
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            traffic_values: Vec::new(),
            trials_per_value: 10,
            baseline_trials: 10,
            base_seed: 42,
            allow_seed_collisions: false,
        }
    }
}

// ===== Execution =====

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record failures, keep scheduling, fail once the grid drains.
    #[default]
    FailAtEnd,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Concurrency cap; defaults to the host's logical processor count.
    #[validate(range(min = 1))]
    pub max_jobs: Option<usize>,
    /// Wall-clock budget for one task's whole pipeline.
    pub task_timeout_secs: Option<u64>,
    pub failure_policy: FailurePolicy,
}

impl ExecutionConfig {
    pub fn effective_max_jobs(&self) -> usize {
        self.max_jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }
}

// ===== Paths =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub output_dir: PathBuf,
    /// Directory handed to the analysis stage; defaults to `<output_dir>/sim`.
    pub sim_dir: Option<PathBuf>,
    pub network: PathBuf,
    pub taz: PathBuf,
    pub matrix_template: PathBuf,
    pub pt_routes: PathBuf,
    pub pt_additionals: Vec<PathBuf>,
    pub report: Option<PathBuf>,
}

impl PathsConfig {
    pub fn sim_dir(&self) -> PathBuf {
        self.sim_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join("sim"))
    }

    pub fn matrix_dir(&self) -> PathBuf {
        self.output_dir.join("matrices")
    }

    pub fn trips_dir(&self) -> PathBuf {
        self.output_dir.join("trips")
    }

    pub fn routes_dir(&self) -> PathBuf {
        self.output_dir.join("routes")
    }

    pub fn report_path(&self) -> PathBuf {
        self.report
            .clone()
            .unwrap_or_else(|| self.output_dir.join("campaign_report.json"))
    }

    /// Comma-joined list, as the simulator expects it.
    pub fn additionals_arg(&self) -> String {
        join_paths(&self.pt_additionals)
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            sim_dir: None,
            network: PathBuf::from("inputs/network.net.xml"),
            taz: PathBuf::from("inputs/zones.taz.xml"),
            matrix_template: PathBuf::from("inputs/od_template.od"),
            pt_routes: PathBuf::from("inputs/pt_routes.rou.xml"),
            pt_additionals: vec![PathBuf::from("inputs/pt_stops.add.xml")],
            report: None,
        }
    }
}

pub fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

// ===== Naming =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct NamingConfig {
    #[validate(length(min = 1))]
    pub prefix: String,
    #[validate(length(min = 1))]
    pub city: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            prefix: "4".to_string(),
            city: String::new(),
        }
    }
}

// ===== Simulation window =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeWindow {
    pub begin: u64,
    pub end: u64,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self { begin: 0, end: 3600 }
    }
}

// ===== Matrix variants =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct MatrixConfig {
    /// Token in the template replaced by the traffic value.
    #[validate(length(min = 1))]
    pub placeholder: String,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            placeholder: "{{TRAFFIC_VALUE}}".to_string(),
        }
    }
}

// ===== Artifact thresholds =====

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StructureCheckKind {
    #[default]
    Xml,
    None,
}

/// Validity rule for one artifact kind: strictly more than `min_size_bytes`
/// and passing the structural check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ArtifactPolicy {
    pub min_size_bytes: u64,
    #[serde(default)]
    pub check: StructureCheckKind,
}

impl ArtifactPolicy {
    pub const fn xml(min_size_bytes: u64) -> Self {
        Self {
            min_size_bytes,
            check: StructureCheckKind::Xml,
        }
    }

    pub const fn unchecked(min_size_bytes: u64) -> Self {
        Self {
            min_size_bytes,
            check: StructureCheckKind::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ThresholdConfig {
    pub matrix: ArtifactPolicy,
    pub trips: ArtifactPolicy,
    pub routes: ArtifactPolicy,
    pub baseline_stop_events: ArtifactPolicy,
    pub mixed_stop_events: ArtifactPolicy,
    pub sim_output: ArtifactPolicy,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            matrix: ArtifactPolicy::unchecked(0),
            trips: ArtifactPolicy::xml(500),
            routes: ArtifactPolicy::xml(500),
            baseline_stop_events: ArtifactPolicy::xml(500),
            mixed_stop_events: ArtifactPolicy::xml(200),
            sim_output: ArtifactPolicy::xml(1000),
        }
    }
}

// ===== External tools =====

/// Program plus argument template. Arguments may embed `{name}` tokens bound
/// per stage (`{seed}`, `{output}`, `{net}`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct CommandSpec {
    #[validate(length(min = 1))]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct ToolsConfig {
    #[validate(nested)]
    pub trip_generation: CommandSpec,
    #[validate(nested)]
    pub route_assignment: CommandSpec,
    #[validate(nested)]
    pub baseline_simulation: CommandSpec,
    #[validate(nested)]
    pub mixed_simulation: CommandSpec,
}

impl Default for ToolsConfig {
    #[rustfmt::skip]
    fn default() -> Self {
        Self {
            trip_generation: CommandSpec::new(
                "od2trips",
                &[
                    "--taz-files", "{taz}",
                    "--od-matrix-files", "{matrix}",
                    "--seed", "{seed}",
                    "--output-file", "{output}",
                ],
            ),
            route_assignment: CommandSpec::new(
                "duarouter",
                &[
                    "--net-file", "{net}",
                    "--route-files", "{trips}",
                    "--seed", "{seed}",
                    "--ignore-errors", "true",
                    "--output-file", "{output}",
                ],
            ),
            baseline_simulation: CommandSpec::new(
                "sumo",
                &[
                    "--net-file", "{net}",
                    "--additional-files", "{additionals}",
                    "--route-files", "{pt_routes}",
                    "--begin", "{begin}",
                    "--end", "{end}",
                    "--seed", "{seed}",
                    "--stop-output", "{stop_output}",
                    "--no-step-log", "true",
                ],
            ),
            mixed_simulation: CommandSpec::new(
                "sumo",
                &[
                    "--net-file", "{net}",
                    "--additional-files", "{additionals}",
                    "--route-files", "{pt_routes},{routes}",
                    "--begin", "{begin}",
                    "--end", "{end}",
                    "--seed", "{seed}",
                    "--stop-output", "{stop_output}",
                    "--tripinfo-output", "{tripinfo_output}",
                    "--no-step-log", "true",
                ],
            ),
        }
    }
}
