use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use sweep_core::{temp_path_for, CampaignConfig, CommandSpec, StageError, Task, TaskKind};

use crate::tool::{Bindings, ToolInvocation};
use crate::validator::ArtifactSpec;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    MatrixVariant,
    TripGeneration,
    RouteAssignment,
    BaselineSimulation,
    MixedSimulation,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::MatrixVariant => "matrix_variant",
            StageKind::TripGeneration => "trip_generation",
            StageKind::RouteAssignment => "route_assignment",
            StageKind::BaselineSimulation => "baseline_simulation",
            StageKind::MixedSimulation => "mixed_simulation",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An expected output together with the placeholder its temp path is bound to.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub binding: &'static str,
    pub artifact: ArtifactSpec,
}

impl StageOutput {
    pub fn temp_path(&self) -> PathBuf {
        temp_path_for(&self.artifact.path)
    }
}

/// One external tool call within a task's pipeline.
#[derive(Debug, Clone)]
pub struct Stage {
    pub kind: StageKind,
    pub command: CommandSpec,
    pub bindings: Bindings,
    /// Inputs that must exist before the tool is started.
    pub prerequisites: Vec<PathBuf>,
    pub outputs: Vec<StageOutput>,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Render the command with every output bound to its temp path.
    pub fn invocation(&self) -> Result<ToolInvocation, StageError> {
        let mut bindings = self.bindings.clone();
        let mut temps = Vec::with_capacity(self.outputs.len());
        for output in &self.outputs {
            let temp = output.temp_path();
            bindings.insert(output.binding, temp.display().to_string());
            temps.push(temp);
        }
        ToolInvocation::render(self.name(), &self.command, &bindings, temps)
    }
}

/// Builds the fixed stage list of each task kind from the campaign config.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    config: Arc<CampaignConfig>,
}

impl PipelineBuilder {
    pub fn new(config: Arc<CampaignConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    /// Shared per-value matrix, produced once before any trial at `value`.
    pub fn matrix_variant(&self, value: u32) -> ArtifactSpec {
        ArtifactSpec::new(
            self.config.matrix_variant_path(value),
            self.config.thresholds.matrix,
        )
    }

    /// Baseline: one simulation stage. Mixed: trips, routes, simulation;
    /// the matrix variant is a prerequisite rather than a per-trial stage.
    pub fn stages_for(&self, task: &Task) -> Vec<Stage> {
        match (task.kind, task.traffic_value) {
            (TaskKind::Mixed, Some(value)) => vec![
                self.trip_generation(task, value),
                self.route_assignment(task, value),
                self.mixed_simulation(task, value),
            ],
            _ => vec![self.baseline_simulation(task)],
        }
    }

    fn common_bindings(&self, task: &Task) -> Bindings {
        let paths = &self.config.paths;
        let mut bindings = Bindings::new();
        bindings.insert("net", paths.network.display().to_string());
        bindings.insert("taz", paths.taz.display().to_string());
        bindings.insert("pt_routes", paths.pt_routes.display().to_string());
        bindings.insert("additionals", paths.additionals_arg());
        bindings.insert("begin", self.config.window.begin.to_string());
        bindings.insert("end", self.config.window.end.to_string());
        bindings.insert("seed", task.seed.to_string());
        bindings
    }

    fn simulation_inputs(&self) -> Vec<PathBuf> {
        let paths = &self.config.paths;
        let mut inputs = vec![paths.network.clone(), paths.pt_routes.clone()];
        inputs.extend(paths.pt_additionals.iter().cloned());
        inputs
    }

    fn trip_generation(&self, task: &Task, value: u32) -> Stage {
        let matrix = self.config.matrix_variant_path(value);
        let mut bindings = self.common_bindings(task);
        bindings.insert("matrix", matrix.display().to_string());

        Stage {
            kind: StageKind::TripGeneration,
            command: self.config.tools.trip_generation.clone(),
            bindings,
            prerequisites: vec![matrix, self.config.paths.taz.clone()],
            outputs: vec![StageOutput {
                binding: "output",
                artifact: ArtifactSpec::new(
                    self.config.trips_path(value, task.trial),
                    self.config.thresholds.trips,
                ),
            }],
        }
    }

    fn route_assignment(&self, task: &Task, value: u32) -> Stage {
        let trips = self.config.trips_path(value, task.trial);
        let mut bindings = self.common_bindings(task);
        bindings.insert("trips", trips.display().to_string());

        Stage {
            kind: StageKind::RouteAssignment,
            command: self.config.tools.route_assignment.clone(),
            bindings,
            prerequisites: vec![trips, self.config.paths.network.clone()],
            outputs: vec![StageOutput {
                binding: "output",
                artifact: ArtifactSpec::new(
                    self.config.routes_path(value, task.trial),
                    self.config.thresholds.routes,
                ),
            }],
        }
    }

    fn mixed_simulation(&self, task: &Task, value: u32) -> Stage {
        let routes = self.config.routes_path(value, task.trial);
        let mut bindings = self.common_bindings(task);
        bindings.insert("routes", routes.display().to_string());

        let mut prerequisites = self.simulation_inputs();
        prerequisites.push(routes);

        Stage {
            kind: StageKind::MixedSimulation,
            command: self.config.tools.mixed_simulation.clone(),
            bindings,
            prerequisites,
            outputs: vec![
                StageOutput {
                    binding: "tripinfo_output",
                    artifact: ArtifactSpec::new(
                        self.config.sim_output_path(value, task.trial),
                        self.config.thresholds.sim_output,
                    ),
                },
                StageOutput {
                    binding: "stop_output",
                    artifact: ArtifactSpec::new(
                        self.config.mixed_stop_events_path(value, task.trial),
                        self.config.thresholds.mixed_stop_events,
                    ),
                },
            ],
        }
    }

    fn baseline_simulation(&self, task: &Task) -> Stage {
        Stage {
            kind: StageKind::BaselineSimulation,
            command: self.config.tools.baseline_simulation.clone(),
            bindings: self.common_bindings(task),
            prerequisites: self.simulation_inputs(),
            outputs: vec![StageOutput {
                binding: "stop_output",
                artifact: ArtifactSpec::new(
                    self.config.baseline_stop_events_path(task.trial),
                    self.config.thresholds.baseline_stop_events,
                ),
            }],
        }
    }
}
