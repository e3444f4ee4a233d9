//! Discovery of published simulation artifacts, grouped by traffic value,
//! the way the downstream analysis finds its inputs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::PathBuf;
use sweep_core::{is_temp_path, CampaignConfig, Result, SimArtifactName};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValueInventory {
    pub traffic_value: u32,
    pub sim_output_trials: BTreeSet<u32>,
    pub stop_event_trials: BTreeSet<u32>,
}

impl ValueInventory {
    fn new(traffic_value: u32) -> Self {
        Self {
            traffic_value,
            ..Self::default()
        }
    }

    /// Trials for which both simulation outputs are present.
    pub fn complete_trials(&self) -> usize {
        self.sim_output_trials
            .intersection(&self.stop_event_trials)
            .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputInventory {
    pub sim_dir: PathBuf,
    pub expected_trials: u32,
    pub expected_baseline_trials: u32,
    pub baseline_trials: BTreeSet<u32>,
    pub values: BTreeMap<u32, ValueInventory>,
    /// Leftovers of interrupted runs; removed by the next run.
    pub stray_temps: Vec<PathBuf>,
    pub unrecognized: usize,
}

impl OutputInventory {
    pub fn scan(config: &CampaignConfig) -> Result<Self> {
        let sim_dir = config.paths.sim_dir();
        let mut inventory = Self {
            sim_dir: sim_dir.clone(),
            expected_trials: config.sweep.trials_per_value,
            expected_baseline_trials: config.sweep.baseline_trials,
            baseline_trials: BTreeSet::new(),
            values: config
                .sweep
                .traffic_values
                .iter()
                .map(|&v| (v, ValueInventory::new(v)))
                .collect(),
            stray_temps: Vec::new(),
            unrecognized: 0,
        };

        let entries = match fs::read_dir(&sim_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Simulation directory {} does not exist yet", sim_dir.display());
                return Ok(inventory);
            }
            Err(e) => return Err(e.into()),
        };

        let prefix = config.naming.prefix.as_str();
        let city = config.naming.city.as_str();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if is_temp_path(&path) {
                inventory.stray_temps.push(path);
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                inventory.unrecognized += 1;
                continue;
            };

            match SimArtifactName::parse(name, prefix, city) {
                Some(SimArtifactName::BaselineStopEvents { trial }) => {
                    inventory.baseline_trials.insert(trial);
                }
                Some(SimArtifactName::MixedStopEvents { value, trial }) => {
                    inventory
                        .values
                        .entry(value)
                        .or_insert_with(|| ValueInventory::new(value))
                        .stop_event_trials
                        .insert(trial);
                }
                Some(SimArtifactName::SimOutput { value, trial }) => {
                    inventory
                        .values
                        .entry(value)
                        .or_insert_with(|| ValueInventory::new(value))
                        .sim_output_trials
                        .insert(trial);
                }
                None => inventory.unrecognized += 1,
            }
        }

        inventory.stray_temps.sort();
        Ok(inventory)
    }

    /// Values with fewer complete trials than configured.
    pub fn incomplete_values(&self) -> Vec<u32> {
        self.values
            .values()
            .filter(|v| v.complete_trials() < self.expected_trials as usize)
            .map(|v| v.traffic_value)
            .collect()
    }

    pub fn baseline_complete(&self) -> bool {
        self.baseline_trials.len() >= self.expected_baseline_trials as usize
    }
}
