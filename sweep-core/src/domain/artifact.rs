use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Suffix reserved for in-flight outputs. Files carrying it are never read
/// by downstream consumers.
pub const TEMP_SUFFIX: &str = ".tmp";

// ===== Artifact State =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ArtifactState {
    Absent,
    Invalid { reason: InvalidReason },
    Valid { size_bytes: u64 },
}

impl ArtifactState {
    pub fn is_valid(&self) -> bool {
        matches!(self, ArtifactState::Valid { .. })
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ArtifactState::Absent)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ArtifactState::Absent => "absent",
            ArtifactState::Invalid { .. } => "invalid",
            ArtifactState::Valid { .. } => "valid",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidReason {
    TooSmall { size_bytes: u64, min_size_bytes: u64 },
    Malformed { detail: String },
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::TooSmall {
                size_bytes,
                min_size_bytes,
            } => write!(f, "{} bytes (needs more than {})", size_bytes, min_size_bytes),
            InvalidReason::Malformed { detail } => write!(f, "malformed: {}", detail),
        }
    }
}

// ===== Naming =====

pub fn stop_events_baseline_name(trial: u32) -> String {
    format!("stop_events_baseline_{}.xml", trial)
}

pub fn stop_events_mixed_name(value: u32, trial: u32) -> String {
    format!("stop_events_{}_{}.xml", value, trial)
}

pub fn sim_output_name(prefix: &str, value: u32, trial: u32, city: &str) -> String {
    format!("{}_{}_{}_{}_sim_output.xml", prefix, value, trial, city)
}

pub fn trips_name(value: u32, trial: u32) -> String {
    format!("trips_{}_{}.xml", value, trial)
}

pub fn routes_name(value: u32, trial: u32) -> String {
    format!("routes_{}_{}.rou.xml", value, trial)
}

/// Matrix variant file name, keeping the template's extension.
pub fn matrix_variant_name(value: u32, template: &Path) -> String {
    match template.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("od_matrix_{}.{}", value, ext),
        None => format!("od_matrix_{}", value),
    }
}

/// `foo/bar.xml` -> `foo/bar.xml.tmp`
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    final_path.with_file_name(name)
}

pub fn is_temp_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(TEMP_SUFFIX))
        .unwrap_or(false)
}

/// Simulation-directory artifact recognised by file name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimArtifactName {
    BaselineStopEvents { trial: u32 },
    MixedStopEvents { value: u32, trial: u32 },
    SimOutput { value: u32, trial: u32 },
}

impl SimArtifactName {
    pub fn parse(file_name: &str, prefix: &str, city: &str) -> Option<Self> {
        if let Some(rest) = file_name
            .strip_prefix("stop_events_")
            .and_then(|r| r.strip_suffix(".xml"))
        {
            if let Some(trial) = rest.strip_prefix("baseline_") {
                return trial
                    .parse()
                    .ok()
                    .map(|trial| SimArtifactName::BaselineStopEvents { trial });
            }
            let (value, trial) = parse_value_trial(rest)?;
            return Some(SimArtifactName::MixedStopEvents { value, trial });
        }

        let suffix = format!("_{}_sim_output.xml", city);
        let rest = file_name
            .strip_prefix(prefix)
            .and_then(|r| r.strip_prefix('_'))
            .and_then(|r| r.strip_suffix(suffix.as_str()))?;
        let (value, trial) = parse_value_trial(rest)?;
        Some(SimArtifactName::SimOutput { value, trial })
    }
}

fn parse_value_trial(s: &str) -> Option<(u32, u32)> {
    let (value, trial) = s.split_once('_')?;
    Some((value.parse().ok()?, trial.parse().ok()?))
}
