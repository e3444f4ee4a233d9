//! Layered campaign configuration loading

use anyhow::{Context as _, Result};
use config::{Config as ConfigLoader, Environment, File};
use std::path::Path;
use sweep_core::CampaignConfig;

/// Environment variables override file settings, e.g.
/// `SWEEP__EXECUTION__MAX_JOBS=8`.
pub const ENV_PREFIX: &str = "SWEEP";

/// Values given on the command line; they win over every other source.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub max_jobs: Option<usize>,
    pub task_timeout_secs: Option<u64>,
}

/// Load `path`, then `config/local.toml` if present, then the environment,
/// then `overrides`, and validate the result.
pub fn load(path: &Path, overrides: &Overrides) -> Result<CampaignConfig> {
    let loader = ConfigLoader::builder()
        .add_source(File::from(path).required(true))
        .add_source(File::with_name("config/local").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("sweep.traffic_values")
                .with_list_parse_key("paths.pt_additionals"),
        )
        .set_override_option("execution.max_jobs", overrides.max_jobs.map(|v| v as i64))?
        .set_override_option(
            "execution.task_timeout_secs",
            overrides.task_timeout_secs.map(|v| v as i64),
        )?
        .build()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    let config: CampaignConfig = loader
        .try_deserialize()
        .with_context(|| format!("Failed to parse configuration from {}", path.display()))?;

    config
        .validated()
        .with_context(|| format!("Invalid configuration in {}", path.display()))
}
