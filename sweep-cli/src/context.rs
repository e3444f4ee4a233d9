//! CLI execution context

use anyhow::Result;
use std::sync::Arc;
use sweep_core::CampaignConfig;

use crate::cli::Cli;
use crate::config::{self, Overrides};
use crate::output::OutputWriter;

/// Execution context for CLI commands
pub struct Context {
    /// Validated campaign configuration
    pub config: Arc<CampaignConfig>,

    pub output: OutputWriter,

    /// Show per-task error details
    pub verbose: bool,
}

impl Context {
    pub fn new(cli: &Cli, overrides: &Overrides) -> Result<Self> {
        let config = config::load(&cli.config, overrides)?;
        tracing::debug!("Loaded configuration from {}", cli.config.display());

        Ok(Self {
            config: Arc::new(config),
            output: OutputWriter::new(cli.output, cli.no_color),
            verbose: cli.verbose > 0,
        })
    }
}
