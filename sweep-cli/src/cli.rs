//! Command-line argument definitions

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::run::RunArgs;
use crate::commands::status::StatusArgs;
use crate::output::OutputFormat;

/// Drive a traffic-intensity sweep of transit simulations
#[derive(Debug, Parser)]
#[command(name = "transit-sweep", version, about, long_about = None)]
pub struct Cli {
    /// Campaign configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "SWEEP_CONFIG",
        default_value = "config/campaign.toml"
    )]
    pub config: PathBuf,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the tasks the campaign would run
    Plan,

    /// Show which stages a rerun would execute, without running tools
    Status(StatusArgs),

    /// Execute the campaign
    Run(RunArgs),

    /// List published simulation outputs grouped by traffic value
    Inventory,
}
