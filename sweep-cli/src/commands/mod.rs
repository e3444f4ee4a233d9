//! Subcommand implementations

pub mod inventory;
pub mod plan;
pub mod run;
pub mod status;
