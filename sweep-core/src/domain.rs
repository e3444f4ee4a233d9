pub mod artifact;
pub mod config;
pub mod run;
pub mod task;

pub use artifact::*;
pub use config::*;
pub use run::*;
pub use task::*;
