pub mod aggregator;
pub mod campaign;
pub mod engine;
pub mod executor;
pub mod generator;
pub mod inventory;
pub mod pipeline;
pub mod publisher;
pub mod tool;
pub mod validator;

pub use aggregator::*;
pub use campaign::*;
pub use engine::*;
pub use executor::*;
pub use generator::*;
pub use inventory::*;
pub use pipeline::*;
pub use tool::*;
pub use validator::{
    structural_check_for, ArtifactSpec, NoStructuralCheck, StructuralCheck, XmlWellFormed,
};
