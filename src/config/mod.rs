// src/config/mod.rs

//! Configuration loading and validation for cloudsched.
//!
//! - `model.rs` maps the TOML sections onto serde structs.
//! - `loader.rs` reads a file from disk.
//! - `validate.rs` checks the raw sections and builds the environment,
//!   VM behaviour and workflow DAGs.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, FileConfig, RawConfigFile, SimulationSection, StorageSection, TaskConfig,
    VariationSection, VmTypeConfig, WorkflowConfig,
};
