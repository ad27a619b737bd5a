// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Simulated job failures are *not* errors: they are ordinary job results
//! handled by the workflow engine. Everything here aborts the run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Task not found in DAG '{dag}': {task}")]
    TaskNotFound { dag: String, task: String },

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    /// Invalid state transition (double launch, submit to a terminated VM, ...).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("No budget allocated for task '{task}' of DAG '{dag}'")]
    MissingBudget { dag: String, task: String },

    #[error("No runtime estimate for task '{task}' of DAG '{dag}'")]
    MissingEstimate { dag: String, task: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        SimError::InvalidState(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SimError>;
