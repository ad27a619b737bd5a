// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::AlgorithmKind;

/// Command-line arguments for `cloudsched`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cloudsched",
    version,
    about = "Simulate budget- and deadline-constrained workflows on leased cloud VMs.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the simulation config (TOML).
    #[arg(long, value_name = "PATH", default_value = "Cloudsched.toml")]
    pub config: String,

    /// Override `[simulation].seed`.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Override `[simulation].algorithm`.
    #[arg(long, value_enum, value_name = "NAME")]
    pub algorithm: Option<AlgorithmKind>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CLOUDSCHED_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the workload, but don't simulate.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
