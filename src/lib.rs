// src/lib.rs

pub mod algorithm;
pub mod budget;
pub mod cli;
pub mod cloud;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod provisioner;
pub mod sim;
pub mod stats;
pub mod types;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::sim::Simulation;

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the config, applies CLI overrides, runs the
/// simulation to completion (or its time horizon) and prints the report.
pub fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading config '{}'", args.config))?;

    if let Some(seed) = args.seed {
        cfg.simulation.seed = seed;
    }
    if let Some(algorithm) = args.algorithm {
        cfg.simulation.algorithm = algorithm;
    }

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    info!(
        config = %args.config,
        algorithm = %cfg.simulation.algorithm,
        seed = cfg.simulation.seed,
        "starting simulation"
    );
    let report = Simulation::from_config(&cfg).run()?;
    print!("{report}");
    Ok(())
}

/// Print the validated workload without simulating it.
fn print_dry_run(cfg: &ConfigFile) {
    let sim = &cfg.simulation;
    println!("cloudsched dry-run");
    println!("  simulation.algorithm = {}", sim.algorithm);
    match sim.provisioner {
        Some(p) => println!("  simulation.provisioner = {p}"),
        None => println!("  simulation.provisioner = (algorithm default)"),
    }
    println!("  simulation.seed = {}", sim.seed);
    println!("  simulation.storage_aware = {}", sim.storage_aware);
    println!("  simulation.max_time = {}", sim.max_time);
    println!();

    let types = cfg.environment.vm_types();
    println!("vm types ({}):", types.len());
    for t in types {
        println!(
            "  - {} mips={} cores={} price={} period={}s",
            t.name, t.mips, t.cores, t.price, t.billing_period
        );
    }
    println!();

    println!("workflows ({}):", cfg.workflows.len());
    for dag in &cfg.workflows {
        println!(
            "  - {} tasks={} submit={} deadline={} budget={}",
            dag.name(),
            dag.len(),
            dag.submit_time(),
            dag.deadline(),
            dag.budget()
        );
        for task in dag.tasks() {
            if task.parents.is_empty() {
                println!("      {} size={}", task.name, task.size);
            } else {
                let parents: Vec<&str> = task
                    .parents
                    .iter()
                    .map(|p| dag.task(*p).name.as_str())
                    .collect();
                println!(
                    "      {} size={} after {:?}",
                    task.name, task.size, parents
                );
            }
        }
    }

    debug!("dry-run complete (no simulation)");
}
