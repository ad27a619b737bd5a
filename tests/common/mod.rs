#![allow(dead_code)]

pub use cloudsched_test_utils::builders::*;
pub use cloudsched_test_utils::init_tracing;
pub use cloudsched_test_utils::recording::{Record, Recorder};

use cloudsched::sim::Simulation;
use cloudsched::stats::SimulationReport;

/// Run `sim` with a fresh recorder attached.
pub fn run_recorded(sim: Simulation) -> (SimulationReport, Recorder) {
    init_tracing();
    let recorder = Recorder::new();
    let report = sim
        .listener(recorder.listener())
        .run()
        .expect("simulation should not abort");
    (report, recorder)
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}
