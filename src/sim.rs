// src/sim.rs

//! Assembles a runnable simulation from a catalog, a workload and knobs.

use std::fmt;
use std::sync::Arc;

use rand::SeedableRng;
use tracing::info;

use crate::algorithm::Algorithm;
use crate::cloud::{Environment, SimRng, VmBehaviour};
use crate::config::ConfigFile;
use crate::dag::Dag;
use crate::engine::{CoreRuntime, Runtime, SimTime};
use crate::errors::Result;
use crate::provisioner::ProvisionerKind;
use crate::stats::{SimulationListener, SimulationReport};
use crate::types::AlgorithmKind;

pub const DEFAULT_MAX_TIME: SimTime = 1e9;

/// Builder for one simulation run.
///
/// ```no_run
/// # use cloudsched::sim::Simulation;
/// # fn demo(cfg: &cloudsched::config::ConfigFile) -> cloudsched::errors::Result<()> {
/// let report = Simulation::from_config(cfg).seed(7).run()?;
/// println!("{report}");
/// # Ok(())
/// # }
/// ```
pub struct Simulation {
    environment: Environment,
    algorithm: AlgorithmKind,
    provisioner: Option<ProvisionerKind>,
    behaviour: VmBehaviour,
    seed: u64,
    max_time: SimTime,
    workflows: Vec<Arc<Dag>>,
    listeners: Vec<Box<dyn SimulationListener>>,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("algorithm", &self.algorithm)
            .field("provisioner", &self.provisioner)
            .field("seed", &self.seed)
            .field("max_time", &self.max_time)
            .field("workflows", &self.workflows.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Simulation {
    /// Deterministic EBPSM run over `environment` with no workload yet.
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            algorithm: AlgorithmKind::default(),
            provisioner: None,
            behaviour: VmBehaviour::default(),
            seed: 0,
            max_time: DEFAULT_MAX_TIME,
            workflows: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        let sim = &cfg.simulation;
        let mut builder = Self::new(cfg.environment.clone())
            .algorithm(sim.algorithm)
            .behaviour(cfg.behaviour)
            .seed(sim.seed)
            .max_time(sim.max_time)
            .workflows(cfg.workflows.iter().cloned());
        builder.provisioner = sim.provisioner;
        builder
    }

    pub fn algorithm(mut self, algorithm: AlgorithmKind) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn provisioner(mut self, provisioner: ProvisionerKind) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn behaviour(mut self, behaviour: VmBehaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn max_time(mut self, max_time: SimTime) -> Self {
        self.max_time = max_time;
        self
    }

    pub fn workflow(mut self, dag: impl Into<Arc<Dag>>) -> Self {
        self.workflows.push(dag.into());
        self
    }

    pub fn workflows(mut self, dags: impl IntoIterator<Item = Arc<Dag>>) -> Self {
        self.workflows.extend(dags);
        self
    }

    pub fn listener(mut self, listener: Box<dyn SimulationListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Build the runtime with every workflow arrival already queued.
    pub fn into_runtime(self) -> Result<Runtime> {
        let algorithm = Algorithm::new(self.algorithm, self.provisioner);
        info!(
            algorithm = %algorithm.kind(),
            provisioner = %algorithm.provisioner().kind(),
            seed = self.seed,
            workflows = self.workflows.len(),
            "building simulation"
        );

        let mut core = CoreRuntime::new(
            self.environment,
            algorithm,
            self.behaviour,
            SimRng::seed_from_u64(self.seed),
            self.workflows.len(),
        );
        for listener in self.listeners {
            core.add_listener(listener);
        }

        let mut runtime = Runtime::new(core, self.max_time);
        runtime.submit_dags(self.workflows)?;
        Ok(runtime)
    }

    pub fn run(self) -> Result<SimulationReport> {
        self.into_runtime()?.run()
    }
}
