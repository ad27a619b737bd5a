// src/config/model.rs

use std::sync::Arc;

use serde::Deserialize;

use crate::cloud::environment::DEFAULT_EXPECTED_DEGRADATION;
use crate::cloud::vm_type::{
    DEFAULT_BILLING_PERIOD, DEFAULT_CACHE_SIZE, DEFAULT_DEPROVISIONING_DELAY,
};
use crate::cloud::{DelayDistribution, Environment, VmBehaviour, VmType};
use crate::dag::Dag;
use crate::provisioner::ProvisionerKind;
use crate::types::{AlgorithmKind, CacheKind, StorageKind};

/// Simulation description exactly as read from TOML.
///
/// ```toml
/// [simulation]
/// seed = 7
/// algorithm = "ebpsm"
///
/// [[vm_type]]
/// name = "small"
/// mips = 1.0
/// price = 1.0
///
/// [[workflow]]
/// name = "chain"
/// budget = 10.0
/// deadline = 36000.0
/// [[workflow.task]]
/// name = "A"
/// size = 3600.0
/// ```
///
/// Every section except `[[vm_type]]` and `[[workflow]]` is optional. The raw
/// form is turned into a [`ConfigFile`] by `ConfigFile::try_from`, which is
/// where the semantic checks live.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub simulation: SimulationSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub variation: VariationSection,

    /// The VM catalog, from `[[vm_type]]`.
    #[serde(default)]
    pub vm_type: Vec<VmTypeConfig>,

    /// The workload, from `[[workflow]]`.
    #[serde(default)]
    pub workflow: Vec<WorkflowConfig>,
}

/// `[simulation]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationSection {
    #[serde(default)]
    pub seed: u64,

    #[serde(default)]
    pub algorithm: AlgorithmKind,

    /// Overrides the algorithm's default provisioner.
    #[serde(default)]
    pub provisioner: Option<ProvisionerKind>,

    /// Include transfer estimates in runtime predictions.
    #[serde(default = "default_storage_aware")]
    pub storage_aware: bool,

    /// Safety horizon: events scheduled later are never handled.
    #[serde(default = "default_max_time")]
    pub max_time: f64,
}

fn default_storage_aware() -> bool {
    true
}

fn default_max_time() -> f64 {
    1e9
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            seed: 0,
            algorithm: AlgorithmKind::default(),
            provisioner: None,
            storage_aware: default_storage_aware(),
            max_time: default_max_time(),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    #[serde(default)]
    pub kind: StorageKind,

    #[serde(default)]
    pub cache: CacheKind,

    /// Bytes per second; only used by global storage.
    #[serde(default = "default_bandwidth")]
    pub read_bandwidth: f64,

    #[serde(default = "default_bandwidth")]
    pub write_bandwidth: f64,
}

fn default_bandwidth() -> f64 {
    1e8
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            kind: StorageKind::default(),
            cache: CacheKind::default(),
            read_bandwidth: default_bandwidth(),
            write_bandwidth: default_bandwidth(),
        }
    }
}

/// `[variation]` section: the stochastic knobs. All zero means a
/// deterministic run.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariationSection {
    #[serde(default)]
    pub runtime_variance: f64,

    #[serde(default)]
    pub failure_rate: f64,

    #[serde(default)]
    pub avg_performance_variation: f64,

    #[serde(default)]
    pub stddev_performance_variation: f64,

    #[serde(default)]
    pub max_performance_variation: f64,

    /// Performance loss assumed by pessimistic runtime predictions.
    #[serde(default = "default_expected_degradation")]
    pub expected_degradation: f64,
}

fn default_expected_degradation() -> f64 {
    DEFAULT_EXPECTED_DEGRADATION
}

impl Default for VariationSection {
    fn default() -> Self {
        Self {
            runtime_variance: 0.0,
            failure_rate: 0.0,
            avg_performance_variation: 0.0,
            stddev_performance_variation: 0.0,
            max_performance_variation: 0.0,
            expected_degradation: default_expected_degradation(),
        }
    }
}

/// One `[[vm_type]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VmTypeConfig {
    pub name: String,

    pub mips: f64,

    #[serde(default = "default_cores")]
    pub cores: u32,

    /// Price per billing period.
    pub price: f64,

    #[serde(default = "default_billing_period")]
    pub billing_period: f64,

    #[serde(default = "default_provisioning_delay")]
    pub provisioning_delay: DelayDistribution,

    #[serde(default = "default_deprovisioning_delay")]
    pub deprovisioning_delay: DelayDistribution,

    #[serde(default = "default_cache_size")]
    pub cache_size: u64,

    #[serde(default)]
    pub memory: u64,
}

fn default_cores() -> u32 {
    1
}

fn default_billing_period() -> f64 {
    DEFAULT_BILLING_PERIOD
}

fn default_provisioning_delay() -> DelayDistribution {
    DelayDistribution::constant(0.0)
}

fn default_deprovisioning_delay() -> DelayDistribution {
    DelayDistribution::constant(DEFAULT_DEPROVISIONING_DELAY)
}

fn default_cache_size() -> u64 {
    DEFAULT_CACHE_SIZE
}

impl VmTypeConfig {
    pub fn to_vm_type(&self) -> VmType {
        VmType::builder(self.name.clone())
            .mips(self.mips)
            .cores(self.cores)
            .price(self.price)
            .billing_period(self.billing_period)
            .provisioning_delay(self.provisioning_delay.clone())
            .deprovisioning_delay(self.deprovisioning_delay.clone())
            .cache_size(self.cache_size)
            .memory(self.memory)
            .build()
    }
}

/// One `[[workflow]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    pub name: String,

    pub budget: f64,

    /// Relative to `submit_time`.
    pub deadline: f64,

    #[serde(default)]
    pub submit_time: f64,

    #[serde(default)]
    pub files: Vec<FileConfig>,

    /// `[[workflow.task]]` entries, in declaration order.
    #[serde(default)]
    pub task: Vec<TaskConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub name: String,
    /// Bytes. Signed so that negative sizes are reported, not wrapped.
    pub size: i64,
}

/// One `[[workflow.task]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub name: String,

    /// Million instructions.
    pub size: f64,

    #[serde(default)]
    pub memory: u64,

    /// This task waits for every task listed here.
    #[serde(default)]
    pub parents: Vec<String>,

    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(default)]
    pub outputs: Vec<String>,
}

/// A validated simulation description, ready to run.
///
/// Only [`ConfigFile::try_from`] builds one, so holders can rely on a
/// non-empty catalog and acyclic workflows with known references.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub simulation: SimulationSection,
    pub environment: Environment,
    pub behaviour: VmBehaviour,
    /// Deadlines on these DAGs are absolute.
    pub workflows: Vec<Arc<Dag>>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        simulation: SimulationSection,
        environment: Environment,
        behaviour: VmBehaviour,
        workflows: Vec<Arc<Dag>>,
    ) -> Self {
        Self {
            simulation,
            environment,
            behaviour,
            workflows,
        }
    }

    pub fn total_tasks(&self) -> usize {
        self.workflows.iter().map(|d| d.len()).sum()
    }
}
