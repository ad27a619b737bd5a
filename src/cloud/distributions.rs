// src/cloud/distributions.rs

//! Seedable samplers used by VMs and VM types.
//!
//! All samplers draw from the single simulation RNG passed in by the caller,
//! so a run is reproducible from its seed alone.

use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

/// RNG shared by every sampler of one simulation run.
pub type SimRng = StdRng;

/// Provisioning / deprovisioning delay of a VM type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DelayDistribution {
    Constant { value: f64 },
    Uniform { min: f64, max: f64 },
    Normal { mean: f64, stddev: f64 },
}

impl DelayDistribution {
    pub fn constant(value: f64) -> Self {
        DelayDistribution::Constant { value }
    }

    /// Never negative.
    pub fn sample(&self, rng: &mut SimRng) -> f64 {
        let value = match self {
            DelayDistribution::Constant { value } => *value,
            DelayDistribution::Uniform { min, max } => {
                if max > min {
                    rng.gen_range(*min..*max)
                } else {
                    *min
                }
            }
            DelayDistribution::Normal { mean, stddev } => Normal::new(*mean, *stddev)
                .map(|n| n.sample(rng))
                .unwrap_or(*mean),
        };
        value.max(0.0)
    }

    /// Expected value, used by planners that must stay deterministic.
    pub fn mean(&self) -> f64 {
        let value = match self {
            DelayDistribution::Constant { value } => *value,
            DelayDistribution::Uniform { min, max } => (min + max) / 2.0,
            DelayDistribution::Normal { mean, .. } => *mean,
        };
        value.max(0.0)
    }
}

/// Jitter applied to a job's runtime once it starts computing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RuntimeDistribution {
    #[default]
    Identity,
    /// Actual runtime is uniform in `estimate * [1 - variance, 1 + variance]`.
    Uniform { variance: f64 },
}

impl RuntimeDistribution {
    pub fn from_variance(variance: f64) -> Self {
        if variance > 0.0 {
            RuntimeDistribution::Uniform { variance }
        } else {
            RuntimeDistribution::Identity
        }
    }

    pub fn actual_runtime(&self, estimate: f64, rng: &mut SimRng) -> f64 {
        match self {
            RuntimeDistribution::Identity => estimate,
            RuntimeDistribution::Uniform { variance } => {
                let low = estimate * (1.0 - variance);
                let high = estimate * (1.0 + variance);
                (low + (high - low) * rng.r#gen::<f64>()).max(0.0)
            }
        }
    }
}

/// Decides whether a job fails, and when.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FailureModel {
    /// Probability in `[0, 1]` that a job attempt fails.
    pub failure_rate: f64,
}

impl FailureModel {
    pub fn new(failure_rate: f64) -> Self {
        Self { failure_rate }
    }

    pub fn failure_occurred(&self, rng: &mut SimRng) -> bool {
        if self.failure_rate <= 0.0 {
            return false;
        }
        if self.failure_rate >= 1.0 {
            return true;
        }
        rng.r#gen::<f64>() < self.failure_rate
    }

    /// Time at which a failing job dies, in `[0, runtime]`.
    pub fn runtime_before_failure(&self, runtime: f64, rng: &mut SimRng) -> f64 {
        runtime * rng.r#gen::<f64>()
    }
}

/// Multiplicative derating of a VM's mips, sampled per job.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PerformanceVariation {
    #[default]
    Identity,
    /// `1 - clamp(N(avg, stddev), 0, max)`.
    Normal { avg: f64, stddev: f64, max: f64 },
}

impl PerformanceVariation {
    pub fn new(avg: f64, stddev: f64, max: f64) -> Self {
        if avg > 0.0 {
            PerformanceVariation::Normal { avg, stddev, max }
        } else {
            PerformanceVariation::Identity
        }
    }

    /// Factor in `[0, 1]`; 1 means full speed.
    pub fn sample(&self, rng: &mut SimRng) -> f64 {
        match self {
            PerformanceVariation::Identity => 1.0,
            PerformanceVariation::Normal { avg, stddev, max } => {
                let loss = Normal::new(*avg, *stddev)
                    .map(|n| n.sample(rng))
                    .unwrap_or(*avg);
                1.0 - loss.clamp(0.0, max.max(0.0).min(1.0))
            }
        }
    }
}

/// Samplers handed to every VM at creation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VmBehaviour {
    pub runtime: RuntimeDistribution,
    pub failure: FailureModel,
    pub variation: PerformanceVariation,
}
