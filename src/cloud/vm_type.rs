// src/cloud/vm_type.rs

use crate::cloud::distributions::DelayDistribution;

pub const DEFAULT_BILLING_PERIOD: f64 = 3600.0;
pub const DEFAULT_CACHE_SIZE: u64 = 100_000_000;
pub const DEFAULT_DEPROVISIONING_DELAY: f64 = 10.0;

/// Immutable catalog entry for a class of leasable VM.
#[derive(Debug, Clone, PartialEq)]
pub struct VmType {
    pub name: String,
    /// Million instructions per second.
    pub mips: f64,
    pub cores: u32,
    /// Price per billing period.
    pub price: f64,
    /// Billing period length in seconds.
    pub billing_period: f64,
    pub provisioning_delay: DelayDistribution,
    pub deprovisioning_delay: DelayDistribution,
    /// Advertised cache capacity in bytes. Catalog attribute only: the
    /// per-VM [`FileCache`](super::FileCache) does not evict.
    pub cache_size: u64,
    pub memory: u64,
}

impl VmType {
    pub fn builder(name: impl Into<String>) -> VmTypeBuilder {
        VmTypeBuilder::new(name)
    }

    /// Whole billing periods charged for `runtime`; any lease pays at least one.
    pub fn billing_units(&self, runtime: f64) -> f64 {
        (runtime / self.billing_period).ceil().max(1.0)
    }

    /// `max(1, ceil(runtime / period)) * price`.
    pub fn cost_for(&self, runtime: f64) -> f64 {
        self.billing_units(runtime) * self.price
    }
}

/// Builder with the usual cloud defaults: one core, hourly billing, no boot
/// delay, ten seconds of teardown.
#[derive(Debug, Clone)]
pub struct VmTypeBuilder {
    vm_type: VmType,
}

impl VmTypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            vm_type: VmType {
                name: name.into(),
                mips: 1.0,
                cores: 1,
                price: 1.0,
                billing_period: DEFAULT_BILLING_PERIOD,
                provisioning_delay: DelayDistribution::constant(0.0),
                deprovisioning_delay: DelayDistribution::constant(DEFAULT_DEPROVISIONING_DELAY),
                cache_size: DEFAULT_CACHE_SIZE,
                memory: 0,
            },
        }
    }

    pub fn mips(mut self, mips: f64) -> Self {
        self.vm_type.mips = mips;
        self
    }

    pub fn cores(mut self, cores: u32) -> Self {
        self.vm_type.cores = cores;
        self
    }

    pub fn price(mut self, price: f64) -> Self {
        self.vm_type.price = price;
        self
    }

    pub fn billing_period(mut self, seconds: f64) -> Self {
        self.vm_type.billing_period = seconds;
        self
    }

    pub fn provisioning_delay(mut self, delay: DelayDistribution) -> Self {
        self.vm_type.provisioning_delay = delay;
        self
    }

    pub fn deprovisioning_delay(mut self, delay: DelayDistribution) -> Self {
        self.vm_type.deprovisioning_delay = delay;
        self
    }

    pub fn cache_size(mut self, bytes: u64) -> Self {
        self.vm_type.cache_size = bytes;
        self
    }

    pub fn memory(mut self, memory: u64) -> Self {
        self.vm_type.memory = memory;
        self
    }

    pub fn build(self) -> VmType {
        self.vm_type
    }
}
