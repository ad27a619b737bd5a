// src/cloud/mod.rs

//! Leasable resources: VM catalog, VM state machine, jobs, prediction.

pub mod distributions;
pub mod environment;
pub mod job;
pub mod storage;
pub mod vm;
pub mod vm_type;

pub use distributions::{
    DelayDistribution, FailureModel, PerformanceVariation, RuntimeDistribution, SimRng,
    VmBehaviour,
};
pub use environment::Environment;
pub use job::{Job, JobResult, JobState, JobStore};
pub use storage::{FileCache, StorageParams};
pub use vm::{Vm, VmEffect};
pub use vm_type::{VmType, VmTypeBuilder};

use std::collections::BTreeMap;

use crate::errors::{Result, SimError};
use crate::types::VmId;

/// Every VM ever created in a run, addressed by id.
#[derive(Debug, Default)]
pub struct Cloud {
    vms: BTreeMap<VmId, Vm>,
    next_id: usize,
}

impl Cloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_vm(&mut self, vm_type: VmType, behaviour: VmBehaviour) -> VmId {
        let id = VmId(self.next_id);
        self.next_id += 1;
        self.vms.insert(id, Vm::new(id, vm_type, behaviour));
        id
    }

    pub fn get(&self, id: VmId) -> Result<&Vm> {
        self.vms
            .get(&id)
            .ok_or_else(|| SimError::invalid_state(format!("unknown {id}")))
    }

    pub fn get_mut(&mut self, id: VmId) -> Result<&mut Vm> {
        self.vms
            .get_mut(&id)
            .ok_or_else(|| SimError::invalid_state(format!("unknown {id}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vm> {
        self.vms.values()
    }

    pub fn len(&self) -> usize {
        self.vms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vms.is_empty()
    }
}
