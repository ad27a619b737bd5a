// src/cloud/environment.rs

//! VM catalog plus cost and runtime prediction.

use std::cmp::Ordering;

use crate::cloud::storage::{FileCache, StorageParams};
use crate::cloud::vm_type::VmType;
use crate::dag::{Dag, TaskId};
use crate::errors::{Result, SimError};
use crate::types::VmId;

pub const DEFAULT_EXPECTED_DEGRADATION: f64 = 0.15;

/// Resource catalog and prediction strategy shared by algorithms,
/// provisioners and budget distributions.
#[derive(Debug, Clone)]
pub struct Environment {
    vm_types: Vec<VmType>,
    storage: StorageParams,
    storage_aware: bool,
    expected_degradation: f64,
    cache: FileCache,
}

impl Environment {
    pub fn new(vm_types: Vec<VmType>, storage: StorageParams, storage_aware: bool) -> Result<Self> {
        if vm_types.is_empty() {
            return Err(SimError::ConfigError(
                "environment needs at least one VM type".to_string(),
            ));
        }
        Ok(Self {
            vm_types,
            storage,
            storage_aware,
            expected_degradation: DEFAULT_EXPECTED_DEGRADATION,
            cache: FileCache::new(storage.cache),
        })
    }

    pub fn with_expected_degradation(mut self, degradation: f64) -> Self {
        self.expected_degradation = degradation.clamp(0.0, 0.99);
        self
    }

    pub fn vm_types(&self) -> &[VmType] {
        &self.vm_types
    }

    pub fn storage(&self) -> &StorageParams {
        &self.storage
    }

    /// Catalog sorted by ascending price (stable for equal prices).
    pub fn types_by_price(&self) -> Vec<&VmType> {
        let mut types: Vec<&VmType> = self.vm_types.iter().collect();
        types.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal));
        types
    }

    /// Catalog sorted by descending price.
    pub fn types_by_price_descending(&self) -> Vec<&VmType> {
        let mut types = self.types_by_price();
        types.reverse();
        types
    }

    pub fn cheapest_vm_type(&self) -> &VmType {
        self.types_by_price()
            .first()
            .copied()
            .unwrap_or(&self.vm_types[0])
    }

    pub fn fastest_vm_type(&self) -> &VmType {
        self.vm_types
            .iter()
            .max_by(|a, b| a.mips.partial_cmp(&b.mips).unwrap_or(Ordering::Equal))
            .unwrap_or(&self.vm_types[0])
    }

    pub fn slowest_vm_type(&self) -> &VmType {
        self.vm_types
            .iter()
            .min_by(|a, b| a.mips.partial_cmp(&b.mips).unwrap_or(Ordering::Equal))
            .unwrap_or(&self.vm_types[0])
    }

    /// Estimated charge for running `runtime` seconds on a fresh lease.
    pub fn cost(&self, runtime: f64, vm_type: &VmType) -> f64 {
        vm_type.cost_for(runtime)
    }

    /// Compute plus (when storage aware) estimated transfer time.
    pub fn predicted_runtime(&self, vm_type: &VmType, dag: &Dag, task: TaskId) -> f64 {
        self.predicted_runtime_no_transfer(vm_type, dag, task) + self.transfer_estimate(dag, task)
    }

    pub fn predicted_runtime_no_transfer(&self, vm_type: &VmType, dag: &Dag, task: TaskId) -> f64 {
        dag.task(task).size / vm_type.mips
    }

    /// Pessimistic estimate assuming the expected performance loss.
    pub fn predicted_runtime_with_degradation(
        &self,
        vm_type: &VmType,
        dag: &Dag,
        task: TaskId,
    ) -> f64 {
        let factor = 1.0 - self.expected_degradation;
        dag.task(task).size / (vm_type.mips * factor) + self.transfer_estimate(dag, task) / factor
    }

    /// Estimate for a concrete VM: inputs it already caches are not read.
    pub fn predicted_runtime_on_vm(
        &self,
        vm: VmId,
        vm_type: &VmType,
        dag: &Dag,
        task: TaskId,
    ) -> f64 {
        let mut runtime = self.predicted_runtime_no_transfer(vm_type, dag, task);
        if self.storage_aware {
            runtime += self.input_transfer_time(vm, dag, task) + self.output_transfer_time(dag, task);
        }
        runtime
    }

    /// Time to move every input and output of `task`, ignoring caches.
    pub fn transfer_estimate(&self, dag: &Dag, task: TaskId) -> f64 {
        if !self.storage_aware {
            return 0.0;
        }
        let t = dag.task(task);
        let read: u64 = t.inputs.iter().map(|f| dag.file(*f).size).sum();
        let write: u64 = t.outputs.iter().map(|f| dag.file(*f).size).sum();
        self.storage.read_time(read) + self.storage.write_time(write)
    }

    /// Time to fetch the inputs of `task` that `vm` does not cache yet.
    pub fn input_transfer_time(&self, vm: VmId, dag: &Dag, task: TaskId) -> f64 {
        let bytes: u64 = dag
            .task(task)
            .inputs
            .iter()
            .map(|f| dag.file(*f))
            .filter(|f| !self.cache.contains(vm, &f.name))
            .map(|f| f.size)
            .sum();
        self.storage.read_time(bytes)
    }

    pub fn output_transfer_time(&self, dag: &Dag, task: TaskId) -> f64 {
        let bytes: u64 = dag.task(task).outputs.iter().map(|f| dag.file(*f).size).sum();
        self.storage.write_time(bytes)
    }

    pub fn is_file_cached(&self, vm: VmId, file: &str) -> bool {
        self.cache.contains(vm, file)
    }

    /// Any input of `task` cached on `vm`.
    pub fn caches_any_input(&self, vm: VmId, dag: &Dag, task: TaskId) -> bool {
        dag.task(task)
            .inputs
            .iter()
            .any(|f| self.cache.contains(vm, &dag.file(*f).name))
    }

    /// Remember that `vm` now holds the inputs and outputs of `task`.
    pub fn cache_task_files(&mut self, vm: VmId, dag: &Dag, task: TaskId) {
        let t = dag.task(task);
        for f in t.inputs.iter().chain(t.outputs.iter()) {
            self.cache.insert(vm, &dag.file(*f).name);
        }
    }

    pub fn evict_vm(&mut self, vm: VmId) {
        self.cache.evict_vm(vm);
    }
}
