// src/cloud/storage.rs

//! Minimal storage collaborator: transfer-time estimates and per-VM caches.
//!
//! There is no byte-level transfer simulation; a transfer simply takes
//! `bytes / bandwidth` seconds on a global store, or nothing on void storage.

use std::collections::{HashMap, HashSet};

use crate::types::{CacheKind, StorageKind, VmId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageParams {
    pub kind: StorageKind,
    pub cache: CacheKind,
    /// Bytes per second.
    pub read_bandwidth: f64,
    /// Bytes per second.
    pub write_bandwidth: f64,
}

impl Default for StorageParams {
    fn default() -> Self {
        Self {
            kind: StorageKind::Void,
            cache: CacheKind::Unlimited,
            read_bandwidth: 100_000_000.0,
            write_bandwidth: 100_000_000.0,
        }
    }
}

impl StorageParams {
    pub fn read_time(&self, bytes: u64) -> f64 {
        match self.kind {
            StorageKind::Void => 0.0,
            StorageKind::Global => bytes as f64 / self.read_bandwidth,
        }
    }

    pub fn write_time(&self, bytes: u64) -> f64 {
        match self.kind {
            StorageKind::Void => 0.0,
            StorageKind::Global => bytes as f64 / self.write_bandwidth,
        }
    }
}

/// Which file names each VM holds locally.
#[derive(Debug, Clone, Default)]
pub struct FileCache {
    kind: CacheKind,
    files: HashMap<VmId, HashSet<String>>,
}

impl FileCache {
    pub fn new(kind: CacheKind) -> Self {
        Self {
            kind,
            files: HashMap::new(),
        }
    }

    pub fn contains(&self, vm: VmId, file: &str) -> bool {
        self.files
            .get(&vm)
            .map(|set| set.contains(file))
            .unwrap_or(false)
    }

    pub fn insert(&mut self, vm: VmId, file: &str) {
        if self.kind == CacheKind::Void {
            return;
        }
        self.files.entry(vm).or_default().insert(file.to_string());
    }

    pub fn evict_vm(&mut self, vm: VmId) {
        self.files.remove(&vm);
    }
}
