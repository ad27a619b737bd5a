#![allow(dead_code)]

use std::sync::Arc;

use cloudsched::cloud::{DelayDistribution, Environment, StorageParams, VmType};
use cloudsched::dag::Dag;
use cloudsched::types::{CacheKind, StorageKind};

/// Builder for workflow DAGs to simplify test setup.
///
/// Deadlines are given relative to the submit time, as in config files.
pub struct DagBuilder {
    name: String,
    budget: f64,
    deadline: f64,
    submit_time: f64,
    files: Vec<(String, i64)>,
    tasks: Vec<TaskSpec>,
}

struct TaskSpec {
    name: String,
    size: f64,
    parents: Vec<String>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl DagBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            budget: 0.0,
            deadline: f64::INFINITY,
            submit_time: 0.0,
            files: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn budget(mut self, budget: f64) -> Self {
        self.budget = budget;
        self
    }

    pub fn deadline(mut self, relative: f64) -> Self {
        self.deadline = relative;
        self
    }

    pub fn submit_time(mut self, at: f64) -> Self {
        self.submit_time = at;
        self
    }

    pub fn file(mut self, name: &str, size: i64) -> Self {
        self.files.push((name.to_string(), size));
        self
    }

    pub fn task(self, name: &str, size: f64) -> Self {
        self.task_after(name, size, &[])
    }

    pub fn task_after(mut self, name: &str, size: f64, parents: &[&str]) -> Self {
        self.tasks.push(TaskSpec {
            name: name.to_string(),
            size,
            parents: parents.iter().map(|p| p.to_string()).collect(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        self
    }

    /// Attach `file` as an input of the most recently added task.
    pub fn reads(mut self, file: &str) -> Self {
        if let Some(t) = self.tasks.last_mut() {
            t.inputs.push(file.to_string());
        }
        self
    }

    /// Attach `file` as an output of the most recently added task.
    pub fn writes(mut self, file: &str) -> Self {
        if let Some(t) = self.tasks.last_mut() {
            t.outputs.push(file.to_string());
        }
        self
    }

    pub fn build(self) -> Dag {
        let mut dag = Dag::new(self.name.clone(), self.name)
            .with_budget(self.budget)
            .with_deadline(self.submit_time + self.deadline)
            .with_submit_time(self.submit_time);
        for (name, size) in &self.files {
            dag.add_file(name, *size).expect("add file");
        }
        for t in &self.tasks {
            dag.add_task(&t.name, t.size, 0).expect("add task");
        }
        for t in &self.tasks {
            for p in &t.parents {
                dag.add_edge(p, &t.name).expect("add edge");
            }
            for f in &t.inputs {
                dag.add_input(&t.name, f).expect("add input");
            }
            for f in &t.outputs {
                dag.add_output(&t.name, f).expect("add output");
            }
        }
        dag
    }

    pub fn build_arc(self) -> Arc<Dag> {
        Arc::new(self.build())
    }
}

/// `a -> b -> c ...`, each task of `size` MI, named `t0`, `t1`, ...
pub fn chain(name: &str, len: usize, size: f64) -> DagBuilder {
    let mut b = DagBuilder::new(name);
    for i in 0..len {
        let task = format!("t{i}");
        if i == 0 {
            b = b.task(&task, size);
        } else {
            let parent = format!("t{}", i - 1);
            b = b.task_after(&task, size, &[&parent]);
        }
    }
    b
}

/// One root fanning out to `width` children that join into a sink.
pub fn fork_join(name: &str, width: usize, size: f64) -> DagBuilder {
    let mut b = DagBuilder::new(name).task("root", size);
    let children: Vec<String> = (0..width).map(|i| format!("c{i}")).collect();
    for c in &children {
        b = b.task_after(c, size, &["root"]);
    }
    let refs: Vec<&str> = children.iter().map(String::as_str).collect();
    b.task_after("sink", size, &refs)
}

/// Hourly-billed type with no boot delay and the default teardown.
pub fn vm_type(name: &str, mips: f64, price: f64) -> VmType {
    VmType::builder(name).mips(mips).price(price).build()
}

pub fn vm_type_with_delays(
    name: &str,
    mips: f64,
    price: f64,
    provisioning: f64,
    deprovisioning: f64,
) -> VmType {
    VmType::builder(name)
        .mips(mips)
        .price(price)
        .provisioning_delay(DelayDistribution::constant(provisioning))
        .deprovisioning_delay(DelayDistribution::constant(deprovisioning))
        .build()
}

/// `slow` (1 mips, price 1) and `fast` (10 mips, price 5).
pub fn two_type_catalog() -> Vec<VmType> {
    vec![vm_type("slow", 1.0, 1.0), vm_type("fast", 10.0, 5.0)]
}

/// Environment over `types` with void storage and no expected degradation.
pub fn environment(types: Vec<VmType>) -> Environment {
    Environment::new(types, StorageParams::default(), false)
        .expect("non-empty catalog")
        .with_expected_degradation(0.0)
}

/// Environment over `types` with a global store of the given bandwidth.
pub fn global_storage_environment(types: Vec<VmType>, bandwidth: f64) -> Environment {
    let storage = StorageParams {
        kind: StorageKind::Global,
        cache: CacheKind::Unlimited,
        read_bandwidth: bandwidth,
        write_bandwidth: bandwidth,
    };
    Environment::new(types, storage, true)
        .expect("non-empty catalog")
        .with_expected_degradation(0.0)
}
