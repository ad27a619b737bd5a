//! A listener that records every lifecycle notification for later checks.

use std::cell::RefCell;
use std::rc::Rc;

use cloudsched::cloud::{Job, JobResult, Vm};
use cloudsched::dag::{DagJob, TaskId};
use cloudsched::stats::SimulationListener;
use cloudsched::types::{DagJobId, JobId, VmId};

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Released {
        job: JobId,
        dag_job: DagJobId,
        task: TaskId,
        at: f64,
        retry: bool,
    },
    Started {
        job: JobId,
        vm: Option<VmId>,
        at: f64,
    },
    Finished {
        job: JobId,
        dag_job: DagJobId,
        task: TaskId,
        result: JobResult,
        at: f64,
    },
    DagFinished {
        dag_job: DagJobId,
        at: f64,
    },
    VmLaunched {
        vm: VmId,
        vm_type: String,
    },
    VmTerminated {
        vm: VmId,
    },
}

/// Shared log; clone the handle before boxing the listener.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    records: Rc<RefCell<Vec<Record>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener(&self) -> Box<dyn SimulationListener> {
        Box::new(self.clone())
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.borrow().clone()
    }

    pub fn released(&self) -> Vec<(DagJobId, TaskId, f64, bool)> {
        self.records
            .borrow()
            .iter()
            .filter_map(|r| match r {
                Record::Released {
                    dag_job,
                    task,
                    at,
                    retry,
                    ..
                } => Some((*dag_job, *task, *at, *retry)),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> Vec<(DagJobId, TaskId, JobResult, f64)> {
        self.records
            .borrow()
            .iter()
            .filter_map(|r| match r {
                Record::Finished {
                    dag_job,
                    task,
                    result,
                    at,
                    ..
                } => Some((*dag_job, *task, *result, *at)),
                _ => None,
            })
            .collect()
    }

    pub fn vm_types_launched(&self) -> Vec<String> {
        self.records
            .borrow()
            .iter()
            .filter_map(|r| match r {
                Record::VmLaunched { vm_type, .. } => Some(vm_type.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, record: Record) {
        self.records.borrow_mut().push(record);
    }
}

impl SimulationListener for Recorder {
    fn job_released(&mut self, job: &Job) {
        self.push(Record::Released {
            job: job.id,
            dag_job: job.dag_job,
            task: job.task,
            at: job.release_time,
            retry: job.is_retry,
        });
    }

    fn job_started(&mut self, job: &Job) {
        self.push(Record::Started {
            job: job.id,
            vm: job.vm,
            at: job.start_time,
        });
    }

    fn job_finished(&mut self, job: &Job) {
        self.push(Record::Finished {
            job: job.id,
            dag_job: job.dag_job,
            task: job.task,
            result: job.result(),
            at: job.finish_time,
        });
    }

    fn dag_finished(&mut self, dag_job: &DagJob, now: f64) {
        self.push(Record::DagFinished {
            dag_job: dag_job.id(),
            at: now,
        });
    }

    fn vm_launched(&mut self, vm: &Vm) {
        self.push(Record::VmLaunched {
            vm: vm.id(),
            vm_type: vm.vm_type().name.clone(),
        });
    }

    fn vm_terminated(&mut self, vm: &Vm) {
        self.push(Record::VmTerminated { vm: vm.id() });
    }
}
