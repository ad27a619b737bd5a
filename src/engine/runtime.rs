// src/engine/runtime.rs

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::dag::Dag;
use crate::errors::Result;
use crate::stats::SimulationReport;

use super::core::CoreRuntime;
use super::queue::EventQueue;
use super::{CoreCommand, Event, SimTime};

/// Drives [`CoreRuntime`] from the event queue.
///
/// The loop pops the earliest event, lets the core handle it and schedules
/// whatever the core asks for. It stops when the core reports the workload
/// complete, when the queue runs dry, or when the next event lies past the
/// time horizon.
#[derive(Debug)]
pub struct Runtime {
    core: CoreRuntime,
    queue: EventQueue,
    max_time: SimTime,
}

impl Runtime {
    pub fn new(core: CoreRuntime, max_time: SimTime) -> Self {
        Self {
            core,
            queue: EventQueue::new(),
            max_time,
        }
    }

    pub fn core(&self) -> &CoreRuntime {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut CoreRuntime {
        &mut self.core
    }

    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    /// Schedule each DAG's arrival at its submit time.
    pub fn submit_dags(&mut self, dags: impl IntoIterator<Item = Arc<Dag>>) -> Result<()> {
        for dag in dags {
            debug!(dag = dag.name(), at = dag.submit_time(), "scheduling dag arrival");
            self.queue
                .schedule_at(dag.submit_time(), Event::DagSubmitted { dag })?;
        }
        Ok(())
    }

    /// Main event loop. Usage and policy-data errors abort it.
    pub fn run(&mut self) -> Result<SimulationReport> {
        info!(max_time = self.max_time, "simulation started");

        loop {
            match self.queue.peek_time() {
                None => {
                    info!(time = self.now(), "event queue empty; stopping");
                    break;
                }
                Some(t) if t > self.max_time => {
                    warn!(
                        next = t,
                        max_time = self.max_time,
                        "time horizon reached; stopping"
                    );
                    break;
                }
                Some(_) => {}
            }
            let Some((now, event)) = self.queue.pop() else {
                break;
            };
            trace!(time = now, ?event, "handling event");

            let step = self.core.step(now, event)?;
            for command in step.commands {
                self.execute_command(command)?;
            }

            if !step.keep_running {
                info!(time = now, "workload complete; stopping");
                break;
            }
        }

        let report = self.core.report(self.now());
        info!(
            time = report.end_time,
            total_cost = report.total_cost,
            complete = report.complete,
            "simulation finished"
        );
        Ok(report)
    }

    fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::Schedule { delay, event } => self.queue.schedule(delay, event),
        }
    }
}
