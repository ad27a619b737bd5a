// src/engine/queue.rs

//! Virtual clock plus time-ordered event queue.
//!
//! Events are delivered in non-decreasing time; events scheduled for the same
//! instant are delivered in the order they were scheduled.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::engine::Event;
use crate::errors::{Result, SimError};

#[derive(Debug)]
struct Scheduled {
    time: f64,
    seq: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed: BinaryHeap is a max-heap and we want the earliest first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
pub struct EventQueue {
    now: f64,
    seq: u64,
    heap: BinaryHeap<Scheduled>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    /// Deliver `event` after `delay`. A zero delay still runs after the
    /// current handler returns.
    pub fn schedule(&mut self, delay: f64, event: Event) -> Result<()> {
        if !(delay >= 0.0) || !delay.is_finite() {
            return Err(SimError::invalid_state(format!(
                "cannot schedule {event:?} with delay {delay}"
            )));
        }
        self.push(self.now + delay, event);
        Ok(())
    }

    /// Deliver `event` at absolute `time`, which must not be in the past.
    pub fn schedule_at(&mut self, time: f64, event: Event) -> Result<()> {
        if !(time >= self.now) || !time.is_finite() {
            return Err(SimError::invalid_state(format!(
                "cannot schedule {event:?} at {time} (now is {})",
                self.now
            )));
        }
        self.push(time, event);
        Ok(())
    }

    fn push(&mut self, time: f64, event: Event) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Scheduled { time, seq, event });
    }

    /// Pop the next event and advance the clock to its time.
    pub fn pop(&mut self) -> Option<(f64, Event)> {
        let next = self.heap.pop()?;
        self.now = next.time;
        Some((next.time, next.event))
    }

    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|s| s.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VmId;

    #[test]
    fn earlier_events_come_first() {
        let mut q = EventQueue::new();
        q.schedule(5.0, Event::VmLaunched { vm: VmId(1) }).unwrap();
        q.schedule(1.0, Event::VmLaunched { vm: VmId(2) }).unwrap();
        let (t, e) = q.pop().unwrap();
        assert_eq!(t, 1.0);
        assert!(matches!(e, Event::VmLaunched { vm: VmId(2) }));
        assert_eq!(q.now(), 1.0);
    }

    #[test]
    fn equal_times_are_fifo() {
        let mut q = EventQueue::new();
        for i in 0..10 {
            q.schedule(3.0, Event::VmLaunched { vm: VmId(i) }).unwrap();
        }
        for i in 0..10 {
            match q.pop() {
                Some((_, Event::VmLaunched { vm })) => assert_eq!(vm, VmId(i)),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(q.is_empty());
    }

    #[test]
    fn negative_delay_is_rejected() {
        let mut q = EventQueue::new();
        assert!(q.schedule(-1.0, Event::ProvisioningTick).is_err());
        assert!(q.schedule(f64::NAN, Event::ProvisioningTick).is_err());
    }

    #[test]
    fn cannot_schedule_in_the_past() {
        let mut q = EventQueue::new();
        q.schedule(10.0, Event::ProvisioningTick).unwrap();
        q.pop();
        assert!(q.schedule_at(5.0, Event::ProvisioningTick).is_err());
        assert!(q.schedule_at(10.0, Event::ProvisioningTick).is_ok());
    }
}
