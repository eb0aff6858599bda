//! Event scheduler: the simulation clock plus a time-ordered queue of pending
//! resumptions.
//!
//! Every simulated process (request service, migration, workload, policy
//! loop, metrics sampler) is an explicit state machine whose next step is a
//! queued event. Events due at the same instant pop in the order they were
//! scheduled.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::clock::SimClock;

/// A timestamped event for the priority queue.
#[derive(Debug, Clone)]
struct Scheduled<E> {
    time_us: u64,
    sequence: u64,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.time_us == other.time_us && self.sequence == other.sequence
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want min-heap
        other
            .time_us
            .cmp(&self.time_us)
            .then(other.sequence.cmp(&self.sequence))
    }
}

/// Clock plus min-heap of `(time, sequence, event)`.
#[derive(Debug, Clone)]
pub struct Scheduler<E> {
    clock: SimClock,
    queue: BinaryHeap<Scheduled<E>>,
    sequence: u64,
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            clock: SimClock::new(),
            queue: BinaryHeap::new(),
            sequence: 0,
        }
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn now_us(&self) -> u64 {
        self.clock.now_us()
    }

    /// Schedule `event` at an absolute time.
    pub fn schedule_at(&mut self, time_us: u64, event: E) {
        debug_assert!(
            time_us >= self.clock.now_us(),
            "Cannot schedule in the past: now={}us, target={}us",
            self.clock.now_us(),
            time_us,
        );
        self.queue.push(Scheduled {
            time_us,
            sequence: self.sequence,
            event,
        });
        self.sequence += 1;
    }

    /// Start a process right away (after everything already due now).
    pub fn schedule_now(&mut self, event: E) {
        let now = self.clock.now_us();
        self.schedule_at(now, event);
    }

    /// Resume a process after a simulated delay.
    pub fn schedule_after(&mut self, delay_us: u64, event: E) {
        let at = self.clock.now_us() + delay_us;
        self.schedule_at(at, event);
    }

    /// Pop the next event due strictly before `end_us`, advancing the clock to
    /// its time. Returns `None` when nothing is left before `end_us`.
    pub fn pop_before(&mut self, end_us: u64) -> Option<E> {
        if self.queue.peek()?.time_us >= end_us {
            return None;
        }
        let next = self.queue.pop()?;
        self.clock.advance_to_us(next.time_us);
        Some(next.event)
    }

    /// Move the clock forward to `time_us` without processing anything.
    pub fn advance_to(&mut self, time_us: u64) {
        if time_us > self.clock.now_us() {
            self.clock.advance_to_us(time_us);
        }
    }

    /// Time of the next pending event.
    pub fn peek_time(&self) -> Option<u64> {
        self.queue.peek().map(|s| s.time_us)
    }

    /// Number of events still queued.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}
