//! Synthetic workload: an endless arrival process with phase-shifting hot
//! spots.
//!
//! A fraction of requests target the hot set of the current phase; the rest
//! pick a chunk uniformly at random. Arrivals are evenly spaced by default,
//! or exponentially spaced in Poisson mode.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use shardsim_policies::ChunkId;

use crate::clock::secs_to_us;
use crate::config::WorkloadSection;

/// Inter-arrival spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalProcess {
    /// Exactly `1 / request_rate` apart.
    #[default]
    Fixed,
    /// Exponential gaps with mean `1 / request_rate`.
    Poisson,
}

/// Hot set active from `start_sec` until the next phase begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotPhase {
    pub start_sec: f64,
    pub hot_chunks: Vec<ChunkId>,
}

/// Reference phases: the hot set shifts by one chunk at 150 s and 300 s.
pub fn default_phases() -> Vec<HotPhase> {
    vec![
        HotPhase {
            start_sec: 0.0,
            hot_chunks: vec![0, 4, 8, 12, 16],
        },
        HotPhase {
            start_sec: 150.0,
            hot_chunks: vec![1, 5, 9, 13, 17],
        },
        HotPhase {
            start_sec: 300.0,
            hot_chunks: vec![2, 6, 10, 14, 18],
        },
    ]
}

/// Generates request arrival times and target chunks.
#[derive(Debug, Clone)]
pub struct WorkloadGenerator {
    request_rate: f64,
    arrival: ArrivalProcess,
    hot_fraction: f64,
    /// `(start_us, hot_chunks)`, ascending by start.
    phases: Vec<(u64, Vec<ChunkId>)>,
    num_chunks: u32,
    issued: u64,
    next_arrival_us: u64,
}

impl WorkloadGenerator {
    pub fn new(section: &WorkloadSection, num_chunks: u32) -> Self {
        Self {
            request_rate: section.request_rate,
            arrival: section.arrival,
            hot_fraction: section.hot_fraction,
            phases: section
                .phases
                .iter()
                .map(|p| (secs_to_us(p.start_sec), p.hot_chunks.clone()))
                .collect(),
            num_chunks,
            issued: 0,
            next_arrival_us: 0,
        }
    }

    /// Time of the next arrival. The first arrival is at time zero.
    pub fn next_arrival_us(&self) -> u64 {
        self.next_arrival_us
    }

    /// Number of arrivals consumed so far.
    pub fn issued(&self) -> u64 {
        self.issued
    }

    /// Consume the pending arrival and compute the one after it.
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) -> u64 {
        self.issued += 1;
        self.next_arrival_us = match self.arrival {
            // Anchored to the start so spacing error never accumulates.
            ArrivalProcess::Fixed => {
                secs_to_us(self.issued as f64 / self.request_rate)
            }
            ArrivalProcess::Poisson => {
                let u: f64 = rng.gen();
                let gap_secs = -(1.0 - u).ln() / self.request_rate;
                self.next_arrival_us + secs_to_us(gap_secs)
            }
        };
        self.next_arrival_us
    }

    /// Hot set in effect at `now_us`.
    pub fn hot_set_at(&self, now_us: u64) -> &[ChunkId] {
        self.phases
            .iter()
            .rev()
            .find(|(start, _)| *start <= now_us)
            .map(|(_, chunks)| chunks.as_slice())
            .unwrap_or(&[])
    }

    /// Pick the target chunk for a request arriving at `now_us`.
    pub fn pick_chunk<R: Rng + ?Sized>(&self, now_us: u64, rng: &mut R) -> ChunkId {
        let hot = self.hot_set_at(now_us);
        if rng.gen::<f64>() < self.hot_fraction {
            if let Some(&chunk) = hot.choose(rng) {
                return chunk;
            }
        }
        rng.gen_range(0..self.num_chunks)
    }
}
