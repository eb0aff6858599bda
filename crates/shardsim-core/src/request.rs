//! Request model.
//!
//! A [`Request`] targets one chunk and is served by whichever node owns that
//! chunk at dispatch time.

use serde::{Deserialize, Serialize};
use shardsim_policies::ChunkId;

/// A single request flowing through the simulated cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Unique request identifier, in arrival order.
    pub id: u64,
    /// Chunk the request reads.
    pub chunk_id: ChunkId,
    /// Arrival (enqueue) time in simulation microseconds.
    pub arrival_us: u64,
}

impl Request {
    pub fn new(id: u64, chunk_id: ChunkId, arrival_us: u64) -> Self {
        Self {
            id,
            chunk_id,
            arrival_us,
        }
    }

    /// Enqueue-to-completion time in milliseconds.
    pub fn response_time_ms(&self, completed_us: u64) -> f64 {
        completed_us.saturating_sub(self.arrival_us) as f64 / 1_000.0
    }
}
