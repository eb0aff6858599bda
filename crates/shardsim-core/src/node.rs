//! Simulated storage node with a single-slot service queue.
//!
//! Each [`Node`] serves one request at a time. Requests that arrive while the
//! slot is busy wait in FIFO order; queueing delay comes only from that
//! serialization. The node also keeps per-chunk request counters that
//! balancing policies use to find hot chunks.

use std::collections::{BTreeSet, HashMap, VecDeque};

use rand::Rng;
use serde::{Deserialize, Serialize};
use shardsim_policies::{ChunkId, NodeId};

use crate::clock::ms_to_us;
use crate::metrics::MetricsCollector;
use crate::request::Request;

/// Service time model: base time plus symmetric uniform jitter plus a fixed
/// per-request overhead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceModel {
    pub base_ms: f64,
    pub jitter_ms: f64,
    pub overhead_ms: f64,
}

impl ServiceModel {
    /// Draw one service time in microseconds.
    pub fn sample_us<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        let jitter = if self.jitter_ms > 0.0 {
            rng.gen_range(-self.jitter_ms..=self.jitter_ms)
        } else {
            0.0
        };
        ms_to_us(self.base_ms + jitter + self.overhead_ms)
    }

    /// Expected service time in milliseconds.
    pub fn mean_ms(&self) -> f64 {
        self.base_ms + self.overhead_ms
    }
}

impl Default for ServiceModel {
    fn default() -> Self {
        Self {
            base_ms: 8.0,
            jitter_ms: 0.5,
            overhead_ms: 0.1,
        }
    }
}

/// A simulated node.
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique node identifier.
    pub id: NodeId,
    chunks: BTreeSet<ChunkId>,
    chunk_requests: HashMap<ChunkId, u64>,
    waiting: VecDeque<Request>,
    in_service: Option<Request>,
    service_started_us: u64,
    // --- Counters ---
    /// Total requests served since start.
    pub total_requests_served: u64,
    /// Accumulated time the service slot was busy.
    pub busy_time_us: u64,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            chunks: BTreeSet::new(),
            chunk_requests: HashMap::new(),
            waiting: VecDeque::new(),
            in_service: None,
            service_started_us: 0,
            total_requests_served: 0,
            busy_time_us: 0,
        }
    }

    /// Chunks currently owned, in ascending id order.
    pub fn chunks(&self) -> &BTreeSet<ChunkId> {
        &self.chunks
    }

    pub fn owns(&self, chunk_id: ChunkId) -> bool {
        self.chunks.contains(&chunk_id)
    }

    pub(crate) fn add_chunk(&mut self, chunk_id: ChunkId) {
        self.chunks.insert(chunk_id);
    }

    pub(crate) fn remove_chunk(&mut self, chunk_id: ChunkId) {
        self.chunks.remove(&chunk_id);
    }

    /// Number of requests waiting for the service slot. The request being
    /// served is not counted.
    pub fn load(&self) -> u32 {
        self.waiting.len() as u32
    }

    pub fn is_busy(&self) -> bool {
        self.in_service.is_some()
    }

    /// Queue one request. Returns true when the service slot is idle and the
    /// caller must start service.
    pub fn enqueue(&mut self, request: Request) -> bool {
        self.waiting.push_back(request);
        !self.is_busy()
    }

    /// Move the head of the queue into the service slot. Returns false if the
    /// slot is occupied or nothing is waiting.
    pub fn start_next(&mut self, now_us: u64) -> bool {
        if self.is_busy() {
            return false;
        }
        match self.waiting.pop_front() {
            Some(request) => {
                self.in_service = Some(request);
                self.service_started_us = now_us;
                true
            }
            None => false,
        }
    }

    /// Complete the request in service: record its response time and count it
    /// against its chunk.
    pub fn finish_service(
        &mut self,
        now_us: u64,
        metrics: &mut MetricsCollector,
    ) -> Option<Request> {
        let request = self.in_service.take()?;
        metrics.record_response(request.response_time_ms(now_us));
        *self.chunk_requests.entry(request.chunk_id).or_insert(0) += 1;
        self.total_requests_served += 1;
        self.busy_time_us += now_us.saturating_sub(self.service_started_us);
        Some(request)
    }

    /// Requests completed for `chunk_id` since it last arrived on this node.
    pub fn request_count(&self, chunk_id: ChunkId) -> u64 {
        self.chunk_requests.get(&chunk_id).copied().unwrap_or(0)
    }

    pub(crate) fn reset_request_count(&mut self, chunk_id: ChunkId) {
        self.chunk_requests.remove(&chunk_id);
    }

    /// Fraction of `elapsed_us` the service slot was busy.
    pub fn utilization(&self, elapsed_us: u64) -> f64 {
        if elapsed_us == 0 {
            return 0.0;
        }
        self.busy_time_us as f64 / elapsed_us as f64
    }
}
