//! Balancing policy trait definitions.
//!
//! All balancing policies implement the [`BalancingPolicy`] trait. On each of
//! its periodic checks a policy reads the cluster through a [`ClusterView`]
//! and answers with a [`BalancingDecision`] that the simulator executes.

use std::collections::HashMap;

/// Identifier of a simulated cluster node.
pub type NodeId = u32;

/// Identifier of a chunk, in `[0, num_chunks)`.
pub type ChunkId = u32;

/// Queue length of one node at the moment of observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLoad {
    pub node_id: NodeId,
    pub load: u32,
}

/// Read (and narrowly act) interface a policy gets over the live cluster.
///
/// This is the policies crate's view of the simulation: it exposes only what
/// a balancing decision needs, not the engine state itself.
pub trait ClusterView {
    /// Current simulated time in seconds.
    fn now_secs(&self) -> f64;

    /// Queue length of every node, ordered by node id.
    fn node_loads(&self) -> Vec<NodeLoad>;

    /// Node with the minimum load. Ties are broken uniformly at random, which
    /// is why this takes `&mut self`.
    fn least_loaded_node(&mut self) -> Option<NodeId>;

    /// Up to `limit` distinct migration-eligible chunks owned by `node_id`,
    /// hottest first.
    fn hottest_chunks(&self, node_id: NodeId, limit: usize) -> Vec<ChunkId>;

    /// Hottest migration-eligible chunk owned by `node_id`.
    fn hottest_chunk(&self, node_id: NodeId) -> Option<ChunkId> {
        self.hottest_chunks(node_id, 1).into_iter().next()
    }

    /// Percentile over the most recent `window` response times, or `None`
    /// when fewer than `min_samples` are available.
    fn recent_percentile(&self, window: usize, pct: f64, min_samples: usize) -> Option<f64>;
}

/// A single chunk move requested by a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationOrder {
    pub chunk_id: ChunkId,
    pub from: NodeId,
    pub to: NodeId,
}

/// Decision returned by a balancing policy for one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalancingDecision {
    /// Leave placement unchanged this cycle.
    Hold,
    /// Start the listed migrations, in order.
    Migrate(Vec<MigrationOrder>),
}

impl BalancingDecision {
    /// Migrations requested by this decision (empty for `Hold`).
    pub fn orders(&self) -> &[MigrationOrder] {
        match self {
            BalancingDecision::Hold => &[],
            BalancingDecision::Migrate(orders) => orders,
        }
    }
}

/// The core balancing policy trait.
///
/// The simulator first calls [`on_check`](BalancingPolicy::on_check) at
/// `first_check_secs`, then every `check_interval_secs` until the run ends.
pub trait BalancingPolicy: Send {
    /// Label used for migration metrics and reports.
    fn name(&self) -> &str;

    /// Simulated delay before the first check.
    fn first_check_secs(&self) -> f64;

    /// Simulated delay between consecutive checks.
    fn check_interval_secs(&self) -> f64;

    /// Observe the cluster and decide what to migrate.
    fn on_check(&mut self, view: &mut dyn ClusterView) -> BalancingDecision;

    /// Optional: policy-specific metrics to include in the run summary.
    fn custom_metrics(&self) -> HashMap<String, f64> {
        HashMap::new()
    }
}

/// The most loaded node; ties go to the lowest node id.
pub fn most_loaded(loads: &[NodeLoad]) -> Option<NodeLoad> {
    loads.iter().copied().fold(None, |best, l| match best {
        Some(b) if b.load >= l.load => Some(b),
        _ => Some(l),
    })
}

/// Difference between the most and least loaded node.
pub fn imbalance(loads: &[NodeLoad]) -> u32 {
    let max = loads.iter().map(|l| l.load).max().unwrap_or(0);
    let min = loads.iter().map(|l| l.load).min().unwrap_or(0);
    max - min
}
