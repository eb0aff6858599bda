//! Cluster state: nodes, the chunk→node map, and the migration lifecycle.
//!
//! The chunk map is the single source of truth for ownership; each node's
//! chunk set mirrors it. Both are only changed when a migration completes.
//!
//! A migration goes `Stable → InMigration → Stable`:
//!
//! - [`Cluster::begin_migration`] validates the request (distinct nodes,
//!   chunk owned by the source, chunk eligible) and marks the chunk. Invalid
//!   requests are dropped without a trace.
//! - [`Cluster::complete_migration`] runs `migration_time` later. It moves the
//!   chunk only if the source still owns it, then always clears the marker.

use std::collections::{BTreeMap, HashMap};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use shardsim_policies::{ChunkId, NodeId};
use tracing::debug;

use crate::clock::secs_to_us;
use crate::config::ClusterSection;
use crate::metrics::MetricsCollector;
use crate::node::Node;

/// Migration state of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    Stable,
    InMigration,
}

/// How a migration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationOutcome {
    /// Ownership moved to the target node.
    Moved,
    /// The source no longer owned the chunk; nothing changed.
    Skipped,
}

/// Audit record of one accepted migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub chunk_id: ChunkId,
    pub from: NodeId,
    pub to: NodeId,
    pub label: String,
    pub accepted_us: u64,
    pub completed_us: Option<u64>,
    pub outcome: Option<MigrationOutcome>,
}

#[derive(Debug, Clone)]
struct InFlight {
    from: NodeId,
    to: NodeId,
    record: usize,
}

pub struct Cluster {
    nodes: Vec<Node>,
    chunk_map: Vec<NodeId>,
    in_migration: BTreeMap<ChunkId, InFlight>,
    last_migrated_us: HashMap<ChunkId, u64>,
    migration_time_us: u64,
    migration_cooldown_us: u64,
    history: Vec<MigrationRecord>,
}

impl Cluster {
    /// Build a cluster with chunks placed round-robin: chunk `c` starts on
    /// node `c % num_nodes`.
    pub fn new(
        num_nodes: u32,
        num_chunks: u32,
        migration_time_us: u64,
        migration_cooldown_us: u64,
    ) -> Self {
        let mut nodes: Vec<Node> = (0..num_nodes).map(Node::new).collect();
        let mut chunk_map = Vec::with_capacity(num_chunks as usize);
        for chunk in 0..num_chunks {
            let owner = chunk % num_nodes.max(1);
            if let Some(node) = nodes.get_mut(owner as usize) {
                node.add_chunk(chunk);
            }
            chunk_map.push(owner);
        }
        Self {
            nodes,
            chunk_map,
            in_migration: BTreeMap::new(),
            last_migrated_us: HashMap::new(),
            migration_time_us,
            migration_cooldown_us,
            history: Vec::new(),
        }
    }

    pub fn from_config(cluster: &ClusterSection) -> Self {
        Self::new(
            cluster.num_nodes,
            cluster.num_chunks,
            secs_to_us(cluster.migration_time_sec),
            secs_to_us(cluster.migration_cooldown_sec),
        )
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(node_id as usize)
    }

    pub(crate) fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(node_id as usize)
    }

    pub fn num_nodes(&self) -> u32 {
        self.nodes.len() as u32
    }

    pub fn num_chunks(&self) -> u32 {
        self.chunk_map.len() as u32
    }

    pub fn migration_time_us(&self) -> u64 {
        self.migration_time_us
    }

    /// Current owner of `chunk_id`.
    pub fn node_for_chunk(&self, chunk_id: ChunkId) -> Option<NodeId> {
        self.chunk_map.get(chunk_id as usize).copied()
    }

    /// Queue length of every node.
    pub fn node_loads(&self) -> BTreeMap<NodeId, u32> {
        self.nodes.iter().map(|n| (n.id, n.load())).collect()
    }

    /// A minimum-load node, chosen uniformly among ties.
    pub fn least_loaded_node<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<NodeId> {
        let min = self.nodes.iter().map(Node::load).min()?;
        let candidates: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.load() == min)
            .map(|n| n.id)
            .collect();
        candidates.choose(rng).copied()
    }

    pub fn migration_status(&self, chunk_id: ChunkId) -> MigrationStatus {
        if self.in_migration.contains_key(&chunk_id) {
            MigrationStatus::InMigration
        } else {
            MigrationStatus::Stable
        }
    }

    /// False while the chunk is moving or within the cooldown window after
    /// its last completed move.
    pub fn can_migrate_chunk(&self, chunk_id: ChunkId, now_us: u64) -> bool {
        if self.in_migration.contains_key(&chunk_id) {
            return false;
        }
        match self.last_migrated_us.get(&chunk_id) {
            Some(&at) => now_us.saturating_sub(at) >= self.migration_cooldown_us,
            None => true,
        }
    }

    /// Up to `limit` eligible chunks on `node_id`, by request count descending
    /// and chunk id ascending.
    pub fn hottest_chunks(&self, node_id: NodeId, limit: usize, now_us: u64) -> Vec<ChunkId> {
        let Some(node) = self.node(node_id) else {
            return Vec::new();
        };
        let mut eligible: Vec<(u64, ChunkId)> = node
            .chunks()
            .iter()
            .copied()
            .filter(|&c| self.can_migrate_chunk(c, now_us))
            .map(|c| (node.request_count(c), c))
            .collect();
        eligible.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        eligible.into_iter().take(limit).map(|(_, c)| c).collect()
    }

    pub fn hottest_chunk(&self, node_id: NodeId, now_us: u64) -> Option<ChunkId> {
        self.hottest_chunks(node_id, 1, now_us).into_iter().next()
    }

    /// Accept a migration if it is valid. Returns the completion time, or
    /// `None` if the request was ignored.
    pub fn begin_migration(
        &mut self,
        chunk_id: ChunkId,
        from: NodeId,
        to: NodeId,
        label: &str,
        now_us: u64,
        metrics: &mut MetricsCollector,
    ) -> Option<u64> {
        if from == to
            || self.node(to).is_none()
            || self.node_for_chunk(chunk_id) != Some(from)
            || !self.can_migrate_chunk(chunk_id, now_us)
        {
            return None;
        }

        metrics.record_migration(label);
        self.history.push(MigrationRecord {
            chunk_id,
            from,
            to,
            label: label.to_string(),
            accepted_us: now_us,
            completed_us: None,
            outcome: None,
        });
        self.in_migration.insert(
            chunk_id,
            InFlight {
                from,
                to,
                record: self.history.len() - 1,
            },
        );
        debug!(chunk_id, from, to, label, t_us = now_us, "migration accepted");
        Some(now_us + self.migration_time_us)
    }

    /// Finish the in-flight migration of `chunk_id`. Returns `None` if the
    /// chunk was not migrating.
    pub fn complete_migration(
        &mut self,
        chunk_id: ChunkId,
        now_us: u64,
    ) -> Option<MigrationOutcome> {
        let flight = self.in_migration.remove(&chunk_id)?;
        let outcome = if self.node_for_chunk(chunk_id) == Some(flight.from) {
            self.transfer(chunk_id, flight.from, flight.to);
            self.last_migrated_us.insert(chunk_id, now_us);
            debug!(chunk_id, from = flight.from, to = flight.to, t_us = now_us, "migration completed");
            MigrationOutcome::Moved
        } else {
            debug!(chunk_id, from = flight.from, to = flight.to, "migration skipped: source no longer owns chunk");
            MigrationOutcome::Skipped
        };
        if let Some(record) = self.history.get_mut(flight.record) {
            record.completed_us = Some(now_us);
            record.outcome = Some(outcome);
        }
        Some(outcome)
    }

    fn transfer(&mut self, chunk_id: ChunkId, from: NodeId, to: NodeId) {
        if let Some(source) = self.node_mut(from) {
            source.remove_chunk(chunk_id);
            source.reset_request_count(chunk_id);
        }
        if let Some(target) = self.node_mut(to) {
            target.add_chunk(chunk_id);
        }
        if let Some(owner) = self.chunk_map.get_mut(chunk_id as usize) {
            *owner = to;
        }
    }

    pub fn in_migration_count(&self) -> usize {
        self.in_migration.len()
    }

    /// Every accepted migration, in acceptance order.
    pub fn migration_history(&self) -> &[MigrationRecord] {
        &self.history
    }

    /// Every chunk is owned by exactly one node, and that node is the one the
    /// chunk map names.
    pub fn ownership_consistent(&self) -> bool {
        self.chunk_map.iter().enumerate().all(|(chunk, &owner)| {
            let chunk = chunk as ChunkId;
            self.nodes
                .iter()
                .filter(|n| n.owns(chunk))
                .map(|n| n.id)
                .eq(std::iter::once(owner))
        }) && self.nodes.iter().map(|n| n.chunks().len()).sum::<usize>() == self.chunk_map.len()
    }

    /// Move a chunk immediately, bypassing the migration lifecycle.
    #[cfg(test)]
    pub(crate) fn force_owner(&mut self, chunk_id: ChunkId, to: NodeId) {
        if let Some(from) = self.node_for_chunk(chunk_id) {
            self.transfer(chunk_id, from, to);
        }
    }
}
