//! ShardSim: discrete-event simulator for chunk placement balancing in a
//! sharded cluster.
//!
//! This crate models storage nodes with single-slot service queues, a
//! chunk→node placement table, and timed chunk migrations. Balancing policies
//! from `shardsim-policies` periodically observe the cluster and decide which
//! chunks to move.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐     ┌───────────┐     ┌──────────────┐
//! │ Workload │────▶│  Engine   │────▶│   Metrics    │
//! │(hot sets)│     │ (Events)  │     │  Collection  │
//! └──────────┘     └─────┬─────┘     └──────────────┘
//!                        │
//!                ┌───────┴───────┐
//!                │    Policy     │
//!                │  (Balancing)  │
//!                └───────┬───────┘
//!                        │ migrations
//!                ┌───────┴───────┐
//!                │    Cluster    │
//!                │  chunk → node │
//!                └───────┬───────┘
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!    ┌──────────┐  ┌──────────┐  ┌──────────┐
//!    │  Node 0  │  │  Node 1  │  │  Node N  │
//!    │  Queue   │  │  Queue   │  │  Queue   │
//!    │  Chunks  │  │  Chunks  │  │  Chunks  │
//!    └──────────┘  └──────────┘  └──────────┘
//! ```

pub mod clock;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod node;
pub mod request;
pub mod scheduler;
pub mod workload;

// Re-export key types for convenience.
pub use clock::SimClock;
pub use cluster::{Cluster, MigrationOutcome, MigrationRecord, MigrationStatus};
pub use config::{ConfigError, SimConfig};
pub use engine::{SimEvent, SimulationEngine};
pub use error::SimError;
pub use metrics::{MetricsCollector, Percentiles, RunSummary};
pub use node::{Node, ServiceModel};
pub use request::Request;
pub use scheduler::Scheduler;
pub use workload::{ArrivalProcess, HotPhase, WorkloadGenerator};

use shardsim_policies::{available_policies, policy_by_name, BalancingPolicy};

/// Run a complete simulation with the given config and a policy instance.
///
/// The config is validated before any simulated time passes.
pub fn run_with_policy(
    config: SimConfig,
    policy: Box<dyn BalancingPolicy>,
) -> Result<RunSummary, SimError> {
    config.validate()?;
    let mut engine = SimulationEngine::new(config, policy);
    Ok(engine.run())
}

/// Run a complete simulation with a built-in policy chosen by name.
///
/// An unknown name fails before any simulated time passes.
pub fn run_simulation(config: SimConfig, policy_name: &str) -> Result<RunSummary, SimError> {
    config.validate()?;
    let policy = policy_by_name(policy_name, &config.policy, config.simulation.seed).ok_or_else(
        || SimError::UnknownPolicy {
            name: policy_name.to_string(),
            available: available_policies().join(", "),
        },
    )?;
    run_with_policy(config, policy)
}

/// Run several policies on the same seeded scenario.
pub fn compare_policies(
    config: &SimConfig,
    policy_names: &[&str],
) -> Result<Vec<RunSummary>, SimError> {
    policy_names
        .iter()
        .map(|name| run_simulation(config.clone(), name))
        .collect()
}
