//! Built-in chunk balancing policies for ShardSim.
//!
//! This crate provides the [`BalancingPolicy`] trait, the [`ClusterView`]
//! interface policies observe the cluster through, and the built-in policies:
//!
//! | Policy | Strategy | Label |
//! |--------|----------|-------|
//! | [`Reactive`] | Move the hottest chunk when imbalance crosses a threshold | `reactive` |
//! | [`Proactive`] + [`QTableLearner`] (coarse bins) | Tabular Q-learning, 108 states | `q_table` |
//! | [`Proactive`] + [`QTableLearner`] (fine bins) | Tabular Q-learning, 1400 states | `q_table_large` |

pub mod learner;
pub mod params;
pub mod proactive;
pub mod q_table;
pub mod reactive;
pub mod traits;

pub use learner::{Action, ActionLearner, RawState, Transition};
pub use params::{BinBounds, PolicyParams, ProactiveParams, QTableParams, ReactiveParams};
pub use proactive::{ControlPhase, Proactive};
pub use q_table::{DiscreteState, Discretizer, QTable, QTableLearner};
pub use reactive::Reactive;
pub use traits::*;

/// Create a balancing policy by name.
///
/// `seed` drives the policy's own exploration randomness.
pub fn policy_by_name(
    name: &str,
    params: &PolicyParams,
    seed: u64,
) -> Option<Box<dyn BalancingPolicy>> {
    let q = &params.q_table;
    match name {
        "reactive" => Some(Box::new(Reactive::new(params.reactive.clone()))),
        "q_table" => Some(Box::new(Proactive::new(
            name,
            params.proactive.clone(),
            QTableLearner::new(Discretizer::new(q.coarse.clone()), q.alpha, q.gamma, q.epsilon),
            seed,
        ))),
        "q_table_large" => Some(Box::new(Proactive::new(
            name,
            params.proactive.clone(),
            QTableLearner::new(Discretizer::new(q.fine.clone()), q.alpha, q.gamma, q.epsilon),
            seed,
        ))),
        _ => None,
    }
}

/// List all available built-in policy names.
pub fn available_policies() -> Vec<&'static str> {
    vec!["reactive", "q_table", "q_table_large"]
}
