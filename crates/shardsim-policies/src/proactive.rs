//! Proactive learning policy: periodic observe → update → act loop.
//!
//! After a warmup period the policy observes the initial state and then, on
//! every tick:
//!
//! 1. computes the reward for the previous action (imbalance penalty, a
//!    latency bracket term, minus the migration cost charged by the previous
//!    tick),
//! 2. observes the new raw state,
//! 3. hands the transition to its [`ActionLearner`],
//! 4. asks the learner for the next action and, for a migrate action, moves up
//!    to `max_migrations_per_cycle` hot chunks off the most loaded node.
//!
//! The cost of a migrate action is only charged on the following tick.

use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::learner::{Action, ActionLearner, RawState, Transition};
use crate::params::ProactiveParams;
use crate::traits::{
    imbalance, most_loaded, BalancingDecision, BalancingPolicy, ClusterView, MigrationOrder,
};

/// Where the control loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPhase {
    Warmup,
    Learning,
}

/// State carried from one tick to the next.
#[derive(Debug, Clone, Copy)]
struct PreviousStep {
    state: RawState,
    action: Action,
    cost: f64,
}

pub struct Proactive<L: ActionLearner> {
    name: String,
    params: ProactiveParams,
    learner: L,
    rng: ChaCha8Rng,
    previous: Option<PreviousStep>,
    last_observation: Option<(f64, f64)>,
    ticks: u64,
    migrate_actions: u64,
    chunks_ordered: u64,
    total_reward: f64,
}

impl<L: ActionLearner> Proactive<L> {
    pub fn new(name: impl Into<String>, params: ProactiveParams, learner: L, seed: u64) -> Self {
        Self {
            name: name.into(),
            params,
            learner,
            rng: ChaCha8Rng::seed_from_u64(seed),
            previous: None,
            last_observation: None,
            ticks: 0,
            migrate_actions: 0,
            chunks_ordered: 0,
            total_reward: 0.0,
        }
    }

    pub fn learner(&self) -> &L {
        &self.learner
    }

    pub fn phase(&self) -> ControlPhase {
        if self.previous.is_some() {
            ControlPhase::Learning
        } else {
            ControlPhase::Warmup
        }
    }

    /// Raw state of the cluster. Velocities are differences against the
    /// previous observation, zero the first time.
    pub fn observe(&mut self, view: &dyn ClusterView) -> RawState {
        let loads = view.node_loads();
        let max_load = most_loaded(&loads).map(|l| l.load).unwrap_or(0) as f64;
        let gap = imbalance(&loads) as f64;
        let (load_velocity, imbalance_velocity) = match self.last_observation {
            Some((prev_load, prev_gap)) => (max_load - prev_load, gap - prev_gap),
            None => (0.0, 0.0),
        };
        self.last_observation = Some((max_load, gap));
        RawState {
            max_load,
            imbalance: gap,
            load_velocity,
            imbalance_velocity,
        }
    }

    /// Reward for the current cluster state, before the migration cost.
    pub fn reward(&self, view: &dyn ClusterView) -> f64 {
        let loads = view.node_loads();
        let penalty = -(imbalance(&loads) as f64) * self.params.imbalance_penalty_factor;
        match view.recent_percentile(
            self.params.reward_window,
            99.0,
            self.params.reward_min_samples,
        ) {
            Some(p99) => penalty + self.params.latency_reward(p99),
            None => penalty,
        }
    }

    /// Turn an action into migration orders. Returns the decision and the cost
    /// to charge on the next tick.
    pub fn execute_action(
        &mut self,
        action: Action,
        view: &mut dyn ClusterView,
    ) -> (BalancingDecision, f64) {
        if action == Action::NoOp {
            return (BalancingDecision::Hold, 0.0);
        }
        self.migrate_actions += 1;

        let loads = view.node_loads();
        let Some(from) = most_loaded(&loads) else {
            return (BalancingDecision::Hold, 0.0);
        };
        let Some(to) = view.least_loaded_node() else {
            return (BalancingDecision::Hold, 0.0);
        };
        let to_load = loads
            .iter()
            .find(|l| l.node_id == to)
            .map(|l| l.load)
            .unwrap_or(0);
        if from.load.saturating_sub(to_load) <= self.params.min_migration_gap {
            return (BalancingDecision::Hold, 0.0);
        }

        let orders: Vec<MigrationOrder> = view
            .hottest_chunks(from.node_id, self.params.max_migrations_per_cycle)
            .into_iter()
            .map(|chunk_id| MigrationOrder {
                chunk_id,
                from: from.node_id,
                to,
            })
            .collect();
        if orders.is_empty() {
            return (BalancingDecision::Hold, 0.0);
        }
        self.chunks_ordered += orders.len() as u64;
        let cost = self.params.migration_cost * orders.len() as f64;
        (BalancingDecision::Migrate(orders), cost)
    }
}

impl<L: ActionLearner> BalancingPolicy for Proactive<L> {
    fn name(&self) -> &str {
        &self.name
    }

    fn first_check_secs(&self) -> f64 {
        self.params.warmup_sec
    }

    fn check_interval_secs(&self) -> f64 {
        self.params.check_interval_sec
    }

    fn on_check(&mut self, view: &mut dyn ClusterView) -> BalancingDecision {
        let previous = match self.previous.take() {
            Some(p) => p,
            None => PreviousStep {
                state: self.observe(view),
                action: Action::NoOp,
                cost: 0.0,
            },
        };
        self.ticks += 1;

        let reward = self.reward(view) - previous.cost;
        self.total_reward += reward;
        let state = self.observe(view);
        self.learner.learn(&Transition {
            state: previous.state,
            action: previous.action,
            reward,
            next_state: state,
        });

        let action = self.learner.select_action(&state, &mut self.rng);
        let (decision, cost) = self.execute_action(action, view);
        debug!(
            policy = %self.name,
            t = view.now_secs(),
            reward,
            ?action,
            migrations = decision.orders().len(),
            "proactive tick"
        );

        self.previous = Some(PreviousStep {
            state,
            action,
            cost,
        });
        decision
    }

    fn custom_metrics(&self) -> HashMap<String, f64> {
        let mut m = self.learner.custom_metrics();
        m.insert("ticks".to_string(), self.ticks as f64);
        m.insert("migrate_actions".to_string(), self.migrate_actions as f64);
        m.insert("chunks_ordered".to_string(), self.chunks_ordered as f64);
        m.insert("total_reward".to_string(), self.total_reward);
        m
    }
}
