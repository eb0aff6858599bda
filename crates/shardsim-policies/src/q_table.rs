//! Tabular Q-learning: state discretization, the value table, and the
//! epsilon-greedy learner that ties them together.
//!
//! States are discretized into small ordinal tuples so the table stays tiny
//! (108 states for the coarse preset, 1400 for the fine one). Entries are
//! created lazily with zero values the first time a state is touched.

use std::collections::HashMap;

use rand::{Rng, RngCore};

use crate::learner::{Action, ActionLearner, RawState, Transition, ACTION_COUNT};
use crate::params::BinBounds;

/// Discretized state key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiscreteState {
    pub load: u8,
    pub imbalance: u8,
    pub load_velocity: i8,
    pub imbalance_velocity: i8,
}

/// Maps raw observations onto [`DiscreteState`] bins.
#[derive(Debug, Clone)]
pub struct Discretizer {
    bounds: BinBounds,
}

impl Discretizer {
    pub fn new(bounds: BinBounds) -> Self {
        Self { bounds }
    }

    pub fn coarse() -> Self {
        Self::new(BinBounds::coarse())
    }

    pub fn fine() -> Self {
        Self::new(BinBounds::fine())
    }

    pub fn discretize(&self, state: &RawState) -> DiscreteState {
        DiscreteState {
            load: ordinal_level(state.max_load, &self.bounds.load),
            imbalance: ordinal_level(state.imbalance, &self.bounds.imbalance),
            load_velocity: signed_level(state.load_velocity, &self.bounds.velocity),
            imbalance_velocity: signed_level(state.imbalance_velocity, &self.bounds.velocity),
        }
    }

    /// Number of distinct keys this discretizer can produce.
    pub fn state_space_size(&self) -> usize {
        let velocity = 2 * self.bounds.velocity.len() + 1;
        (self.bounds.load.len() + 1) * (self.bounds.imbalance.len() + 1) * velocity * velocity
    }
}

/// 1 + number of bounds strictly below `value`.
fn ordinal_level(value: f64, bounds: &[f64]) -> u8 {
    let exceeded = bounds.iter().filter(|&&b| value > b).count();
    u8::try_from(exceeded).unwrap_or(u8::MAX).saturating_add(1)
}

/// Signed level: bounds exceeded upward minus bounds exceeded downward.
fn signed_level(value: f64, bounds: &[f64]) -> i8 {
    let up = bounds.iter().filter(|&&b| value > b).count() as i64;
    let down = bounds.iter().filter(|&&b| value < -b).count() as i64;
    (up - down).clamp(i8::MIN.into(), i8::MAX.into()) as i8
}

/// Lazily populated action-value table.
#[derive(Debug, Clone, Default)]
pub struct QTable {
    values: HashMap<DiscreteState, [f64; ACTION_COUNT]>,
}

impl QTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values for `state`, zeros when never touched.
    pub fn values(&self, state: &DiscreteState) -> [f64; ACTION_COUNT] {
        self.values.get(state).copied().unwrap_or([0.0; ACTION_COUNT])
    }

    fn entry(&mut self, state: DiscreteState) -> &mut [f64; ACTION_COUNT] {
        self.values.entry(state).or_insert([0.0; ACTION_COUNT])
    }

    /// Greedy action for `state`. Ties go to the lowest action index, so an
    /// untouched state picks [`Action::NoOp`].
    pub fn best_action(&mut self, state: DiscreteState) -> Action {
        let values = *self.entry(state);
        let mut best = 0;
        for (i, &v) in values.iter().enumerate().skip(1) {
            if v > values[best] {
                best = i;
            }
        }
        Action::from_index(best)
    }

    /// Bellman update of `(state, action)`. Returns the new value.
    pub fn update(
        &mut self,
        state: DiscreteState,
        action: Action,
        reward: f64,
        next_state: DiscreteState,
        alpha: f64,
        gamma: f64,
    ) -> f64 {
        let best_next = self
            .entry(next_state)
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let q = &mut self.entry(state)[action.index()];
        *q += alpha * (reward + gamma * best_next - *q);
        *q
    }

    /// Number of states touched so far.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Epsilon-greedy tabular learner.
#[derive(Debug, Clone)]
pub struct QTableLearner {
    discretizer: Discretizer,
    table: QTable,
    alpha: f64,
    gamma: f64,
    epsilon: f64,
    decisions: u64,
    explorations: u64,
    updates: u64,
}

impl QTableLearner {
    pub fn new(discretizer: Discretizer, alpha: f64, gamma: f64, epsilon: f64) -> Self {
        Self {
            discretizer,
            table: QTable::new(),
            alpha,
            gamma,
            epsilon,
            decisions: 0,
            explorations: 0,
            updates: 0,
        }
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn discretizer(&self) -> &Discretizer {
        &self.discretizer
    }
}

impl ActionLearner for QTableLearner {
    fn select_action(&mut self, state: &RawState, rng: &mut dyn RngCore) -> Action {
        let key = self.discretizer.discretize(state);
        self.decisions += 1;
        if rng.gen::<f64>() < self.epsilon {
            self.explorations += 1;
            Action::from_index(rng.gen_range(0..ACTION_COUNT))
        } else {
            self.table.best_action(key)
        }
    }

    fn learn(&mut self, transition: &Transition) {
        let state = self.discretizer.discretize(&transition.state);
        let next = self.discretizer.discretize(&transition.next_state);
        self.table.update(
            state,
            transition.action,
            transition.reward,
            next,
            self.alpha,
            self.gamma,
        );
        self.updates += 1;
    }

    fn custom_metrics(&self) -> HashMap<String, f64> {
        let mut m = HashMap::new();
        m.insert("states_visited".to_string(), self.table.len() as f64);
        m.insert(
            "state_space_size".to_string(),
            self.discretizer.state_space_size() as f64,
        );
        m.insert("decisions".to_string(), self.decisions as f64);
        m.insert("explorations".to_string(), self.explorations as f64);
        m.insert("updates".to_string(), self.updates as f64);
        m
    }
}
