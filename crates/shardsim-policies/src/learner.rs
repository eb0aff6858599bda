//! Boundary between a learning policy's control loop and its value learner.
//!
//! [`Proactive`](crate::Proactive) owns the observe/reward/act cycle; the
//! learner behind [`ActionLearner`] only maps states to actions and absorbs
//! transitions. The tabular learner lives in [`crate::q_table`]; a neural
//! learner would plug in through the same trait using
//! [`RawState::normalized`].

use std::collections::HashMap;

use rand::RngCore;

/// Number of actions available to a learner.
pub const ACTION_COUNT: usize = 2;

/// Binary action space of the learning policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    NoOp = 0,
    Migrate = 1,
}

impl Action {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            Action::NoOp
        } else {
            Action::Migrate
        }
    }
}

/// Undiscretized observation of the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawState {
    pub max_load: f64,
    pub imbalance: f64,
    pub load_velocity: f64,
    pub imbalance_velocity: f64,
}

impl RawState {
    /// Feature vector scaled into roughly unit range.
    pub fn normalized(&self) -> [f32; 4] {
        [
            (self.max_load / 50.0) as f32,
            (self.imbalance / 50.0) as f32,
            (self.load_velocity / 10.0) as f32,
            (self.imbalance_velocity / 10.0) as f32,
        ]
    }
}

/// One step of experience handed to [`ActionLearner::learn`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub state: RawState,
    pub action: Action,
    pub reward: f64,
    pub next_state: RawState,
}

/// A value learner driven by [`Proactive`](crate::Proactive).
pub trait ActionLearner: Send {
    /// Pick an action for `state`. Exploration randomness comes from `rng`.
    fn select_action(&mut self, state: &RawState, rng: &mut dyn RngCore) -> Action;

    /// Absorb one transition.
    fn learn(&mut self, transition: &Transition);

    /// Optional: learner-specific metrics for the run summary.
    fn custom_metrics(&self) -> HashMap<String, f64> {
        HashMap::new()
    }
}
