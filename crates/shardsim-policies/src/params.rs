//! Tunable parameters for the built-in policies.
//!
//! These are deserialized from the `[policy.*]` tables of the simulation
//! config; every field has a default matching the reference scenario.

use serde::{Deserialize, Serialize};

/// Parameters for every built-in policy, grouped by policy family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyParams {
    #[serde(default)]
    pub reactive: ReactiveParams,
    #[serde(default)]
    pub proactive: ProactiveParams,
    #[serde(default)]
    pub q_table: QTableParams,
}

impl PolicyParams {
    /// Check parameter consistency. Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.reactive.check_interval_sec <= 0.0 {
            return Err("policy.reactive.check_interval_sec must be > 0".to_string());
        }
        let p = &self.proactive;
        if p.check_interval_sec <= 0.0 {
            return Err("policy.proactive.check_interval_sec must be > 0".to_string());
        }
        if p.warmup_sec < 0.0 {
            return Err("policy.proactive.warmup_sec must be >= 0".to_string());
        }
        if p.latency_rewards.len() != p.latency_thresholds_ms.len() + 1 {
            return Err(format!(
                "policy.proactive.latency_rewards needs {} values for {} thresholds, got {}",
                p.latency_thresholds_ms.len() + 1,
                p.latency_thresholds_ms.len(),
                p.latency_rewards.len(),
            ));
        }
        if !is_ascending(&p.latency_thresholds_ms) {
            return Err("policy.proactive.latency_thresholds_ms must be ascending".to_string());
        }
        let q = &self.q_table;
        for (name, value) in [("alpha", q.alpha), ("gamma", q.gamma), ("epsilon", q.epsilon)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("policy.q_table.{name} must be in [0, 1], got {value}"));
            }
        }
        q.coarse.validate("coarse")?;
        q.fine.validate("fine")?;
        Ok(())
    }
}

/// Reactive (threshold-triggered) policy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactiveParams {
    /// Seconds between checks; the first check happens after one interval.
    #[serde(default = "default_reactive_interval")]
    pub check_interval_sec: f64,
    /// Minimum imbalance (exclusive) that triggers a migration.
    #[serde(default = "default_reactive_threshold")]
    pub threshold: u32,
}

fn default_reactive_interval() -> f64 {
    45.0
}
fn default_reactive_threshold() -> u32 {
    5
}

impl Default for ReactiveParams {
    fn default() -> Self {
        Self {
            check_interval_sec: default_reactive_interval(),
            threshold: default_reactive_threshold(),
        }
    }
}

/// Control-loop and reward parameters shared by every learning policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveParams {
    /// Seconds before the first observation.
    #[serde(default = "default_warmup")]
    pub warmup_sec: f64,
    /// Seconds between ticks after warmup.
    #[serde(default = "default_proactive_interval")]
    pub check_interval_sec: f64,
    /// Reward penalty per chunk moved, charged on the following tick.
    #[serde(default = "default_migration_cost")]
    pub migration_cost: f64,
    /// Upper bound on chunks moved by one migrate action.
    #[serde(default = "default_max_migrations")]
    pub max_migrations_per_cycle: usize,
    /// A migrate action only moves chunks when the load gap exceeds this.
    #[serde(default = "default_min_gap")]
    pub min_migration_gap: u32,
    /// Reward penalty per unit of imbalance.
    #[serde(default = "default_penalty_factor")]
    pub imbalance_penalty_factor: f64,
    /// Number of most recent response times the latency term looks at.
    #[serde(default = "default_reward_window")]
    pub reward_window: usize,
    /// Below this many samples the latency term is omitted.
    #[serde(default = "default_reward_min_samples")]
    pub reward_min_samples: usize,
    /// Upper bounds (exclusive, ms) of each p99 bracket.
    #[serde(default = "default_latency_thresholds")]
    pub latency_thresholds_ms: Vec<f64>,
    /// Reward per bracket; one more entry than `latency_thresholds_ms`.
    #[serde(default = "default_latency_rewards")]
    pub latency_rewards: Vec<f64>,
}

fn default_warmup() -> f64 {
    15.0
}
fn default_proactive_interval() -> f64 {
    10.0
}
fn default_migration_cost() -> f64 {
    2.0
}
fn default_max_migrations() -> usize {
    2
}
fn default_min_gap() -> u32 {
    2
}
fn default_penalty_factor() -> f64 {
    1.5
}
fn default_reward_window() -> usize {
    1000
}
fn default_reward_min_samples() -> usize {
    200
}
fn default_latency_thresholds() -> Vec<f64> {
    vec![30.0, 50.0, 100.0, 200.0]
}
fn default_latency_rewards() -> Vec<f64> {
    vec![15.0, 5.0, -5.0, -10.0, -20.0]
}

impl Default for ProactiveParams {
    fn default() -> Self {
        Self {
            warmup_sec: default_warmup(),
            check_interval_sec: default_proactive_interval(),
            migration_cost: default_migration_cost(),
            max_migrations_per_cycle: default_max_migrations(),
            min_migration_gap: default_min_gap(),
            imbalance_penalty_factor: default_penalty_factor(),
            reward_window: default_reward_window(),
            reward_min_samples: default_reward_min_samples(),
            latency_thresholds_ms: default_latency_thresholds(),
            latency_rewards: default_latency_rewards(),
        }
    }
}

impl ProactiveParams {
    /// Step-function reward for an observed p99 latency.
    pub fn latency_reward(&self, p99_ms: f64) -> f64 {
        let bracket = self
            .latency_thresholds_ms
            .iter()
            .position(|&t| p99_ms < t)
            .unwrap_or(self.latency_thresholds_ms.len());
        self.latency_rewards.get(bracket).copied().unwrap_or(0.0)
    }
}

/// Q-learning hyperparameters and the two discretization presets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QTableParams {
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Bins used by `q_table`.
    #[serde(default = "BinBounds::coarse")]
    pub coarse: BinBounds,
    /// Bins used by `q_table_large`.
    #[serde(default = "BinBounds::fine")]
    pub fine: BinBounds,
}

fn default_alpha() -> f64 {
    0.1
}
fn default_gamma() -> f64 {
    0.7
}
fn default_epsilon() -> f64 {
    0.1
}

impl Default for QTableParams {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            gamma: default_gamma(),
            epsilon: default_epsilon(),
            coarse: BinBounds::coarse(),
            fine: BinBounds::fine(),
        }
    }
}

/// Bin boundaries for state discretization.
///
/// `load` and `imbalance` produce levels `1..=len+1`; `velocity` bounds are
/// positive magnitudes applied symmetrically around zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinBounds {
    pub load: Vec<f64>,
    pub imbalance: Vec<f64>,
    pub velocity: Vec<f64>,
}

impl BinBounds {
    /// 4 × 3 × 3 × 3 = 108 states.
    pub fn coarse() -> Self {
        Self {
            load: vec![3.0, 7.0, 12.0],
            imbalance: vec![2.0, 6.0],
            velocity: vec![1.0],
        }
    }

    /// 8 × 7 × 5 × 5 = 1400 states.
    pub fn fine() -> Self {
        Self {
            load: vec![2.0, 4.0, 6.0, 8.0, 10.0, 13.0, 16.0],
            imbalance: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            velocity: vec![0.5, 2.0],
        }
    }

    fn validate(&self, preset: &str) -> Result<(), String> {
        for (axis, bounds) in [
            ("load", &self.load),
            ("imbalance", &self.imbalance),
            ("velocity", &self.velocity),
        ] {
            if bounds.len() > MAX_BIN_BOUNDS {
                return Err(format!(
                    "policy.q_table.{preset}.{axis} has {} bounds, at most {MAX_BIN_BOUNDS} allowed",
                    bounds.len()
                ));
            }
            if !is_ascending(bounds) {
                return Err(format!(
                    "policy.q_table.{preset}.{axis} bounds must be strictly ascending"
                ));
            }
        }
        if self.velocity.iter().any(|&b| b < 0.0) {
            return Err(format!(
                "policy.q_table.{preset}.velocity bounds must be non-negative"
            ));
        }
        Ok(())
    }
}

/// Bound count per axis that keeps every level within the `i8`/`u8` state keys.
pub const MAX_BIN_BOUNDS: usize = 100;

fn is_ascending(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}
