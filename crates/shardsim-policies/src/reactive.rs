//! Threshold-triggered reactive balancing.
//!
//! Every check interval, if the gap between the most and least loaded node
//! exceeds the threshold, move the hottest eligible chunk off the most loaded
//! node. At most one migration per check.

use std::collections::HashMap;

use tracing::debug;

use crate::params::ReactiveParams;
use crate::traits::{
    imbalance, most_loaded, BalancingDecision, BalancingPolicy, ClusterView, MigrationOrder,
};

pub struct Reactive {
    params: ReactiveParams,
    checks: u64,
    triggered: u64,
}

impl Reactive {
    pub fn new(params: ReactiveParams) -> Self {
        Self {
            params,
            checks: 0,
            triggered: 0,
        }
    }
}

impl Default for Reactive {
    fn default() -> Self {
        Self::new(ReactiveParams::default())
    }
}

impl BalancingPolicy for Reactive {
    fn name(&self) -> &str {
        "reactive"
    }

    fn first_check_secs(&self) -> f64 {
        self.params.check_interval_sec
    }

    fn check_interval_secs(&self) -> f64 {
        self.params.check_interval_sec
    }

    fn on_check(&mut self, view: &mut dyn ClusterView) -> BalancingDecision {
        self.checks += 1;
        let loads = view.node_loads();
        let gap = imbalance(&loads);
        let Some(from) = most_loaded(&loads) else {
            return BalancingDecision::Hold;
        };
        if gap <= self.params.threshold {
            return BalancingDecision::Hold;
        }
        self.triggered += 1;

        let Some(to) = view.least_loaded_node() else {
            return BalancingDecision::Hold;
        };
        match view.hottest_chunk(from.node_id) {
            Some(chunk_id) => {
                debug!(
                    t = view.now_secs(),
                    chunk_id,
                    from = from.node_id,
                    to,
                    gap,
                    "reactive: imbalance over threshold"
                );
                BalancingDecision::Migrate(vec![MigrationOrder {
                    chunk_id,
                    from: from.node_id,
                    to,
                }])
            }
            None => BalancingDecision::Hold,
        }
    }

    fn custom_metrics(&self) -> HashMap<String, f64> {
        let mut m = HashMap::new();
        m.insert("checks".to_string(), self.checks as f64);
        m.insert("triggered".to_string(), self.triggered as f64);
        m
    }
}
