//! Metrics collection and aggregation for simulation runs.
//!
//! Tracks per-request response times, migrations per policy label, and the
//! periodic p99 / node-load samples that feed steady-state latency and
//! imbalance figures in the [`RunSummary`].

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::node::Node;

/// Runs completing fewer requests than this are flagged as overloaded.
pub const MIN_REPORT_REQUESTS: u64 = 1000;

/// Percentile values for a distribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Percentiles {
    /// Compute percentiles from a slice of values.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let sorted = sorted_copy(values);
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;

        Self {
            p50: percentile_sorted(&sorted, 50.0),
            p95: percentile_sorted(&sorted, 95.0),
            p99: percentile_sorted(&sorted, 99.0),
            p999: percentile_sorted(&sorted, 99.9),
            min: sorted[0],
            max: sorted[n - 1],
            mean,
        }
    }
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// Percentile with linear interpolation between closest ranks.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// One periodic sample of cluster state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSample {
    pub time_secs: f64,
    /// Queue length per node, indexed by node id.
    pub loads: Vec<u32>,
    /// p99 of the recent window, if enough responses existed.
    pub p99_ms: Option<f64>,
}

impl LoadSample {
    pub fn imbalance(&self) -> u32 {
        let max = self.loads.iter().copied().max().unwrap_or(0);
        let min = self.loads.iter().copied().min().unwrap_or(0);
        max - min
    }
}

/// Collects raw metrics during a simulation run.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    response_times_ms: Vec<f64>,
    migrations: BTreeMap<String, u64>,
    samples: Vec<LoadSample>,
}

impl MetricsCollector {
    /// Create a new collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed request's response time.
    pub fn record_response(&mut self, latency_ms: f64) {
        self.response_times_ms.push(latency_ms);
    }

    /// Record one accepted migration under `label`.
    pub fn record_migration(&mut self, label: &str) {
        *self.migrations.entry(label.to_string()).or_insert(0) += 1;
    }

    /// Record a periodic sample.
    pub fn record_sample(&mut self, sample: LoadSample) {
        self.samples.push(sample);
    }

    /// Number of completed requests recorded.
    pub fn completed(&self) -> u64 {
        self.response_times_ms.len() as u64
    }

    pub fn response_times_ms(&self) -> &[f64] {
        &self.response_times_ms
    }

    /// Migrations recorded under `label`.
    pub fn migrations(&self, label: &str) -> u64 {
        self.migrations.get(label).copied().unwrap_or(0)
    }

    pub fn migrations_by_label(&self) -> &BTreeMap<String, u64> {
        &self.migrations
    }

    pub fn total_migrations(&self) -> u64 {
        self.migrations.values().sum()
    }

    pub fn samples(&self) -> &[LoadSample] {
        &self.samples
    }

    /// `pct` percentile of the most recent `window` response times, or `None`
    /// when fewer than `min_samples` responses exist in total.
    pub fn recent_percentile(&self, window: usize, pct: f64, min_samples: usize) -> Option<f64> {
        let n = self.response_times_ms.len();
        if n < min_samples || n == 0 || window == 0 {
            return None;
        }
        let recent = &self.response_times_ms[n.saturating_sub(window)..];
        Some(percentile_sorted(&sorted_copy(recent), pct))
    }

    /// Mean of the p99 samples taken strictly after `after_secs`.
    pub fn steady_state_p99(&self, after_secs: f64) -> Option<f64> {
        let values: Vec<f64> = self
            .samples
            .iter()
            .filter(|s| s.time_secs > after_secs)
            .filter_map(|s| s.p99_ms)
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Clear everything recorded so far.
    pub fn reset(&mut self) {
        self.response_times_ms.clear();
        self.migrations.clear();
        self.samples.clear();
    }

    /// Aggregate all metrics into a summary.
    ///
    /// A run that completed fewer than [`MIN_REPORT_REQUESTS`] requests is
    /// flagged as overloaded and its latency percentiles are left at zero.
    pub fn summarize(
        &self,
        policy: &str,
        duration_secs: f64,
        nodes: &[Node],
        custom_metrics: HashMap<String, f64>,
        steady_state_after_secs: f64,
    ) -> RunSummary {
        let completed = self.completed();
        let insufficient_data = completed < MIN_REPORT_REQUESTS;
        if insufficient_data {
            warn!(
                policy,
                completed,
                min = MIN_REPORT_REQUESTS,
                "too few completed requests; cluster overloaded or run too short"
            );
        }
        let latency = if insufficient_data {
            Percentiles::default()
        } else {
            Percentiles::from_values(&self.response_times_ms)
        };

        let imbalances: Vec<u32> = self.samples.iter().map(LoadSample::imbalance).collect();
        let avg_imbalance = if imbalances.is_empty() {
            0.0
        } else {
            imbalances.iter().map(|&i| i as f64).sum::<f64>() / imbalances.len() as f64
        };
        let max_imbalance = imbalances.iter().copied().max().unwrap_or(0);

        let per_node_requests: Vec<u64> = nodes.iter().map(|n| n.total_requests_served).collect();
        let elapsed_us = (duration_secs * 1_000_000.0) as u64;
        let per_node_utilization: Vec<f64> =
            nodes.iter().map(|n| n.utilization(elapsed_us)).collect();

        RunSummary {
            policy: policy.to_string(),
            duration_secs,
            completed_requests: completed,
            insufficient_data,
            migrations: self.migrations(policy),
            migrations_by_label: self.migrations.clone(),
            latency,
            steady_state_p99_ms: self.steady_state_p99(steady_state_after_secs),
            avg_imbalance,
            max_imbalance,
            load_cv: coefficient_of_variation(&per_node_requests),
            jains_fairness_index: jains_fairness_index(&per_node_requests),
            per_node_requests,
            per_node_utilization,
            events_processed: 0,
            custom_metrics,
        }
    }
}

/// Aggregated metrics for an entire simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Policy label.
    pub policy: String,
    /// Simulated duration in seconds.
    pub duration_secs: f64,
    pub completed_requests: u64,
    /// True when too few requests completed for the figures to mean much.
    pub insufficient_data: bool,
    /// Migrations accepted under this run's policy label.
    pub migrations: u64,
    pub migrations_by_label: BTreeMap<String, u64>,

    // Latency
    pub latency: Percentiles,
    /// Mean of periodic p99 samples after the initial transient.
    pub steady_state_p99_ms: Option<f64>,

    // Balance
    pub avg_imbalance: f64,
    pub max_imbalance: u32,
    pub per_node_requests: Vec<u64>,
    pub per_node_utilization: Vec<f64>,
    /// Coefficient of variation of requests served per node.
    pub load_cv: f64,
    pub jains_fairness_index: f64,

    pub events_processed: u64,
    /// Policy-specific metrics.
    pub custom_metrics: HashMap<String, f64>,
}

fn coefficient_of_variation(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<u64>() as f64 / n;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    variance.sqrt() / mean
}

fn jains_fairness_index(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    let n = values.len() as f64;
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    let sum_sq: f64 = values.iter().map(|&v| (v as f64).powi(2)).sum();
    if sum_sq == 0.0 {
        return 1.0;
    }
    (sum * sum) / (n * sum_sq)
}

/// Format a run summary as a pretty-printed report.
pub fn format_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n{:=<70}\n",
        format!("  {} Results  ", summary.policy)
    ));
    out.push_str(&format!(
        "  Duration: {:.1}s | Completed: {} | Migrations: {}\n",
        summary.duration_secs, summary.completed_requests, summary.migrations
    ));
    if summary.insufficient_data {
        out.push_str("  OVERLOADED: too few completed requests for latency figures\n");
        out.push_str(&format!("{:=<70}\n", ""));
        return out;
    }
    out.push_str(&format!("{:-<70}\n", "  Latency  "));
    out.push_str(&format!(
        "  Response (ms)   P50={:>8.1}  P95={:>8.1}  P99={:>8.1}  P99.9={:>8.1}\n",
        summary.latency.p50, summary.latency.p95, summary.latency.p99, summary.latency.p999
    ));
    match summary.steady_state_p99_ms {
        Some(p99) => out.push_str(&format!("  Steady-state P99: {:.1}ms\n", p99)),
        None => out.push_str("  Steady-state P99: n/a\n"),
    }
    out.push_str(&format!("{:-<70}\n", "  Balance  "));
    out.push_str(&format!(
        "  Imbalance avg={:.2} max={}  Load CV: {:.3}  Jain's index: {:.4}\n",
        summary.avg_imbalance, summary.max_imbalance, summary.load_cv, summary.jains_fairness_index,
    ));
    out.push_str(&format!("{:=<70}\n", ""));
    out
}

/// Format a comparison table of multiple policy results.
pub fn format_comparison_table(results: &[RunSummary]) -> String {
    if results.is_empty() {
        return String::from("No results to compare.\n");
    }

    let mut out = String::new();
    out.push_str(&format!("\n{:=<80}\n", "  Policy Comparison  "));
    out.push_str(&format!(
        "{:<16} {:>9} {:>9} {:>12} {:>9} {:>9} {:>10}\n",
        "Policy", "P50", "P99", "Steady P99", "Avg imb", "Max imb", "Migrations"
    ));
    out.push_str(&format!("{:-<80}\n", ""));

    for s in results {
        let steady = s
            .steady_state_p99_ms
            .map(|v| format!("{:.1}", v))
            .unwrap_or_else(|| "n/a".to_string());
        out.push_str(&format!(
            "{:<16} {:>9.1} {:>9.1} {:>12} {:>9.2} {:>9} {:>10}\n",
            s.policy,
            s.latency.p50,
            s.latency.p99,
            steady,
            s.avg_imbalance,
            s.max_imbalance,
            s.migrations,
        ));
    }
    out.push_str(&format!("{:=<80}\n", ""));
    out
}
