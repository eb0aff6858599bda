//! TOML configuration parsing for ShardSim.
//!
//! Defines the complete configuration schema for simulation runs: run
//! parameters, cluster shape and service model, workload, metrics sampling,
//! and policy tuning. Every field has a default, so an empty document yields
//! the reference scenario (4 nodes, 64 chunks, 220 req/s for 400 s).

use std::path::Path;

use serde::{Deserialize, Serialize};
use shardsim_policies::PolicyParams;
use thiserror::Error;

use crate::clock::secs_to_us;
use crate::node::ServiceModel;
use crate::workload::{default_phases, ArrivalProcess, HotPhase};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub simulation: SimulationSection,
    #[serde(default)]
    pub cluster: ClusterSection,
    #[serde(default)]
    pub workload: WorkloadSection,
    #[serde(default)]
    pub metrics: MetricsSection,
    #[serde(default)]
    pub policy: PolicyParams,
}

/// General simulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSection {
    /// Human-readable name for this simulation.
    #[serde(default = "default_sim_name")]
    pub name: String,
    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Simulated run length.
    #[serde(default = "default_duration")]
    pub duration_sec: f64,
}

fn default_sim_name() -> String {
    "simulation".to_string()
}

fn default_seed() -> u64 {
    42
}

fn default_duration() -> f64 {
    400.0
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            name: default_sim_name(),
            seed: default_seed(),
            duration_sec: default_duration(),
        }
    }
}

/// Cluster shape, service model and migration timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSection {
    #[serde(default = "default_num_nodes")]
    pub num_nodes: u32,
    #[serde(default = "default_num_chunks")]
    pub num_chunks: u32,
    #[serde(default = "default_base_service")]
    pub base_service_time_ms: f64,
    /// Half-width of the uniform service-time jitter.
    #[serde(default = "default_jitter")]
    pub service_jitter_ms: f64,
    #[serde(default = "default_overhead")]
    pub service_overhead_ms: f64,
    /// How long a migration takes from acceptance to ownership transfer.
    #[serde(default = "default_migration_time")]
    pub migration_time_sec: f64,
    /// How long a chunk must stay put after a completed migration.
    #[serde(default = "default_cooldown")]
    pub migration_cooldown_sec: f64,
}

fn default_num_nodes() -> u32 {
    4
}
fn default_num_chunks() -> u32 {
    64
}
fn default_base_service() -> f64 {
    8.0
}
fn default_jitter() -> f64 {
    0.5
}
fn default_overhead() -> f64 {
    0.1
}
fn default_migration_time() -> f64 {
    3.0
}
fn default_cooldown() -> f64 {
    25.0
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            num_nodes: default_num_nodes(),
            num_chunks: default_num_chunks(),
            base_service_time_ms: default_base_service(),
            service_jitter_ms: default_jitter(),
            service_overhead_ms: default_overhead(),
            migration_time_sec: default_migration_time(),
            migration_cooldown_sec: default_cooldown(),
        }
    }
}

/// Request arrival process and hot-spot phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSection {
    /// Requests per simulated second.
    #[serde(default = "default_rate")]
    pub request_rate: f64,
    #[serde(default)]
    pub arrival: ArrivalProcess,
    /// Share of requests aimed at the current phase's hot set.
    #[serde(default = "default_hot_fraction")]
    pub hot_fraction: f64,
    #[serde(default = "default_phases")]
    pub phases: Vec<HotPhase>,
}

fn default_rate() -> f64 {
    220.0
}
fn default_hot_fraction() -> f64 {
    0.35
}

impl Default for WorkloadSection {
    fn default() -> Self {
        Self {
            request_rate: default_rate(),
            arrival: ArrivalProcess::default(),
            hot_fraction: default_hot_fraction(),
            phases: default_phases(),
        }
    }
}

/// Periodic sampling of p99 and node loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSection {
    #[serde(default = "default_sample_interval")]
    pub sample_interval_sec: f64,
    /// Number of most recent responses each p99 sample covers.
    #[serde(default = "default_sample_window")]
    pub sample_window: usize,
    /// No p99 is sampled until this many responses exist.
    #[serde(default = "default_sample_min")]
    pub sample_min_samples: usize,
    /// Steady-state p99 averages only samples taken after this time.
    #[serde(default = "default_steady_after")]
    pub steady_state_after_sec: f64,
    /// Interval of the progress log line.
    #[serde(default = "default_log_interval")]
    pub log_interval_sec: f64,
}

fn default_sample_interval() -> f64 {
    10.0
}
fn default_sample_window() -> usize {
    1500
}
fn default_sample_min() -> usize {
    100
}
fn default_steady_after() -> f64 {
    80.0
}
fn default_log_interval() -> f64 {
    60.0
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            sample_interval_sec: default_sample_interval(),
            sample_window: default_sample_window(),
            sample_min_samples: default_sample_min(),
            steady_state_after_sec: default_steady_after(),
            log_interval_sec: default_log_interval(),
        }
    }
}

impl SimConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.cluster;
        if c.num_nodes == 0 {
            return Err(ConfigError::Validation(
                "num_nodes must be > 0".to_string(),
            ));
        }
        if c.num_chunks == 0 {
            return Err(ConfigError::Validation(
                "num_chunks must be > 0".to_string(),
            ));
        }
        if c.base_service_time_ms <= 0.0 {
            return Err(ConfigError::Validation(
                "base_service_time_ms must be > 0".to_string(),
            ));
        }
        if c.service_jitter_ms < 0.0 || c.service_overhead_ms < 0.0 {
            return Err(ConfigError::Validation(
                "service_jitter_ms and service_overhead_ms must be >= 0".to_string(),
            ));
        }
        if c.service_jitter_ms >= c.base_service_time_ms {
            return Err(ConfigError::Validation(format!(
                "service_jitter_ms ({}) must be below base_service_time_ms ({})",
                c.service_jitter_ms, c.base_service_time_ms
            )));
        }
        if c.migration_time_sec < 0.0 || c.migration_cooldown_sec < 0.0 {
            return Err(ConfigError::Validation(
                "migration_time_sec and migration_cooldown_sec must be >= 0".to_string(),
            ));
        }
        if self.simulation.duration_sec <= 0.0 {
            return Err(ConfigError::Validation(
                "duration_sec must be > 0".to_string(),
            ));
        }

        let w = &self.workload;
        if w.request_rate <= 0.0 {
            return Err(ConfigError::Validation(
                "request_rate must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&w.hot_fraction) {
            return Err(ConfigError::Validation(format!(
                "hot_fraction must be in [0, 1], got {}",
                w.hot_fraction
            )));
        }
        if w.phases.windows(2).any(|p| p[0].start_sec >= p[1].start_sec) {
            return Err(ConfigError::Validation(
                "workload phases must have strictly ascending start_sec".to_string(),
            ));
        }
        for phase in &w.phases {
            if let Some(&chunk) = phase.hot_chunks.iter().find(|&&c| c >= self.cluster.num_chunks) {
                return Err(ConfigError::Validation(format!(
                    "hot chunk {} out of range (num_chunks = {})",
                    chunk, self.cluster.num_chunks
                )));
            }
        }

        let m = &self.metrics;
        if m.sample_interval_sec <= 0.0 || m.log_interval_sec <= 0.0 {
            return Err(ConfigError::Validation(
                "sample_interval_sec and log_interval_sec must be > 0".to_string(),
            ));
        }

        self.policy.validate().map_err(ConfigError::Validation)
    }

    /// Service time model for every node.
    pub fn service_model(&self) -> ServiceModel {
        ServiceModel {
            base_ms: self.cluster.base_service_time_ms,
            jitter_ms: self.cluster.service_jitter_ms,
            overhead_ms: self.cluster.service_overhead_ms,
        }
    }

    /// Requests per second one node can serve at the base service time.
    pub fn node_capacity_rps(&self) -> f64 {
        1000.0 / self.cluster.base_service_time_ms
    }

    pub fn total_capacity_rps(&self) -> f64 {
        self.node_capacity_rps() * self.cluster.num_nodes as f64
    }

    /// Offered load as a fraction of total capacity.
    pub fn utilization(&self) -> f64 {
        self.workload.request_rate / self.total_capacity_rps()
    }

    pub fn duration_us(&self) -> u64 {
        secs_to_us(self.simulation.duration_sec)
    }
}
