//! Discrete-event simulation engine.
//!
//! The engine pops [`SimEvent`]s from the [`Scheduler`] in time order and
//! dispatches each to a handler. Every simulated process is a small state
//! machine that reschedules its own next step:
//!
//! | Process | Event | Reschedules |
//! |---------|-------|-------------|
//! | Workload | `RequestArrival` | next arrival |
//! | Node service | `ServiceComplete` | next queued request on that node |
//! | Migration | `MigrationComplete` | nothing |
//! | Balancing policy | `PolicyCheck` | next check |
//! | Metrics sampler | `MetricsSample` | next sample |

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use shardsim_policies::{BalancingPolicy, ChunkId, ClusterView, NodeId, NodeLoad};
use tracing::{debug, info};

use crate::clock::secs_to_us;
use crate::cluster::Cluster;
use crate::config::SimConfig;
use crate::metrics::{LoadSample, MetricsCollector, RunSummary};
use crate::node::ServiceModel;
use crate::request::Request;
use crate::scheduler::Scheduler;
use crate::workload::WorkloadGenerator;

/// Events in the discrete-event simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// The next workload request arrives.
    RequestArrival,
    /// The request in service on a node finishes.
    ServiceComplete { node_id: NodeId },
    /// An accepted migration's transfer time has elapsed.
    MigrationComplete { chunk_id: ChunkId },
    /// The balancing policy runs one check.
    PolicyCheck,
    /// Periodic p99 and load sample.
    MetricsSample,
}

/// Adapter exposing the live cluster to a policy through [`ClusterView`].
struct ClusterAdapter<'a> {
    cluster: &'a Cluster,
    metrics: &'a MetricsCollector,
    rng: &'a mut ChaCha8Rng,
    now_us: u64,
}

impl<'a> ClusterView for ClusterAdapter<'a> {
    fn now_secs(&self) -> f64 {
        self.now_us as f64 / 1_000_000.0
    }

    fn node_loads(&self) -> Vec<NodeLoad> {
        self.cluster
            .node_loads()
            .into_iter()
            .map(|(node_id, load)| NodeLoad { node_id, load })
            .collect()
    }

    fn least_loaded_node(&mut self) -> Option<NodeId> {
        self.cluster.least_loaded_node(&mut *self.rng)
    }

    fn hottest_chunks(&self, node_id: NodeId, limit: usize) -> Vec<ChunkId> {
        self.cluster.hottest_chunks(node_id, limit, self.now_us)
    }

    fn recent_percentile(&self, window: usize, pct: f64, min_samples: usize) -> Option<f64> {
        self.metrics.recent_percentile(window, pct, min_samples)
    }
}

/// The main simulation engine.
pub struct SimulationEngine {
    scheduler: Scheduler<SimEvent>,
    /// Nodes, chunk placement and migrations.
    pub cluster: Cluster,
    /// Metrics collector.
    pub metrics: MetricsCollector,
    workload: WorkloadGenerator,
    service: ServiceModel,
    /// Balancing policy.
    policy: Box<dyn BalancingPolicy>,
    rng: ChaCha8Rng,
    next_request_id: u64,
    started: bool,
    last_log_us: u64,
    /// Total events processed.
    pub events_processed: u64,
    /// Configuration.
    config: SimConfig,
}

impl SimulationEngine {
    /// Create a new simulation engine from config and policy.
    ///
    /// The config is expected to have passed [`SimConfig::validate`];
    /// [`crate::run_with_policy`] checks it before building the engine.
    pub fn new(config: SimConfig, policy: Box<dyn BalancingPolicy>) -> Self {
        Self {
            scheduler: Scheduler::new(),
            cluster: Cluster::from_config(&config.cluster),
            metrics: MetricsCollector::new(),
            workload: WorkloadGenerator::new(&config.workload, config.cluster.num_chunks),
            service: config.service_model(),
            policy,
            rng: ChaCha8Rng::seed_from_u64(config.simulation.seed),
            next_request_id: 0,
            started: false,
            last_log_us: 0,
            events_processed: 0,
            config,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn now_us(&self) -> u64 {
        self.scheduler.now_us()
    }

    pub fn now_secs(&self) -> f64 {
        self.scheduler.clock().now_secs()
    }

    /// Number of events still queued.
    pub fn pending_events(&self) -> usize {
        self.scheduler.pending()
    }

    /// Register the long-running processes. Called once, lazily.
    fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        info!(
            name = %self.config.simulation.name,
            policy = self.policy.name(),
            seed = self.config.simulation.seed,
            nodes = self.cluster.num_nodes(),
            chunks = self.cluster.num_chunks(),
            rate = self.config.workload.request_rate,
            utilization = self.config.utilization(),
            "simulation start"
        );
        self.scheduler
            .schedule_at(self.workload.next_arrival_us(), SimEvent::RequestArrival);
        self.scheduler.schedule_after(
            secs_to_us(self.policy.first_check_secs()),
            SimEvent::PolicyCheck,
        );
        self.scheduler.schedule_after(
            secs_to_us(self.config.metrics.sample_interval_sec),
            SimEvent::MetricsSample,
        );
    }

    /// Process every event due strictly before `end_us`, then leave the clock
    /// at `end_us`. May be called repeatedly with increasing end times.
    pub fn run_until(&mut self, end_us: u64) {
        self.start();
        while let Some(event) = self.scheduler.pop_before(end_us) {
            self.process_event(event);
            self.events_processed += 1;
        }
        self.scheduler.advance_to(end_us);
    }

    /// Run for the configured duration and summarize.
    pub fn run(&mut self) -> RunSummary {
        self.run_until(self.config.duration_us());
        self.summary()
    }

    /// Summary of everything recorded so far.
    pub fn summary(&self) -> RunSummary {
        let mut summary = self.metrics.summarize(
            self.policy.name(),
            self.now_secs(),
            self.cluster.nodes(),
            self.policy.custom_metrics(),
            self.config.metrics.steady_state_after_sec,
        );
        summary.events_processed = self.events_processed;
        info!(
            policy = %summary.policy,
            completed = summary.completed_requests,
            migrations = summary.migrations,
            p99_ms = summary.latency.p99,
            steady_p99_ms = ?summary.steady_state_p99_ms,
            "simulation complete"
        );
        summary
    }

    /// Process a single event.
    fn process_event(&mut self, event: SimEvent) {
        match event {
            SimEvent::RequestArrival => self.handle_arrival(),
            SimEvent::ServiceComplete { node_id } => self.handle_service_complete(node_id),
            SimEvent::MigrationComplete { chunk_id } => self.handle_migration_complete(chunk_id),
            SimEvent::PolicyCheck => self.handle_policy_check(),
            SimEvent::MetricsSample => self.handle_metrics_sample(),
        }
    }

    /// Handle an arrival: dispatch it, then schedule the next one.
    fn handle_arrival(&mut self) {
        let now = self.now_us();
        let chunk_id = self.workload.pick_chunk(now, &mut self.rng);
        self.submit(chunk_id);
        let next = self.workload.advance(&mut self.rng);
        self.scheduler.schedule_at(next.max(now), SimEvent::RequestArrival);
    }

    /// Route a request for `chunk_id` to the chunk's current owner. Returns
    /// the node it was queued on.
    pub fn submit(&mut self, chunk_id: ChunkId) -> Option<NodeId> {
        let now = self.now_us();
        let node_id = self.cluster.node_for_chunk(chunk_id)?;
        let request = Request::new(self.next_request_id, chunk_id, now);
        self.next_request_id += 1;
        let idle = self.cluster.node_mut(node_id)?.enqueue(request);
        if idle {
            self.start_service(node_id);
        }
        Some(node_id)
    }

    /// Put the next waiting request on `node_id` into service.
    fn start_service(&mut self, node_id: NodeId) {
        let now = self.now_us();
        let Some(node) = self.cluster.node_mut(node_id) else {
            return;
        };
        if node.start_next(now) {
            let service_us = self.service.sample_us(&mut self.rng);
            self.scheduler
                .schedule_after(service_us, SimEvent::ServiceComplete { node_id });
        }
    }

    fn handle_service_complete(&mut self, node_id: NodeId) {
        let now = self.now_us();
        if let Some(node) = self.cluster.node_mut(node_id) {
            node.finish_service(now, &mut self.metrics);
        }
        self.start_service(node_id);
    }

    /// Ask the cluster to migrate a chunk. Returns true if the migration was
    /// accepted; invalid requests are ignored.
    pub fn start_migration(
        &mut self,
        chunk_id: ChunkId,
        from: NodeId,
        to: NodeId,
        label: &str,
    ) -> bool {
        let now = self.now_us();
        match self
            .cluster
            .begin_migration(chunk_id, from, to, label, now, &mut self.metrics)
        {
            Some(completes_at) => {
                self.scheduler
                    .schedule_at(completes_at, SimEvent::MigrationComplete { chunk_id });
                true
            }
            None => false,
        }
    }

    fn handle_migration_complete(&mut self, chunk_id: ChunkId) {
        let now = self.now_us();
        self.cluster.complete_migration(chunk_id, now);
    }

    fn handle_policy_check(&mut self) {
        let now = self.now_us();
        let mut view = ClusterAdapter {
            cluster: &self.cluster,
            metrics: &self.metrics,
            rng: &mut self.rng,
            now_us: now,
        };
        let decision = self.policy.on_check(&mut view);
        let label = self.policy.name().to_string();
        for order in decision.orders() {
            let accepted = self.start_migration(order.chunk_id, order.from, order.to, &label);
            debug!(
                policy = %label,
                chunk_id = order.chunk_id,
                from = order.from,
                to = order.to,
                accepted,
                "migration requested"
            );
        }
        self.scheduler.schedule_after(
            secs_to_us(self.policy.check_interval_secs()),
            SimEvent::PolicyCheck,
        );
    }

    fn handle_metrics_sample(&mut self) {
        let now = self.now_us();
        let m = &self.config.metrics;
        let interval_us = secs_to_us(m.sample_interval_sec);
        // No sample at all until enough responses exist for a stable p99.
        let Some(p99_ms) = self
            .metrics
            .recent_percentile(m.sample_window, 99.0, m.sample_min_samples)
        else {
            self.scheduler
                .schedule_after(interval_us, SimEvent::MetricsSample);
            return;
        };
        let loads: Vec<u32> = self.cluster.node_loads().into_values().collect();
        let sample = LoadSample {
            time_secs: self.now_secs(),
            loads,
            p99_ms: Some(p99_ms),
        };

        if now.saturating_sub(self.last_log_us) > secs_to_us(m.log_interval_sec) {
            self.last_log_us = now;
            info!(
                t = sample.time_secs,
                loads = ?sample.loads,
                p99_ms = ?sample.p99_ms,
                completed = self.metrics.completed(),
                migrations = self.metrics.total_migrations(),
                "cluster snapshot"
            );
        }

        self.metrics.record_sample(sample);
        self.scheduler
            .schedule_after(interval_us, SimEvent::MetricsSample);
    }
}
