/// Integration tests for the simulation engine.
use shardsim_core::config::SimConfig;
use shardsim_core::{
    compare_policies, run_simulation, run_with_policy, MigrationOutcome, SimError,
    SimulationEngine,
};
use shardsim_policies::{policy_by_name, PolicyParams};
use std::collections::HashMap;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn reference_config() -> SimConfig {
    SimConfig::from_str(
        r#"
[simulation]
name = "integration-test"
seed = 42
duration_sec = 400
"#,
    )
    .unwrap()
}

/// Every request targets chunk 0 at a rate node 0 cannot sustain.
fn hotspot_config(duration_sec: u32) -> SimConfig {
    SimConfig::from_str(&format!(
        r#"
[simulation]
name = "hotspot"
seed = 7
duration_sec = {}

[workload]
request_rate = 200
hot_fraction = 1.0

[[workload.phases]]
start_sec = 0
hot_chunks = [0]
"#,
        duration_sec
    ))
    .unwrap()
}

fn engine_for(config: SimConfig, policy: &str) -> SimulationEngine {
    let policy = policy_by_name(policy, &config.policy, config.simulation.seed).unwrap();
    SimulationEngine::new(config, policy)
}

#[test]
fn test_full_simulation_reactive() {
    init_tracing();
    let summary = run_simulation(reference_config(), "reactive").unwrap();

    assert_eq!(summary.policy, "reactive");
    assert!(!summary.insufficient_data);
    // 220 req/s for 400 s, minus whatever is still queued at the end.
    assert!(summary.completed_requests > 85_000);
    assert!(summary.completed_requests <= 88_000);
    assert_eq!(summary.per_node_requests.len(), 4);
    assert_eq!(
        summary.per_node_requests.iter().sum::<u64>(),
        summary.completed_requests
    );
    assert!(summary.latency.p50 > 0.0);
    assert!(summary.latency.p99 >= summary.latency.p50);
    assert!(summary.latency.p999 >= summary.latency.p99);
    assert!(summary.steady_state_p99_ms.is_some());
    assert!(summary.events_processed > summary.completed_requests);
    for label in summary.migrations_by_label.keys() {
        assert_eq!(label, "reactive");
    }
}

#[test]
fn test_full_simulation_q_table() {
    init_tracing();
    let summary = run_simulation(reference_config(), "q_table").unwrap();
    assert_eq!(summary.policy, "q_table");
    assert!(!summary.insufficient_data);
    // Ticks at 15, 25, ..., 395.
    assert_eq!(summary.custom_metrics["ticks"], 39.0);
    assert!(summary.custom_metrics["states_visited"] <= 108.0);
    assert!(summary.custom_metrics["states_visited"] >= 1.0);
}

#[test]
fn test_full_simulation_q_table_large() {
    init_tracing();
    let summary = run_simulation(reference_config(), "q_table_large").unwrap();
    assert_eq!(summary.policy, "q_table_large");
    assert!(summary.custom_metrics["states_visited"] <= 1400.0);
    assert_eq!(summary.custom_metrics["state_space_size"], 1400.0);
}

#[test]
fn test_invariants_hold_throughout_run() {
    init_tracing();
    let config = reference_config();
    let cooldown_us = 25_000_000;
    let mut engine = engine_for(config, "q_table");

    for second in 1..=400u64 {
        engine.run_until(second * 1_000_000);
        assert!(
            engine.cluster.ownership_consistent(),
            "ownership diverged at {}s",
            second
        );
    }

    // Per chunk: no overlapping migrations, and a completed move is followed
    // by at least one cooldown before the next acceptance.
    let mut last_by_chunk: HashMap<u32, (u64, Option<MigrationOutcome>)> = HashMap::new();
    for record in engine.cluster.migration_history() {
        if let Some((completed, outcome)) = last_by_chunk.get(&record.chunk_id) {
            assert!(record.accepted_us >= *completed, "double migration");
            if *outcome == Some(MigrationOutcome::Moved) {
                assert!(record.accepted_us - completed >= cooldown_us);
            }
        }
        if let Some(done) = record.completed_us {
            last_by_chunk.insert(record.chunk_id, (done, record.outcome));
        } else {
            last_by_chunk.insert(record.chunk_id, (u64::MAX, None));
        }
    }
}

#[test]
fn test_deterministic_with_same_seed() {
    let mut config = reference_config();
    config.simulation.duration_sec = 120.0;
    let a = run_simulation(config.clone(), "q_table").unwrap();
    let b = run_simulation(config, "q_table").unwrap();

    assert_eq!(a.completed_requests, b.completed_requests);
    assert_eq!(a.migrations, b.migrations);
    assert_eq!(a.per_node_requests, b.per_node_requests);
    assert_eq!(a.latency, b.latency);
    assert_eq!(a.steady_state_p99_ms, b.steady_state_p99_ms);
    assert_eq!(a.custom_metrics["total_reward"], b.custom_metrics["total_reward"]);
}

#[test]
fn test_unknown_policy_is_fatal() {
    let err = run_simulation(reference_config(), "dqn").unwrap_err();
    match err {
        SimError::UnknownPolicy { name, available } => {
            assert_eq!(name, "dqn");
            assert!(available.contains("reactive"));
            assert!(available.contains("q_table_large"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = reference_config();
    config.cluster.num_nodes = 0;
    assert!(matches!(
        run_simulation(config, "reactive"),
        Err(SimError::Config(_))
    ));
}

#[test]
fn test_run_with_policy_rejects_invalid_config() {
    let mut config = SimConfig::default();
    config.cluster.num_chunks = 0;
    let policy = policy_by_name("reactive", &config.policy, 1).unwrap();
    assert!(matches!(
        run_with_policy(config, policy),
        Err(SimError::Config(_))
    ));

    let config = reference_config();
    let policy = policy_by_name("reactive", &config.policy, 1).unwrap();
    let mut config = config;
    config.simulation.duration_sec = 30.0;
    let summary = run_with_policy(config, policy).unwrap();
    assert_eq!(summary.policy, "reactive");
}

#[test]
fn test_compare_policies() {
    let mut config = reference_config();
    config.simulation.duration_sec = 60.0;
    let results = compare_policies(&config, &["reactive", "q_table", "q_table_large"]).unwrap();
    let names: Vec<&str> = results.iter().map(|r| r.policy.as_str()).collect();
    assert_eq!(names, vec!["reactive", "q_table", "q_table_large"]);
    // Same seeded workload: the same number of arrivals reach the cluster.
    let offered: Vec<u64> = results.iter().map(|r| r.completed_requests).collect();
    for n in offered {
        assert!(n > 12_000 && n <= 13_200);
    }

    assert!(compare_policies(&config, &["reactive", "nope"]).is_err());
}

#[test]
fn test_reactive_migrates_within_one_check_after_hotspot() {
    init_tracing();
    let mut engine = engine_for(hotspot_config(50), "reactive");
    let summary = engine.run();

    // Node 0 is overloaded from the start; the first check at 45 s acts.
    let history = engine.cluster.migration_history();
    assert_eq!(history.len(), 1);
    let first = &history[0];
    assert_eq!(first.chunk_id, 0);
    assert_eq!(first.from, 0);
    assert_eq!(first.label, "reactive");
    assert_eq!(first.accepted_us, 45_000_000);
    assert_eq!(first.completed_us, Some(48_000_000));
    assert_eq!(first.outcome, Some(MigrationOutcome::Moved));
    assert_ne!(engine.cluster.node_for_chunk(0), Some(0));
    assert_eq!(summary.migrations, 1);
}

#[test]
fn test_overloaded_run_is_flagged() {
    let config = SimConfig::from_str(
        r#"
[simulation]
duration_sec = 5

[cluster]
num_nodes = 1
num_chunks = 4

[[workload.phases]]
start_sec = 0
hot_chunks = [0]
"#,
    )
    .unwrap();
    // 5 s at 220 req/s on a single node serves well under 1000 requests.
    let summary = run_simulation(config, "reactive").unwrap();
    assert!(summary.insufficient_data);
    assert_eq!(summary.latency.p99, 0.0);
}

#[test]
fn test_custom_policy_params_flow_through() {
    let mut config = hotspot_config(20);
    config.policy.reactive.check_interval_sec = 10.0;
    let mut engine = engine_for(config, "reactive");
    engine.run();
    let history = engine.cluster.migration_history();
    assert_eq!(history[0].accepted_us, 10_000_000);

    let params = PolicyParams::default();
    assert!(policy_by_name("reactive", &params, 0).is_some());
}
