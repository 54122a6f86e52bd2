/// Integration tests for workload files and replay.
use kvsim_core::config::RouterConfig;
use kvsim_core::workload::{self, SyntheticWorkload, TokenizedRequest};

#[test]
fn test_write_and_read_workload() {
    let tmp_path = std::env::temp_dir().join("kvsim_test_workload.jsonl");

    let requests = vec![
        TokenizedRequest {
            id: 0,
            token_ids: vec![1, 2, 3, 4, 5],
        },
        TokenizedRequest {
            id: 1,
            token_ids: vec![],
        },
        TokenizedRequest {
            id: 9,
            token_ids: vec![u32::MAX, 0],
        },
    ];

    workload::write_workload(&requests, &tmp_path).unwrap();
    let loaded = workload::load_workload(&tmp_path).unwrap();
    assert_eq!(loaded, requests);

    std::fs::remove_file(&tmp_path).ok();
}

#[test]
fn test_missing_file_is_io_error() {
    let path = std::env::temp_dir().join("kvsim_does_not_exist.jsonl");
    let err = workload::load_workload(&path).unwrap_err();
    assert!(matches!(err, workload::WorkloadError::Io(_)));
}

#[test]
fn test_run_workload_end_to_end() {
    let requests = SyntheticWorkload {
        num_requests: 300,
        num_prefixes: 5,
        prefix_tokens: 256,
        suffix_tokens_min: 16,
        suffix_tokens_max: 64,
        vocab_size: 32_000,
        seed: 9,
    }
    .generate();

    let report = kvsim_core::run_workload(RouterConfig::default(), &requests, 3, 4).unwrap();
    assert_eq!(report.requests_routed, 300);
    assert_eq!(report.metrics.cache_performance.total_requests, 300);
    assert!(report.metrics.cache_performance.cache_hit_rate > 0.5);
    assert!(report.metrics.speedup_stats.avg_speedup_ratio > 1.0);
    assert!(report
        .metrics
        .per_worker_stats
        .iter()
        .all(|w| w.active_requests == 0));
}

#[test]
fn test_sweep_overlap_weight() {
    let requests = SyntheticWorkload {
        num_requests: 200,
        num_prefixes: 4,
        prefix_tokens: 128,
        suffix_tokens_min: 16,
        suffix_tokens_max: 32,
        vocab_size: 32_000,
        seed: 2,
    }
    .generate();

    let results =
        kvsim_core::sweep_overlap_weight(&RouterConfig::default(), &requests, &[0.0, 1.0], 1, 16)
            .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, 0.0);

    // Ignoring cache locality spreads shared prefixes and loses hits.
    let blind = results[0].1.metrics.cache_performance.cache_hit_rate;
    let aware = results[1].1.metrics.cache_performance.cache_hit_rate;
    assert!(aware > blind);
}

#[test]
fn test_invalid_config_fails_run() {
    let mut config = RouterConfig::default();
    config.router.num_workers = 0;
    let err = kvsim_core::run_workload(config, &[], 1, 1).unwrap_err();
    assert!(err.is_configuration());
}
