/// Integration tests for the smart router.
use kvsim_algorithms::TokenShare;
use kvsim_core::config::RouterConfig;
use kvsim_core::router::SmartRouter;
use kvsim_core::workload::SyntheticWorkload;
use std::sync::Arc;

fn router_config(num_workers: u32, block_size: usize, kv: f64, lb: f64) -> RouterConfig {
    let mut config = RouterConfig::default();
    config.router.num_workers = num_workers;
    config.router.block_size = block_size;
    config.router.kv_overlap_weight = kv;
    config.router.load_balance_weight = lb;
    config
}

#[test]
fn test_partial_match_single_worker() {
    let router = SmartRouter::new(router_config(1, 4, 1.0, 0.5)).unwrap();
    let first = router.route(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    router.complete(first).unwrap();

    let outcome = router.route(&[1, 2, 3, 4, 9, 10, 11, 12]).unwrap();
    assert_eq!(outcome.decision.matched_blocks, 1);
    assert_eq!(outcome.decision.total_blocks, 2);
    assert_eq!(outcome.decision.overlap_score, 0.5);
}

#[test]
fn test_identical_prompt_reuses_worker() {
    let router = SmartRouter::new(router_config(2, 16, 1.0, 0.0)).unwrap();
    let prompt: Vec<u32> = (0..100).collect();
    let first = router.route(&prompt).unwrap();
    let second = router.route(&prompt).unwrap();
    assert_eq!(first.worker_id(), second.worker_id());
    assert_eq!(second.decision.matched_blocks, second.decision.total_blocks);
}

#[test]
fn test_load_only_ignores_cache() {
    let mut config = router_config(2, 4, 0.0, 1.0);
    config.router.max_capacity_per_worker = 10;
    let router = SmartRouter::new(config).unwrap();

    // Warm worker 0 with the prompt, then make it busy.
    let prompt = [1, 2, 3, 4, 5, 6, 7, 8];
    let warm = router.route(&prompt).unwrap();
    assert_eq!(warm.worker_id(), 0);
    router.pool().get(0).unwrap().lock().active_requests = 5;
    router.pool().get(1).unwrap().lock().active_requests = 0;

    let outcome = router.route(&prompt).unwrap();
    assert_eq!(outcome.worker_id(), 1);
    assert_eq!(outcome.decision.matched_blocks, 0);
}

#[test]
fn test_overlap_beats_light_load() {
    let router = SmartRouter::new(router_config(4, 16, 1.0, 0.5)).unwrap();
    let prompt: Vec<u32> = (0..256).collect();
    let first = router.route(&prompt).unwrap();
    let cached_on = first.worker_id();

    // A few unrelated requests elsewhere do not pull the prompt away.
    for i in 0..3u32 {
        let other: Vec<u32> = (0..64).map(|t| 10_000 + i * 100 + t).collect();
        let _ = router.route(&other).unwrap();
    }
    let again = router.route(&prompt).unwrap();
    assert_eq!(again.worker_id(), cached_on);
}

#[test]
fn test_plan_matches_route() {
    let router = SmartRouter::new(router_config(4, 8, 1.0, 0.5)).unwrap();
    let requests = SyntheticWorkload {
        num_requests: 50,
        num_prefixes: 3,
        prefix_tokens: 64,
        suffix_tokens_min: 4,
        suffix_tokens_max: 40,
        vocab_size: 1000,
        seed: 11,
    }
    .generate();

    for req in &requests {
        let planned = router.plan(&req.token_ids).unwrap();
        assert_eq!(planned, router.plan(&req.token_ids).unwrap());
        let routed = router.route(&req.token_ids).unwrap();
        assert_eq!(planned.chosen_worker_id, routed.decision.chosen_worker_id);
        assert_eq!(planned.matched_blocks, routed.decision.matched_blocks);
        assert_eq!(planned.request_id, routed.decision.request_id);
        router.complete(routed).unwrap();
    }
}

#[test]
fn test_concurrent_routing_keeps_counters_consistent() {
    let mut config = router_config(4, 16, 1.0, 0.5);
    config.router.cache_capacity_blocks = 64;
    let router = SmartRouter::new(config).unwrap();
    let requests = SyntheticWorkload {
        num_requests: 800,
        num_prefixes: 6,
        prefix_tokens: 128,
        suffix_tokens_min: 16,
        suffix_tokens_max: 128,
        vocab_size: 32_000,
        seed: 5,
    }
    .generate();

    std::thread::scope(|s| {
        for chunk in requests.chunks(100) {
            let router = &router;
            s.spawn(move || {
                for req in chunk {
                    let outcome = router.route(&req.token_ids).unwrap();
                    router.complete(outcome).unwrap();
                }
            });
        }
    });

    let snap = router.snapshot();
    assert_eq!(snap.cache_performance.total_requests, 800);
    let total: u64 = snap.per_worker_stats.iter().map(|w| w.total_requests).sum();
    assert_eq!(total, 800);
    assert!(snap.per_worker_stats.iter().all(|w| w.active_requests == 0));
    assert!(snap.per_worker_stats.iter().all(|w| w.cached_blocks <= 64));
    assert!(snap.cache_performance.cache_hits > 0);
}

#[test]
fn test_shared_metrics_aggregator() {
    let metrics = Arc::new(kvsim_core::CacheMetricsAggregator::new(10));
    let router =
        SmartRouter::with_metrics(router_config(2, 4, 1.0, 0.5), Arc::clone(&metrics)).unwrap();
    let outcome = router.route(&[1, 2, 3, 4]).unwrap();
    router.complete(outcome).unwrap();
    assert_eq!(metrics.snapshot().cache_performance.total_requests, 1);
}

#[test]
fn test_custom_load_model() {
    let router = SmartRouter::new(router_config(2, 4, 0.0, 1.0))
        .unwrap()
        .with_load_model(Box::new(TokenShare::new()));
    assert_eq!(router.load_model_name(), "token_share");

    // Completed requests still count toward tokens processed.
    let big = router.route(&[0; 64]).unwrap();
    router.complete(big).unwrap();
    let small = router.route(&[1; 4]).unwrap();
    assert_eq!(small.worker_id(), 1);
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = RouterConfig::default();
    config.router.load_model = "nope".to_string();
    let err = SmartRouter::new(config).unwrap_err();
    assert!(err.is_configuration());
}
