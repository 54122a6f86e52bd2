/// Property tests for hashing, caching, routing and the latency model.
use kvsim_core::block::{BlockHash, BlockHasher};
use kvsim_core::config::RouterConfig;
use kvsim_core::latency::LatencySimulator;
use kvsim_core::radix_cache::RadixCache;
use kvsim_core::router::SmartRouter;
use proptest::prelude::*;

fn arb_tokens(max_len: usize) -> impl Strategy<Value = Vec<u32>> {
    proptest::collection::vec(0u32..64, 0..max_len)
}

fn chains(hasher: &BlockHasher, prompts: &[Vec<u32>]) -> Vec<Vec<BlockHash>> {
    prompts.iter().map(|p| hasher.hash_tokens(p)).collect()
}

proptest! {
    /// A prompt sharing `k` tokens with a cached one matches at least
    /// `k / block_size` blocks.
    #[test]
    fn prefix_monotonicity(
        block_size in 1usize..9,
        a in arb_tokens(80),
        tail in arb_tokens(40),
        k_seed in 0usize..1000,
    ) {
        let hasher = BlockHasher::new(block_size).unwrap();
        let k = if a.is_empty() { 0 } else { k_seed % (a.len() + 1) };
        let mut b = a[..k].to_vec();
        b.extend(tail);

        let mut cache = RadixCache::new(10_000);
        let chain_a = hasher.hash_tokens(&a);
        cache.insert(&chain_a, 0);

        let matched = cache.match_prefix(&hasher.hash_tokens(&b));
        prop_assert!(matched >= k / block_size);
        prop_assert_eq!(cache.probe(&chain_a), chain_a.len());
    }

    /// Eviction always brings the cache back under capacity.
    #[test]
    fn capacity_invariant(
        capacity in 1u64..24,
        block_size in 1usize..5,
        prompts in proptest::collection::vec(arb_tokens(48), 1..30),
        pin_every in 1usize..5,
    ) {
        let hasher = BlockHasher::new(block_size).unwrap();
        let mut cache = RadixCache::new(capacity);
        let mut pinned = Vec::new();

        for (i, chain) in chains(&hasher, &prompts).iter().enumerate() {
            let matched = cache.match_prefix(chain);
            cache.insert(chain, matched);
            prop_assert!(cache.cached_blocks() <= capacity);
            prop_assert_eq!(cache.stats().total_cached_blocks, cache.cached_blocks());
            prop_assert!(cache.stats().resident_blocks <= cache.cached_blocks());

            if i % pin_every == 0 {
                pinned.push(cache.acquire(chain));
            }
            if pinned.len() > 2 {
                let ids = pinned.remove(0);
                cache.release(&ids);
            }
        }
    }

    /// Cache-adjusted TTFT never exceeds the baseline.
    #[test]
    fn speedup_bound(
        base in 0.001f64..5.0,
        discount in 0.01f64..=1.0,
        min_ttft in 0.01f64..50.0,
        total_blocks in 0usize..200,
        matched_seed in 0usize..200,
        prompt_tokens in 0usize..5000,
    ) {
        let sim = LatencySimulator::new(base, discount, min_ttft);
        let matched = matched_seed.min(total_blocks);
        let est = sim.estimate(total_blocks, matched, prompt_tokens);
        prop_assert!(est.actual_ttft_ms <= est.baseline_ttft_ms);
        prop_assert!(est.actual_ttft_ms >= min_ttft);
        prop_assert!(est.speedup_ratio >= 1.0);
        prop_assert!((0.0..=1.0).contains(&est.cache_fraction));
    }

    /// Planning twice against the same state gives the same answer, and
    /// committing follows the plan.
    #[test]
    fn routing_is_deterministic(
        warmup in proptest::collection::vec(arb_tokens(64), 0..20),
        prompt in arb_tokens(64),
        workers in 1u32..6,
    ) {
        let mut config = RouterConfig::default();
        config.router.num_workers = workers;
        config.router.block_size = 4;
        let router = SmartRouter::new(config).unwrap();
        for tokens in &warmup {
            let _ = router.route(tokens).unwrap();
        }

        let first = router.plan(&prompt).unwrap();
        let second = router.plan(&prompt).unwrap();
        prop_assert_eq!(&first, &second);

        let routed = router.route(&prompt).unwrap();
        prop_assert_eq!(routed.decision.chosen_worker_id, first.chosen_worker_id);
        prop_assert_eq!(routed.decision.matched_blocks, first.matched_blocks);
    }

    /// Hit rate stays in [0, 1] and never drops when a prompt is repeated.
    #[test]
    fn hit_rate_bound(
        prompts in proptest::collection::vec(arb_tokens(64), 1..20),
        repeat in 0usize..20,
    ) {
        let mut config = RouterConfig::default();
        config.router.num_workers = 3;
        config.router.block_size = 4;
        config.router.load_balance_weight = 0.0;
        let router = SmartRouter::new(config).unwrap();

        for tokens in &prompts {
            let outcome = router.route(tokens).unwrap();
            router.complete(outcome).unwrap();
            let rate = router.snapshot().hit_rate();
            prop_assert!((0.0..=1.0).contains(&rate));
        }

        let before = router.snapshot().hit_rate();
        let again = &prompts[repeat % prompts.len()];
        let outcome = router.route(again).unwrap();
        prop_assert_eq!(outcome.decision.matched_blocks, outcome.decision.total_blocks);
        router.complete(outcome).unwrap();
        prop_assert!(router.snapshot().hit_rate() >= before);
    }
}
