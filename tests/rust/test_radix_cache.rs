/// Integration tests for the per-worker radix cache.
use kvsim_core::block::{BlockHash, BlockHasher};
use kvsim_core::radix_cache::RadixCache;

fn chain(tokens: &[u32]) -> Vec<BlockHash> {
    BlockHasher::new(4).unwrap().hash_tokens(tokens)
}

#[test]
fn test_cache_lifecycle() {
    let mut cache = RadixCache::new(1000);

    // Ten prompts sharing a two-block system prompt.
    for i in 0..10u32 {
        let mut tokens: Vec<u32> = (0..8).collect();
        tokens.extend([100 + i, 200 + i, 300 + i, 400 + i]);
        let c = chain(&tokens);
        let matched = cache.match_prefix(&c);
        assert_eq!(matched, if i == 0 { 0 } else { 2 });
        cache.insert(&c, matched);
    }

    let stats = cache.stats();
    // Shared prefix stored once, one suffix block per prompt.
    assert_eq!(stats.resident_blocks, 2 + 10);
    assert_eq!(stats.total_nodes, 1 + 2 + 10);
    // Ten root-to-leaf paths of three blocks each.
    assert_eq!(stats.total_cached_blocks, 30);
    assert_eq!(stats.evictions, 0);
}

#[test]
fn test_branching_path_sum() {
    let mut cache = RadixCache::new(100);
    cache.insert(&chain(&[1, 2, 3, 4, 5, 6, 7, 8]), 0);
    assert_eq!(cache.cached_blocks(), 2);
    cache.insert(&chain(&[1, 2, 3, 4, 20, 21, 22, 23]), 1);
    assert_eq!(cache.cached_blocks(), 4);
    assert_eq!(cache.stats().resident_blocks, 3);
}

#[test]
fn test_capacity_two_evicts_least_recent() {
    let mut cache = RadixCache::new(2);
    let a = chain(&[1, 1, 1, 1]);
    let b = chain(&[2, 2, 2, 2]);
    let c = chain(&[3, 3, 3, 3]);

    for prompt in [&a, &b, &c] {
        let matched = cache.match_prefix(prompt);
        cache.insert(prompt, matched);
    }

    assert_eq!(cache.stats().total_cached_blocks, 2);
    assert!(!cache.contains_chain(&a));
    assert!(cache.contains_chain(&b));
    assert!(cache.contains_chain(&c));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_lookup_refreshes_recency() {
    let mut cache = RadixCache::new(2);
    let a = chain(&[1, 1, 1, 1]);
    let b = chain(&[2, 2, 2, 2]);
    let c = chain(&[3, 3, 3, 3]);

    cache.insert(&a, 0);
    cache.insert(&b, 0);
    assert_eq!(cache.match_prefix(&a), 1);
    cache.insert(&c, 0);

    assert!(cache.contains_chain(&a));
    assert!(!cache.contains_chain(&b));
}

#[test]
fn test_probe_does_not_refresh_recency() {
    let mut cache = RadixCache::new(2);
    let a = chain(&[1, 1, 1, 1]);
    let b = chain(&[2, 2, 2, 2]);

    cache.insert(&a, 0);
    cache.insert(&b, 0);
    assert_eq!(cache.probe(&a), 1);
    cache.insert(&chain(&[3, 3, 3, 3]), 0);

    assert!(!cache.contains_chain(&a));
    assert!(cache.contains_chain(&b));
}

#[test]
fn test_pinned_blocks_survive_eviction() {
    let mut cache = RadixCache::new(3);
    let a = chain(&[1, 1, 1, 1]);
    let b = chain(&[2, 2, 2, 2]);
    let c = chain(&[3, 3, 3, 3]);
    let d = chain(&[4, 4, 4, 4]);
    let e = chain(&[5, 5, 5, 5]);

    cache.insert(&a, 0);
    let pinned = cache.acquire(&a);
    assert_eq!(pinned.len(), 1);
    cache.insert(&b, 0);
    cache.insert(&c, 0);
    cache.insert(&d, 0);

    // `a` is the oldest leaf but pinned, so `b` goes instead.
    assert!(cache.contains_chain(&a));
    assert!(!cache.contains_chain(&b));

    cache.release(&pinned);
    cache.insert(&e, 0);
    assert!(!cache.contains_chain(&a));
    assert!(cache.contains_chain(&c));
    assert!(cache.contains_chain(&d));
    assert!(cache.contains_chain(&e));
}

#[test]
fn test_eviction_cascades_up_a_chain() {
    let mut cache = RadixCache::new(100);
    cache.insert(&chain(&(0..16).collect::<Vec<u32>>()), 0);
    assert_eq!(cache.cached_blocks(), 4);

    let removed = cache.evict(1);
    assert_eq!(removed, 3);
    assert_eq!(cache.cached_blocks(), 1);
    assert_eq!(cache.probe(&chain(&(0..16).collect::<Vec<u32>>())), 1);
}

#[test]
fn test_clear_keeps_root_only() {
    let mut cache = RadixCache::new(100);
    cache.insert(&chain(&[1, 2, 3, 4, 5]), 0);
    cache.clear();
    let stats = cache.stats();
    assert_eq!(stats.total_nodes, 1);
    assert_eq!(stats.total_cached_blocks, 0);
    assert_eq!(cache.capacity_blocks(), 100);
}
