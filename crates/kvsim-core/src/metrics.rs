//! Cache metrics aggregation.
//!
//! Tracks block-level cache hits and misses, routing volume and latency,
//! per-worker stats and TTFT speedup samples, and turns them into the
//! read-only [`CacheMetricsSnapshot`] polled by dashboards and exporters.

use crate::radix_cache::RadixStats;
use crate::router::RoutingDecision;
use crate::worker::WorkerStats;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Baseline vs cache-adjusted TTFT of one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedupSample {
    pub baseline_ttft_ms: f64,
    pub actual_ttft_ms: f64,
    pub speedup_ratio: f64,
}

impl SpeedupSample {
    pub fn new(baseline_ttft_ms: f64, actual_ttft_ms: f64) -> Self {
        let speedup_ratio = if actual_ttft_ms > 0.0 {
            baseline_ttft_ms / actual_ttft_ms
        } else {
            1.0
        };
        Self {
            baseline_ttft_ms,
            actual_ttft_ms,
            speedup_ratio,
        }
    }
}

/// Percentile values for a distribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
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
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;

        Self {
            p50: percentile_sorted(&sorted, 50.0),
            p90: percentile_sorted(&sorted, 90.0),
            p99: percentile_sorted(&sorted, 99.0),
            min: sorted[0],
            max: sorted[n - 1],
            mean,
        }
    }
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Bounded FIFO of speedup samples.
#[derive(Debug, Clone)]
struct SpeedupHistory {
    samples: VecDeque<SpeedupSample>,
    limit: usize,
    total_records: u64,
}

impl SpeedupHistory {
    fn new(limit: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(limit.min(4096)),
            limit: limit.max(1),
            total_records: 0,
        }
    }

    fn push(&mut self, sample: SpeedupSample) {
        while self.samples.len() >= self.limit {
            self.samples.pop_front();
        }
        self.total_records += 1;
        self.samples.push_back(sample);
    }

    /// Averages are summed over the retained window on every call.
    fn stats(&self) -> SpeedupStats {
        let n = self.samples.len();
        if n == 0 {
            return SpeedupStats {
                total_speedup_records: self.total_records,
                ..Default::default()
            };
        }
        let mut sum_baseline_ms = 0.0;
        let mut sum_speedup = 0.0;
        let mut actual = Vec::with_capacity(n);
        for s in &self.samples {
            sum_baseline_ms += s.baseline_ttft_ms;
            sum_speedup += s.speedup_ratio;
            actual.push(s.actual_ttft_ms);
        }
        let sum_actual_ms: f64 = actual.iter().sum();
        SpeedupStats {
            avg_baseline_ttft_ms: sum_baseline_ms / n as f64,
            avg_actual_ttft_ms: sum_actual_ms / n as f64,
            avg_speedup_ratio: sum_speedup / n as f64,
            total_speedup_records: self.total_records,
            retained_samples: n as u64,
            actual_ttft: Percentiles::from_values(&actual),
        }
    }
}

/// Block-level cache effectiveness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachePerformance {
    /// `cache_hits / max(1, cache_hits + cache_misses)`.
    pub cache_hit_rate: f64,
    /// Requests routed.
    pub total_requests: u64,
    /// Blocks found cached on the chosen worker.
    pub cache_hits: u64,
    /// Blocks that had to be computed.
    pub cache_misses: u64,
}

/// Router-level figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmartRouterStats {
    /// Active-request fraction per worker, indexed by worker id.
    pub worker_loads: Vec<f64>,
    pub routing_decisions: u64,
    pub avg_routing_time_ms: f64,
}

/// TTFT speedup figures over the retained sample window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedupStats {
    pub avg_baseline_ttft_ms: f64,
    pub avg_actual_ttft_ms: f64,
    pub avg_speedup_ratio: f64,
    /// Samples recorded since start, including dropped ones.
    pub total_speedup_records: u64,
    /// Samples currently retained.
    pub retained_samples: u64,
    pub actual_ttft: Percentiles,
}

/// Read-only view for exporters and dashboards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetricsSnapshot {
    pub cache_performance: CachePerformance,
    pub smart_router: SmartRouterStats,
    pub per_worker_stats: Vec<WorkerStats>,
    pub radix_tree_stats: RadixStats,
    pub speedup_stats: SpeedupStats,
}

impl CacheMetricsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        self.cache_performance.cache_hit_rate
    }
}

/// Aggregator shared by the router and whoever polls the metrics.
///
/// Hit/miss and routing counters are lock-free; the speedup history and the
/// per-worker stats each sit behind their own lock. None of these locks is
/// ever held together with a worker lock.
#[derive(Debug)]
pub struct CacheMetricsAggregator {
    total_hits: AtomicU64,
    total_misses: AtomicU64,
    routing_decisions: AtomicU64,
    routing_time_ns: AtomicU64,
    speedups: Mutex<SpeedupHistory>,
    workers: Mutex<Vec<WorkerStats>>,
}

impl CacheMetricsAggregator {
    /// Create an aggregator retaining at most `speedup_history_limit`
    /// speedup samples.
    pub fn new(speedup_history_limit: usize) -> Self {
        Self {
            total_hits: AtomicU64::new(0),
            total_misses: AtomicU64::new(0),
            routing_decisions: AtomicU64::new(0),
            routing_time_ns: AtomicU64::new(0),
            speedups: Mutex::new(SpeedupHistory::new(speedup_history_limit)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Count the decision's matched blocks as hits and the rest as misses.
    pub fn record_routing(&self, decision: &RoutingDecision) {
        let matched = decision.matched_blocks.min(decision.total_blocks) as u64;
        let missed = decision.total_blocks as u64 - matched;
        self.total_hits.fetch_add(matched, Ordering::Relaxed);
        self.total_misses.fetch_add(missed, Ordering::Relaxed);
        self.routing_decisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_routing_time(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.routing_time_ns.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn record_speedup(&self, sample: SpeedupSample) {
        self.speedups.lock().push(sample);
    }

    /// Replace the latest stats of one worker.
    pub fn record_worker_stats(&self, stats: WorkerStats) {
        let mut workers = self.workers.lock();
        let idx = stats.worker_id as usize;
        if workers.len() <= idx {
            workers.resize_with(idx + 1, WorkerStats::default);
            for (i, w) in workers.iter_mut().enumerate() {
                w.worker_id = i as u32;
            }
        }
        workers[idx] = stats;
    }

    /// Replace the stats of every worker.
    pub fn set_worker_stats(&self, stats: Vec<WorkerStats>) {
        *self.workers.lock() = stats;
    }

    pub fn total_hits(&self) -> u64 {
        self.total_hits.load(Ordering::Relaxed)
    }

    pub fn total_misses(&self) -> u64 {
        self.total_misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.total_hits(), self.total_misses())
    }

    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        let hits = self.total_hits();
        let misses = self.total_misses();
        let decisions = self.routing_decisions.load(Ordering::Relaxed);
        let routing_ns = self.routing_time_ns.load(Ordering::Relaxed);

        let per_worker_stats = self.workers.lock().clone();
        let radix_tree_stats = per_worker_stats
            .iter()
            .fold(RadixStats::default(), |acc, w| acc.merge(&w.radix_tree));
        let speedup_stats = self.speedups.lock().stats();

        CacheMetricsSnapshot {
            cache_performance: CachePerformance {
                cache_hit_rate: hit_rate(hits, misses),
                total_requests: decisions,
                cache_hits: hits,
                cache_misses: misses,
            },
            smart_router: SmartRouterStats {
                worker_loads: per_worker_stats.iter().map(|w| w.load).collect(),
                routing_decisions: decisions,
                avg_routing_time_ms: if decisions > 0 {
                    routing_ns as f64 / decisions as f64 / 1_000_000.0
                } else {
                    0.0
                },
            },
            per_worker_stats,
            radix_tree_stats,
            speedup_stats,
        }
    }

    /// Clear every counter and sample.
    pub fn reset(&self) {
        self.total_hits.store(0, Ordering::Relaxed);
        self.total_misses.store(0, Ordering::Relaxed);
        self.routing_decisions.store(0, Ordering::Relaxed);
        self.routing_time_ns.store(0, Ordering::Relaxed);
        let mut speedups = self.speedups.lock();
        *speedups = SpeedupHistory::new(speedups.limit);
        self.workers.lock().clear();
    }
}

impl Default for CacheMetricsAggregator {
    fn default() -> Self {
        Self::new(1000)
    }
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    hits as f64 / (hits + misses).max(1) as f64
}

/// Format a snapshot as a pretty-printed table string.
pub fn format_table(title: &str, snapshot: &CacheMetricsSnapshot) -> String {
    let perf = &snapshot.cache_performance;
    let router = &snapshot.smart_router;
    let speedup = &snapshot.speedup_stats;
    let tree = &snapshot.radix_tree_stats;

    let mut out = String::new();
    out.push_str(&format!("\n{:=<70}\n", format!("  {} Results  ", title)));
    out.push_str(&format!(
        "  Requests: {} | Avg routing time: {:.3}ms\n",
        perf.total_requests, router.avg_routing_time_ms
    ));
    out.push_str(&format!("{:-<70}\n", "  Cache  "));
    out.push_str(&format!(
        "  Block hit rate: {:.1}%  (hits: {}, misses: {})\n",
        perf.cache_hit_rate * 100.0,
        perf.cache_hits,
        perf.cache_misses
    ));
    out.push_str(&format!(
        "  Radix nodes: {}  Cached blocks: {}  Evictions: {}\n",
        tree.total_nodes, tree.total_cached_blocks, tree.evictions
    ));
    out.push_str(&format!("{:-<70}\n", "  TTFT  "));
    out.push_str(&format!(
        "  Baseline avg: {:>8.1}ms  Actual avg: {:>8.1}ms  Speedup: {:.2}x\n",
        speedup.avg_baseline_ttft_ms, speedup.avg_actual_ttft_ms, speedup.avg_speedup_ratio
    ));
    out.push_str(&format!(
        "  Actual (ms)     P50={:>8.1}  P90={:>8.1}  P99={:>8.1}\n",
        speedup.actual_ttft.p50, speedup.actual_ttft.p90, speedup.actual_ttft.p99
    ));
    out.push_str(&format!("{:-<70}\n", "  Workers  "));
    for w in &snapshot.per_worker_stats {
        out.push_str(&format!(
            "  #{:<3} active={:<4} total={:<7} tokens={:<10} cached_blocks={}\n",
            w.worker_id, w.active_requests, w.total_requests, w.tokens_processed, w.cached_blocks
        ));
    }
    out.push_str(&format!("{:=<70}\n", ""));
    out
}
