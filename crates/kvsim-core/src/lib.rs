//! kvsim: prefix-aware KV-cache routing simulator.
//!
//! Models a pool of LLM inference workers, each holding a radix tree of
//! cached KV blocks, and a smart router that sends every tokenized prompt to
//! the worker offering the best mix of cache reuse and spare capacity. Load
//! models and scoring live in `kvsim-algorithms`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐     ┌─────────────┐     ┌──────────────┐
//! │ Workload │────▶│ SmartRouter │────▶│   Metrics    │
//! │ (tokens) │     │ hash/score  │     │  Aggregator  │
//! └──────────┘     └──────┬──────┘     └──────────────┘
//!                         │
//!                 ┌───────┴───────┐
//!                 │  Load model   │
//!                 │  + scoring    │
//!                 └───────┬───────┘
//!                         │
//!           ┌─────────────┼─────────────┐
//!           ▼             ▼             ▼
//!     ┌──────────┐  ┌──────────┐  ┌──────────┐
//!     │ Worker 0 │  │ Worker 1 │  │ Worker N │
//!     │  Radix   │  │  Radix   │  │  Radix   │
//!     │  cache   │  │  cache   │  │  cache   │
//!     └──────────┘  └──────────┘  └──────────┘
//! ```

pub mod block;
pub mod clock;
pub mod config;
pub mod latency;
pub mod metrics;
pub mod radix_cache;
pub mod replay;
pub mod router;
pub mod worker;
pub mod workload;

// Re-export key types for convenience.
pub use block::{BlockError, BlockHash, BlockHasher, Token};
pub use clock::AccessClock;
pub use config::{ConfigError, RouterConfig};
pub use latency::{LatencySimulator, TtftEstimate};
pub use metrics::{CacheMetricsAggregator, CacheMetricsSnapshot, SpeedupSample};
pub use radix_cache::{RadixCache, RadixStats};
pub use replay::{replay, ReplayReport};
pub use router::{RouteError, RouteOutcome, RoutingDecision, SmartRouter};
pub use worker::{WorkerPool, WorkerState, WorkerStats};
pub use workload::{load_workload, write_workload, SyntheticWorkload, TokenizedRequest};

/// Build a router from `config` and replay `requests` through it.
pub fn run_workload(
    config: RouterConfig,
    requests: &[TokenizedRequest],
    threads: usize,
    in_flight: usize,
) -> Result<ReplayReport, RouteError> {
    let router = SmartRouter::new(config)?;
    Ok(replay(&router, requests, threads, in_flight))
}

/// Replay the same workload once per `kv_overlap_weight`, each on a fresh
/// router.
pub fn sweep_overlap_weight(
    config: &RouterConfig,
    requests: &[TokenizedRequest],
    weights: &[f64],
    threads: usize,
    in_flight: usize,
) -> Result<Vec<(f64, ReplayReport)>, RouteError> {
    weights
        .iter()
        .map(|&w| {
            let mut cfg = config.clone();
            cfg.router.kv_overlap_weight = w;
            run_workload(cfg, requests, threads, in_flight).map(|report| (w, report))
        })
        .collect()
}
