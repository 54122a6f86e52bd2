//! Prefix-aware smart router.
//!
//! Routing a request runs in two phases:
//!
//! 1. **Probe**: hash the prompt into a block chain and, for every worker,
//!    take its lock just long enough to measure the cached prefix and read
//!    its counters. Candidates are scored by the weighted overlap/load
//!    formula and the best one is chosen (ties go to the lowest worker id).
//! 2. **Commit**: under the chosen worker's lock only, re-measure the
//!    prefix, insert the chain, pin it for the request's lifetime and update
//!    the counters. Latency is simulated from the committed match and the
//!    result is recorded in the shared [`CacheMetricsAggregator`].
//!
//! A worker lock is never held while another worker's lock or a metrics lock
//! is taken.

use crate::block::{BlockError, BlockHash, BlockHasher, Token};
use crate::config::{ConfigError, RouterConfig};
use crate::latency::{LatencySimulator, TtftEstimate};
use crate::metrics::{CacheMetricsAggregator, CacheMetricsSnapshot};
use crate::radix_cache::NodeId;
use crate::worker::WorkerPool;
use kvsim_algorithms::{
    load_model_by_name, score_pool, select_best, CandidateScore, LoadModel, ScoreWeights,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("Invalid router configuration: {0}")]
    Configuration(String),
    #[error("Invalid request: {0}")]
    InvalidInput(String),
    #[error("Unknown worker: {0}")]
    UnknownWorker(u32),
}

impl RouteError {
    /// Fatal at construction; never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(self, RouteError::Configuration(_))
    }

    /// Rejected per call; the caller may retry with corrected input.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, RouteError::InvalidInput(_))
    }
}

impl From<BlockError> for RouteError {
    fn from(e: BlockError) -> Self {
        match e {
            BlockError::InvalidBlockSize => RouteError::Configuration(e.to_string()),
            BlockError::PromptTooLong { .. } => RouteError::InvalidInput(e.to_string()),
        }
    }
}

impl From<ConfigError> for RouteError {
    fn from(e: ConfigError) -> Self {
        RouteError::Configuration(e.to_string())
    }
}

/// Result of one routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub request_id: u64,
    pub chosen_worker_id: u32,
    /// Leading blocks found cached on the chosen worker at commit time.
    pub matched_blocks: usize,
    pub total_blocks: usize,
    /// Scores the chosen worker won with during the probe phase.
    pub overlap_score: f64,
    pub load_score: f64,
    pub combined_score: f64,
}

/// A routed request. Pass it back to [`SmartRouter::complete`] once the
/// request has finished so the worker's load and pins are released.
#[derive(Debug)]
#[must_use = "a routed request stays active until passed to SmartRouter::complete"]
pub struct RouteOutcome {
    pub decision: RoutingDecision,
    pub estimate: TtftEstimate,
    /// Prompt tokens covered by the matched blocks.
    pub cached_token_count: usize,
    pinned: Vec<NodeId>,
    generation: u64,
}

impl RouteOutcome {
    pub fn worker_id(&self) -> u32 {
        self.decision.chosen_worker_id
    }

    pub fn ttft_ms(&self) -> f64 {
        self.estimate.actual_ttft_ms
    }

    pub fn speedup_ratio(&self) -> f64 {
        self.estimate.speedup_ratio
    }
}

pub struct SmartRouter {
    config: RouterConfig,
    hasher: BlockHasher,
    weights: ScoreWeights,
    load_model: Box<dyn LoadModel>,
    pool: WorkerPool,
    latency: LatencySimulator,
    metrics: Arc<CacheMetricsAggregator>,
    next_request_id: AtomicU64,
}

impl std::fmt::Debug for SmartRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartRouter")
            .field("config", &self.config)
            .field("load_model", &self.load_model.name())
            .field("workers", &self.pool.len())
            .finish()
    }
}

impl SmartRouter {
    /// Build a router with its own metrics aggregator.
    pub fn new(config: RouterConfig) -> Result<Self, RouteError> {
        let metrics = Arc::new(CacheMetricsAggregator::new(
            config.metrics.speedup_history_limit,
        ));
        Self::with_metrics(config, metrics)
    }

    /// Build a router that records into a shared aggregator.
    pub fn with_metrics(
        config: RouterConfig,
        metrics: Arc<CacheMetricsAggregator>,
    ) -> Result<Self, RouteError> {
        config.validate()?;
        let r = &config.router;
        let hasher = BlockHasher::new(r.block_size)?;
        let pool = WorkerPool::new(r.num_workers, r.cache_capacity_blocks)?;
        let load_model = load_model_by_name(&r.load_model, r.max_capacity_per_worker)
            .ok_or_else(|| {
                RouteError::Configuration(format!("unknown load model '{}'", r.load_model))
            })?;

        info!(
            workers = r.num_workers,
            block_size = r.block_size,
            kv_overlap_weight = r.kv_overlap_weight,
            load_balance_weight = r.load_balance_weight,
            load_model = load_model.name(),
            kv_cache_enabled = r.kv_cache_enabled,
            "smart router initialized"
        );

        Ok(Self {
            weights: config.weights(),
            latency: config.latency_model(),
            config,
            hasher,
            load_model,
            pool,
            metrics,
            next_request_id: AtomicU64::new(0),
        })
    }

    /// Replace the load model chosen by the configuration.
    pub fn with_load_model(mut self, load_model: Box<dyn LoadModel>) -> Self {
        self.load_model = load_model;
        self
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn hasher(&self) -> &BlockHasher {
        &self.hasher
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn metrics(&self) -> &Arc<CacheMetricsAggregator> {
        &self.metrics
    }

    pub fn load_model_name(&self) -> &str {
        self.load_model.name()
    }

    fn cache_enabled(&self) -> bool {
        self.config.router.kv_cache_enabled
    }

    fn block_chain(&self, token_ids: &[Token]) -> Result<Vec<BlockHash>, RouteError> {
        self.hasher
            .validate_prompt(token_ids, self.config.router.max_prompt_tokens)?;
        Ok(self.hasher.hash_tokens(token_ids))
    }

    /// Probe phase: one short lock per worker.
    fn score_candidates(&self, chain: &[BlockHash]) -> Vec<CandidateScore> {
        let mut snapshots = Vec::with_capacity(self.pool.len());
        let mut matched = Vec::with_capacity(self.pool.len());
        for worker in self.pool.iter() {
            let worker = worker.lock();
            snapshots.push(worker.snapshot());
            matched.push(if self.cache_enabled() {
                worker.cache.probe(chain)
            } else {
                0
            });
        }
        score_pool(
            &self.weights,
            self.load_model.as_ref(),
            &snapshots,
            &matched,
            chain.len(),
        )
    }

    fn choose(&self, candidates: &[CandidateScore]) -> Result<CandidateScore, RouteError> {
        let best = select_best(candidates)
            .copied()
            .ok_or_else(|| RouteError::Configuration("worker pool is empty".to_string()))?;
        if candidates.iter().all(|c| c.load_score <= 0.0) {
            warn!(
                workers = candidates.len(),
                "all workers saturated, routing on cache overlap alone"
            );
        }
        Ok(best)
    }

    /// Decide where a request would go without changing any state.
    pub fn plan(&self, token_ids: &[Token]) -> Result<RoutingDecision, RouteError> {
        let chain = self.block_chain(token_ids)?;
        let candidates = self.score_candidates(&chain);
        let best = self.choose(&candidates)?;
        Ok(RoutingDecision {
            request_id: self.next_request_id.load(Ordering::Relaxed),
            chosen_worker_id: best.worker_id,
            matched_blocks: best.matched_blocks,
            total_blocks: chain.len(),
            overlap_score: best.overlap_score,
            load_score: best.load_score,
            combined_score: best.combined_score,
        })
    }

    /// Route a tokenized prompt to a worker.
    ///
    /// The chosen worker's cache is updated with the prompt's blocks and
    /// its active request count goes up until [`SmartRouter::complete`].
    pub fn route(&self, token_ids: &[Token]) -> Result<RouteOutcome, RouteError> {
        let started = Instant::now();
        let chain = self.block_chain(token_ids)?;
        let candidates = self.score_candidates(&chain);
        let best = self.choose(&candidates)?;

        let worker = self
            .pool
            .get(best.worker_id)
            .ok_or(RouteError::UnknownWorker(best.worker_id))?;
        let (matched_blocks, pinned, generation, worker_stats) = {
            let mut worker = worker.lock();
            let (matched, pinned) = if self.cache_enabled() {
                let matched = worker.cache.match_prefix(&chain);
                worker.cache.insert(&chain, matched);
                let pinned = worker.cache.acquire(&chain);
                (matched, pinned)
            } else {
                (0, Vec::new())
            };
            worker.begin_request(token_ids.len());
            (
                matched,
                pinned,
                worker.generation,
                worker.stats(self.config.router.max_capacity_per_worker),
            )
        };

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let decision = RoutingDecision {
            request_id,
            chosen_worker_id: best.worker_id,
            matched_blocks,
            total_blocks: chain.len(),
            overlap_score: best.overlap_score,
            load_score: best.load_score,
            combined_score: best.combined_score,
        };
        let estimate = self
            .latency
            .estimate(chain.len(), matched_blocks, token_ids.len());
        let cached_token_count = (matched_blocks * self.hasher.block_size()).min(token_ids.len());

        self.metrics.record_routing(&decision);
        self.metrics.record_speedup(estimate.to_sample());
        self.metrics.record_worker_stats(worker_stats);
        self.metrics.record_routing_time(started.elapsed());

        debug!(
            request_id,
            worker = best.worker_id,
            matched_blocks,
            total_blocks = chain.len(),
            combined_score = best.combined_score,
            ttft_ms = estimate.actual_ttft_ms,
            "routed request"
        );

        Ok(RouteOutcome {
            decision,
            estimate,
            cached_token_count,
            pinned,
            generation,
        })
    }

    /// Mark a routed request as finished.
    ///
    /// Requests routed before the last [`SmartRouter::reset`] were already
    /// dropped from the worker and are ignored.
    pub fn complete(&self, outcome: RouteOutcome) -> Result<(), RouteError> {
        let id = outcome.worker_id();
        let worker = self.pool.get(id).ok_or(RouteError::UnknownWorker(id))?;
        let stats = {
            let mut worker = worker.lock();
            if worker.generation != outcome.generation {
                debug!(
                    request_id = outcome.decision.request_id,
                    worker = id,
                    "completed request predates reset, ignoring"
                );
                return Ok(());
            }
            worker.cache.release(&outcome.pinned);
            worker.finish_request();
            worker.stats(self.config.router.max_capacity_per_worker)
        };
        self.metrics.record_worker_stats(stats);
        Ok(())
    }

    /// Current metrics with fresh per-worker stats.
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        self.metrics
            .set_worker_stats(self.pool.stats(self.config.router.max_capacity_per_worker));
        self.metrics.snapshot()
    }

    /// Clear every worker and all metrics.
    pub fn reset(&self) {
        self.pool.reset();
        self.metrics.reset();
        info!("router state reset");
    }
}
