//! Simulated workers and the worker pool.
//!
//! Each [`WorkerState`] owns one [`RadixCache`] plus the counters the router
//! uses as its load signal. The [`WorkerPool`] wraps every worker in its own
//! lock so routing to one worker never blocks routing to another.

use crate::radix_cache::{RadixCache, RadixStats};
use crate::router::RouteError;
use kvsim_algorithms::WorkerSnapshot;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Mutable state of a single simulated worker.
#[derive(Debug, Clone)]
pub struct WorkerState {
    /// Unique worker identifier (index in the pool).
    pub worker_id: u32,
    /// Requests routed here that have not completed yet.
    pub active_requests: u64,
    /// Requests routed here since start.
    pub total_requests: u64,
    /// Cached blocks, refreshed from the cache after every update.
    pub cached_block_count: u64,
    /// Prompt tokens routed here since start.
    pub tokens_processed: u64,
    /// Bumped on every reset; requests routed in an older generation no
    /// longer count against this worker.
    pub generation: u64,
    /// The worker's prefix cache.
    pub cache: RadixCache,
}

/// Dashboard read model for one worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub worker_id: u32,
    pub active_requests: u64,
    pub total_requests: u64,
    pub cached_blocks: u64,
    pub tokens_processed: u64,
    /// `active_requests / max_capacity_per_worker`, clamped to `[0, 1]`.
    pub load: f64,
    pub radix_tree: RadixStats,
}

impl WorkerState {
    /// Create an idle worker with an empty cache.
    pub fn new(worker_id: u32, capacity_blocks: u64) -> Self {
        Self {
            worker_id,
            active_requests: 0,
            total_requests: 0,
            cached_block_count: 0,
            tokens_processed: 0,
            generation: 0,
            cache: RadixCache::new(capacity_blocks),
        }
    }

    /// Active requests as a fraction of `max_capacity`, clamped to `[0, 1]`.
    pub fn load_fraction(&self, max_capacity: u64) -> f64 {
        (self.active_requests as f64 / max_capacity.max(1) as f64).min(1.0)
    }

    /// Counters-only view for load models.
    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            id: self.worker_id,
            active_requests: self.active_requests,
            total_requests: self.total_requests,
            cached_blocks: self.cached_block_count,
            tokens_processed: self.tokens_processed,
        }
    }

    pub fn stats(&self, max_capacity: u64) -> WorkerStats {
        WorkerStats {
            worker_id: self.worker_id,
            active_requests: self.active_requests,
            total_requests: self.total_requests,
            cached_blocks: self.cached_block_count,
            tokens_processed: self.tokens_processed,
            load: self.load_fraction(max_capacity),
            radix_tree: self.cache.stats(),
        }
    }

    /// Account for a newly routed request of `prompt_tokens` tokens.
    pub fn begin_request(&mut self, prompt_tokens: usize) {
        self.active_requests += 1;
        self.total_requests += 1;
        self.tokens_processed += prompt_tokens as u64;
        self.refresh_cached_blocks();
    }

    /// Account for a completed request.
    pub fn finish_request(&mut self) {
        self.active_requests = self.active_requests.saturating_sub(1);
    }

    pub fn refresh_cached_blocks(&mut self) {
        self.cached_block_count = self.cache.cached_blocks();
    }

    /// Clear counters and cache.
    pub fn reset(&mut self) {
        self.active_requests = 0;
        self.total_requests = 0;
        self.tokens_processed = 0;
        self.generation += 1;
        self.cache.clear();
        self.refresh_cached_blocks();
    }
}

/// Fixed-size pool of independently locked workers.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<Mutex<WorkerState>>,
}

impl WorkerPool {
    /// Create `num_workers` idle workers, each with a cache of
    /// `capacity_blocks` blocks.
    pub fn new(num_workers: u32, capacity_blocks: u64) -> Result<Self, RouteError> {
        if num_workers == 0 {
            return Err(RouteError::Configuration(
                "num_workers must be > 0".to_string(),
            ));
        }
        let workers = (0..num_workers)
            .map(|id| Mutex::new(WorkerState::new(id, capacity_blocks)))
            .collect();
        Ok(Self { workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// The lock guarding worker `id`.
    pub fn get(&self, id: u32) -> Option<&Mutex<WorkerState>> {
        self.workers.get(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mutex<WorkerState>> {
        self.workers.iter()
    }

    /// Dashboard stats of every worker.
    pub fn stats(&self, max_capacity: u64) -> Vec<WorkerStats> {
        self.workers
            .iter()
            .map(|w| w.lock().stats(max_capacity))
            .collect()
    }

    /// Reset every worker (explicit admin action).
    pub fn reset(&self) {
        for worker in &self.workers {
            worker.lock().reset();
        }
    }
}
