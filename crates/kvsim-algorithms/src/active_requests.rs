//! In-flight request load model.
//!
//! Measures load as the number of requests a worker is currently serving
//! relative to a fixed per-worker capacity. This is the router's default.

use crate::traits::*;

/// Load = `active_requests / max_capacity_per_worker`, clamped to `[0, 1]`.
#[derive(Debug, Clone)]
pub struct ActiveRequests {
    max_capacity_per_worker: u64,
}

impl ActiveRequests {
    pub fn new(max_capacity_per_worker: u64) -> Self {
        Self {
            max_capacity_per_worker: max_capacity_per_worker.max(1),
        }
    }

    pub fn max_capacity_per_worker(&self) -> u64 {
        self.max_capacity_per_worker
    }
}

impl Default for ActiveRequests {
    fn default() -> Self {
        Self::new(32)
    }
}

impl LoadModel for ActiveRequests {
    fn load_fraction(&self, worker: &WorkerSnapshot, _pool: &[WorkerSnapshot]) -> f64 {
        share_of(worker.active_requests, self.max_capacity_per_worker)
    }

    fn name(&self) -> &str {
        "active_requests"
    }
}
