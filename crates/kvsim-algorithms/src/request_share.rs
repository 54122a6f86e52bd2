//! Cumulative-request load model.
//!
//! Measures load as the requests a worker has received over its lifetime
//! relative to the worker that has received the most. Spreads traffic evenly
//! over time regardless of how quickly requests complete.

use crate::traits::*;

/// Load = `total_requests / max(total_requests over pool)`.
#[derive(Debug, Clone, Default)]
pub struct RequestShare;

impl RequestShare {
    pub fn new() -> Self {
        Self
    }
}

impl LoadModel for RequestShare {
    fn load_fraction(&self, worker: &WorkerSnapshot, pool: &[WorkerSnapshot]) -> f64 {
        let busiest = pool
            .iter()
            .map(|w| w.total_requests)
            .max()
            .unwrap_or(0)
            .max(worker.total_requests);
        share_of(worker.total_requests, busiest)
    }

    fn name(&self) -> &str {
        "request_share"
    }
}
