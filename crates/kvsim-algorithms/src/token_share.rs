//! Token-volume load model.
//!
//! Measures load as the tokens a worker has processed relative to the
//! busiest worker in the pool. Useful when prompt lengths vary widely and
//! request counts alone hide the imbalance.

use crate::traits::*;

/// Load = `tokens_processed / max(tokens_processed over pool)`.
#[derive(Debug, Clone, Default)]
pub struct TokenShare;

impl TokenShare {
    pub fn new() -> Self {
        Self
    }
}

impl LoadModel for TokenShare {
    fn load_fraction(&self, worker: &WorkerSnapshot, pool: &[WorkerSnapshot]) -> f64 {
        let busiest = pool
            .iter()
            .map(|w| w.tokens_processed)
            .max()
            .unwrap_or(0)
            .max(worker.tokens_processed);
        share_of(worker.tokens_processed, busiest)
    }

    fn name(&self) -> &str {
        "token_share"
    }
}
