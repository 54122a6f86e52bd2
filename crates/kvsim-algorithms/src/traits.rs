//! Scoring trait definitions.
//!
//! Load models implement the [`LoadModel`] trait, which turns a worker's
//! counters into a load fraction. The router combines that fraction with the
//! worker's prefix overlap to pick a target for each request.

use serde::{Deserialize, Serialize};

/// Read-only snapshot of a worker's counters, provided to load models.
///
/// This is the scoring crate's view of a worker. It carries only the numbers
/// needed to estimate load, not the worker's cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub id: u32,
    pub active_requests: u64,
    pub total_requests: u64,
    pub cached_blocks: u64,
    pub tokens_processed: u64,
}

/// Weights applied to the overlap and load components of a worker's score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Preference for workers that already hold the request's prefix.
    pub kv_overlap: f64,
    /// Preference for idle workers.
    pub load_balance: f64,
}

impl ScoreWeights {
    pub fn new(kv_overlap: f64, load_balance: f64) -> Self {
        Self {
            kv_overlap,
            load_balance,
        }
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self::new(1.0, 0.5)
    }
}

/// Score of a single worker for one routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub worker_id: u32,
    /// Leading blocks of the request already cached on the worker.
    pub matched_blocks: usize,
    /// `matched_blocks / max(1, total_blocks)`, in `[0, 1]`.
    pub overlap_score: f64,
    /// `1 - load_fraction`, in `[0, 1]`.
    pub load_score: f64,
    pub combined_score: f64,
}

/// Estimates how busy a worker is.
///
/// Implement this trait to plug a different utilization formula into the
/// router. The router calls [`LoadModel::load_score`] once per worker per
/// request.
pub trait LoadModel: Send + Sync {
    /// Load of `worker` as a fraction of capacity: `0.0` idle, `1.0` saturated.
    ///
    /// `pool` holds a snapshot of every worker, `worker` included, for models
    /// that measure load relative to the rest of the fleet.
    fn load_fraction(&self, worker: &WorkerSnapshot, pool: &[WorkerSnapshot]) -> f64;

    /// Load score clamped to `[0, 1]` (0 = fully loaded, 1 = idle).
    fn load_score(&self, worker: &WorkerSnapshot, pool: &[WorkerSnapshot]) -> f64 {
        let fraction = self.load_fraction(worker, pool);
        if !fraction.is_finite() {
            return 0.0;
        }
        (1.0 - fraction).clamp(0.0, 1.0)
    }

    /// Name used in configuration files and reports.
    fn name(&self) -> &str;
}

/// Fraction `value / max`, or zero when `max` is zero.
pub(crate) fn share_of(value: u64, max: u64) -> f64 {
    if max == 0 {
        return 0.0;
    }
    (value as f64 / max as f64).min(1.0)
}
