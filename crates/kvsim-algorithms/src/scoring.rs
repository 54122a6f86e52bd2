//! Weighted overlap/load scoring and deterministic worker selection.
//!
//! `combined = kv_overlap * overlap_score + load_balance * load_score`.
//! The highest combined score wins; ties go to the lowest worker id so that
//! identical inputs always route identically.

use crate::traits::*;
use std::cmp::Ordering;

/// Fraction of a request's blocks already cached on a worker.
pub fn overlap_score(matched_blocks: usize, total_blocks: usize) -> f64 {
    (matched_blocks as f64 / total_blocks.max(1) as f64).clamp(0.0, 1.0)
}

/// Score one worker for a request of `total_blocks` blocks.
pub fn score_worker(
    weights: &ScoreWeights,
    model: &dyn LoadModel,
    worker: &WorkerSnapshot,
    pool: &[WorkerSnapshot],
    matched_blocks: usize,
    total_blocks: usize,
) -> CandidateScore {
    let overlap = overlap_score(matched_blocks, total_blocks);
    let load = model.load_score(worker, pool);
    CandidateScore {
        worker_id: worker.id,
        matched_blocks,
        overlap_score: overlap,
        load_score: load,
        combined_score: weights.kv_overlap * overlap + weights.load_balance * load,
    }
}

/// Score every worker in `pool`. `matched` is indexed like `pool`.
pub fn score_pool(
    weights: &ScoreWeights,
    model: &dyn LoadModel,
    pool: &[WorkerSnapshot],
    matched: &[usize],
    total_blocks: usize,
) -> Vec<CandidateScore> {
    pool.iter()
        .zip(matched.iter())
        .map(|(worker, &m)| score_worker(weights, model, worker, pool, m, total_blocks))
        .collect()
}

/// Ordering used for selection: higher combined score first, then lower id.
fn compare_candidates(a: &CandidateScore, b: &CandidateScore) -> Ordering {
    a.combined_score
        .total_cmp(&b.combined_score)
        .then_with(|| b.worker_id.cmp(&a.worker_id))
}

/// Pick the best candidate, or `None` for an empty slice.
pub fn select_best(candidates: &[CandidateScore]) -> Option<&CandidateScore> {
    candidates.iter().max_by(|a, b| compare_candidates(a, b))
}
