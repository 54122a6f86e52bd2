//! Time-to-first-token model.
//!
//! Converts a routing match result into a simulated TTFT: a linear prefill
//! cost per prompt token, discounted by the fraction of blocks the chosen
//! worker already had cached.

use crate::metrics::SpeedupSample;
use serde::{Deserialize, Serialize};

/// Latency model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySimulator {
    /// Prefill cost of one uncached prompt token.
    pub base_cost_per_token_ms: f64,
    /// TTFT reduction for a fully cached prompt, in `(0, 1]`.
    pub cache_discount: f64,
    /// Lower bound for any simulated TTFT.
    pub min_ttft_ms: f64,
}

/// Simulated TTFT for one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TtftEstimate {
    /// TTFT had nothing been cached.
    pub baseline_ttft_ms: f64,
    /// TTFT after the cache discount.
    pub actual_ttft_ms: f64,
    /// `baseline / actual`, always `>= 1`.
    pub speedup_ratio: f64,
    /// `matched_blocks / max(1, total_blocks)`.
    pub cache_fraction: f64,
}

impl TtftEstimate {
    pub fn to_sample(&self) -> SpeedupSample {
        SpeedupSample::new(self.baseline_ttft_ms, self.actual_ttft_ms)
    }
}

impl LatencySimulator {
    pub fn new(base_cost_per_token_ms: f64, cache_discount: f64, min_ttft_ms: f64) -> Self {
        Self {
            base_cost_per_token_ms,
            cache_discount,
            min_ttft_ms,
        }
    }

    /// Estimate TTFT for a prompt of `prompt_tokens` tokens of which
    /// `matched_blocks` of `total_blocks` blocks were cached.
    pub fn estimate(
        &self,
        total_blocks: usize,
        matched_blocks: usize,
        prompt_tokens: usize,
    ) -> TtftEstimate {
        let baseline = (self.base_cost_per_token_ms * prompt_tokens as f64).max(self.min_ttft_ms);
        let cache_fraction = (matched_blocks as f64 / total_blocks.max(1) as f64).clamp(0.0, 1.0);
        let discount = self.cache_discount.clamp(0.0, 1.0) * cache_fraction;
        let actual = (baseline * (1.0 - discount))
            .max(self.min_ttft_ms)
            .min(baseline);

        TtftEstimate {
            baseline_ttft_ms: baseline,
            actual_ttft_ms: actual,
            speedup_ratio: if actual > 0.0 { baseline / actual } else { 1.0 },
            cache_fraction,
        }
    }
}

impl Default for LatencySimulator {
    fn default() -> Self {
        // ~1000-token prompt -> 400 ms baseline
        Self {
            base_cost_per_token_ms: 0.4,
            cache_discount: 0.5,
            min_ttft_ms: 1.0,
        }
    }
}
