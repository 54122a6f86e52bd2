//! TOML configuration for the smart router.
//!
//! Every field has a default, so an empty document (or
//! [`RouterConfig::default`]) describes a usable four-worker router.

use crate::latency::LatencySimulator;
use kvsim_algorithms::{available_load_models, ScoreWeights};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Top-level router configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub latency: LatencySection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

/// Routing and worker pool parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterSection {
    /// When false, every worker scores zero overlap and nothing is cached.
    #[serde(default = "default_true")]
    pub kv_cache_enabled: bool,
    /// Tokens per KV block.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default = "default_num_workers")]
    pub num_workers: u32,
    /// Weight on cache locality.
    #[serde(default = "default_kv_overlap_weight")]
    pub kv_overlap_weight: f64,
    /// Weight on load spreading.
    #[serde(default = "default_load_balance_weight")]
    pub load_balance_weight: f64,
    /// Concurrent requests at which a worker counts as fully loaded.
    #[serde(default = "default_max_capacity_per_worker")]
    pub max_capacity_per_worker: u64,
    /// Per-worker radix cache capacity, in blocks.
    #[serde(default = "default_cache_capacity_blocks")]
    pub cache_capacity_blocks: u64,
    /// Name of the load model, see `kvsim list-load-models`.
    #[serde(default = "default_load_model")]
    pub load_model: String,
    /// Longest accepted prompt, in tokens.
    #[serde(default = "default_max_prompt_tokens")]
    pub max_prompt_tokens: usize,
}

fn default_true() -> bool {
    true
}

fn default_block_size() -> usize {
    16
}

fn default_num_workers() -> u32 {
    4
}

fn default_kv_overlap_weight() -> f64 {
    1.0
}

fn default_load_balance_weight() -> f64 {
    0.5
}

fn default_max_capacity_per_worker() -> u64 {
    32
}

fn default_cache_capacity_blocks() -> u64 {
    8192
}

fn default_load_model() -> String {
    "active_requests".to_string()
}

fn default_max_prompt_tokens() -> usize {
    131_072
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            kv_cache_enabled: true,
            block_size: default_block_size(),
            num_workers: default_num_workers(),
            kv_overlap_weight: default_kv_overlap_weight(),
            load_balance_weight: default_load_balance_weight(),
            max_capacity_per_worker: default_max_capacity_per_worker(),
            cache_capacity_blocks: default_cache_capacity_blocks(),
            load_model: default_load_model(),
            max_prompt_tokens: default_max_prompt_tokens(),
        }
    }
}

/// TTFT model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySection {
    #[serde(default = "default_base_cost_per_token_ms")]
    pub base_cost_per_token_ms: f64,
    /// Fraction of TTFT saved by a fully cached prompt.
    #[serde(default = "default_cache_discount")]
    pub cache_discount: f64,
    #[serde(default = "default_min_ttft_ms")]
    pub min_ttft_ms: f64,
}

fn default_base_cost_per_token_ms() -> f64 {
    0.4
}

fn default_cache_discount() -> f64 {
    0.5
}

fn default_min_ttft_ms() -> f64 {
    1.0
}

impl Default for LatencySection {
    fn default() -> Self {
        Self {
            base_cost_per_token_ms: default_base_cost_per_token_ms(),
            cache_discount: default_cache_discount(),
            min_ttft_ms: default_min_ttft_ms(),
        }
    }
}

impl From<LatencySection> for LatencySimulator {
    fn from(s: LatencySection) -> Self {
        LatencySimulator::new(s.base_cost_per_token_ms, s.cache_discount, s.min_ttft_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSection {
    /// Speedup samples retained for averages and percentiles.
    #[serde(default = "default_speedup_history_limit")]
    pub speedup_history_limit: usize,
}

fn default_speedup_history_limit() -> usize {
    1000
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            speedup_history_limit: default_speedup_history_limit(),
        }
    }
}

impl RouterConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.router;
        if r.num_workers == 0 {
            return Err(ConfigError::Validation(
                "num_workers must be > 0".to_string(),
            ));
        }
        if r.block_size == 0 {
            return Err(ConfigError::Validation(
                "block_size must be > 0".to_string(),
            ));
        }
        for (name, w) in [
            ("kv_overlap_weight", r.kv_overlap_weight),
            ("load_balance_weight", r.load_balance_weight),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{} must be a finite non-negative number, got {}",
                    name, w
                )));
            }
        }
        if r.max_capacity_per_worker == 0 {
            return Err(ConfigError::Validation(
                "max_capacity_per_worker must be > 0".to_string(),
            ));
        }
        if r.cache_capacity_blocks == 0 {
            return Err(ConfigError::Validation(
                "cache_capacity_blocks must be > 0".to_string(),
            ));
        }
        if !available_load_models().contains(&r.load_model.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Unknown load_model '{}', expected one of: {}",
                r.load_model,
                available_load_models().join(", ")
            )));
        }

        let l = &self.latency;
        if !(l.cache_discount > 0.0 && l.cache_discount <= 1.0) {
            return Err(ConfigError::Validation(format!(
                "cache_discount must be in (0, 1], got {}",
                l.cache_discount
            )));
        }
        if !(l.base_cost_per_token_ms > 0.0) {
            return Err(ConfigError::Validation(
                "base_cost_per_token_ms must be > 0".to_string(),
            ));
        }
        if !(l.min_ttft_ms > 0.0) {
            return Err(ConfigError::Validation(
                "min_ttft_ms must be > 0".to_string(),
            ));
        }

        if self.metrics.speedup_history_limit == 0 {
            return Err(ConfigError::Validation(
                "speedup_history_limit must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn weights(&self) -> ScoreWeights {
        ScoreWeights::new(self.router.kv_overlap_weight, self.router.load_balance_weight)
    }

    pub fn latency_model(&self) -> LatencySimulator {
        self.latency.into()
    }
}
