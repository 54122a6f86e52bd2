//! Tokenized workloads for driving the router.
//!
//! - **JSONL files**: one `{"id": .., "token_ids": [..]}` object per line.
//!   Blank lines and `#` comments are skipped.
//! - **Synthetic generation**: requests built from a fixed set of shared
//!   system prompts followed by random suffixes, seeded for reproducibility.

use crate::block::Token;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("Failed to read workload file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse JSON at line {line}: {source}")]
    JsonParse {
        line: usize,
        source: serde_json::Error,
    },
    #[error("Invalid token id {value} at line {line}")]
    InvalidToken { line: usize, value: i64 },
    #[error("Failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// A prompt that has already been through the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedRequest {
    pub id: u64,
    pub token_ids: Vec<Token>,
}

/// On-disk record. Token ids are read as signed so out-of-range values are
/// reported instead of failing with a generic parse error.
#[derive(Debug, Deserialize)]
struct WorkloadRecord {
    id: Option<u64>,
    token_ids: Vec<i64>,
}

/// Load a JSONL workload file.
pub fn load_workload(path: &Path) -> Result<Vec<TokenizedRequest>, WorkloadError> {
    let file = std::fs::File::open(path)?;
    parse_workload(BufReader::new(file))
}

/// Parse a JSONL workload from any reader. Records without an id are
/// numbered by their position.
pub fn parse_workload<R: Read>(reader: BufReader<R>) -> Result<Vec<TokenizedRequest>, WorkloadError> {
    let mut requests = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record: WorkloadRecord =
            serde_json::from_str(trimmed).map_err(|e| WorkloadError::JsonParse {
                line: line_num + 1,
                source: e,
            })?;
        let token_ids = record
            .token_ids
            .iter()
            .map(|&value| {
                Token::try_from(value).map_err(|_| WorkloadError::InvalidToken {
                    line: line_num + 1,
                    value,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        requests.push(TokenizedRequest {
            id: record.id.unwrap_or(requests.len() as u64),
            token_ids,
        });
    }
    Ok(requests)
}

/// Write requests as JSONL.
pub fn write_workload(requests: &[TokenizedRequest], path: &Path) -> Result<(), WorkloadError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    for req in requests {
        serde_json::to_writer(&mut writer, req)
            .map_err(WorkloadError::Serialize)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Parameters for a synthetic shared-prefix workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticWorkload {
    pub num_requests: usize,
    /// Distinct shared system prompts. Zero disables sharing.
    pub num_prefixes: usize,
    /// Length of every shared prompt, in tokens.
    pub prefix_tokens: usize,
    /// Inclusive range of the per-request suffix length.
    pub suffix_tokens_min: usize,
    pub suffix_tokens_max: usize,
    /// Token ids are drawn from `0..vocab_size`.
    pub vocab_size: u32,
    pub seed: u64,
}

impl Default for SyntheticWorkload {
    fn default() -> Self {
        Self {
            num_requests: 1000,
            num_prefixes: 8,
            prefix_tokens: 512,
            suffix_tokens_min: 32,
            suffix_tokens_max: 256,
            vocab_size: 32_000,
            seed: 42,
        }
    }
}

impl SyntheticWorkload {
    pub fn generate(&self) -> Vec<TokenizedRequest> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let vocab = self.vocab_size.max(1);

        let prefixes: Vec<Vec<Token>> = (0..self.num_prefixes)
            .map(|_| {
                (0..self.prefix_tokens)
                    .map(|_| rng.gen_range(0..vocab))
                    .collect()
            })
            .collect();

        let lo = self.suffix_tokens_min.min(self.suffix_tokens_max);
        let hi = self.suffix_tokens_min.max(self.suffix_tokens_max);

        (0..self.num_requests)
            .map(|i| {
                let mut token_ids = if prefixes.is_empty() {
                    Vec::new()
                } else {
                    prefixes[rng.gen_range(0..prefixes.len())].clone()
                };
                let suffix_len = rng.gen_range(lo..=hi);
                token_ids.extend((0..suffix_len).map(|_| rng.gen_range(0..vocab)));
                TokenizedRequest {
                    id: i as u64,
                    token_ids,
                }
            })
            .collect()
    }
}
