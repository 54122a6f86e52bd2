//! Block splitting and chained block hashing.
//!
//! A prompt is cut into fixed-size blocks of token ids. Each block's hash
//! folds in the hash of the block before it, so two prompts share a cached
//! prefix of `k` blocks exactly when their first `k` block hashes agree.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xxhash_rust::xxh3;

/// A token id as produced by the external tokenizer.
pub type Token = u32;

/// Seed for XXH3 block hashing.
pub const XXH3_SEED: u64 = 1337;

/// Tag bit set when the block's hash folds in a parent hash.
const TAG_CHAINED: u8 = 0b01;
/// Tag bit set for a ragged (shorter than `block_size`) final block.
const TAG_RAGGED: u8 = 0b10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("block_size must be > 0")]
    InvalidBlockSize,
    #[error("prompt of {len} tokens exceeds the limit of {limit} tokens")]
    PromptTooLong { len: usize, limit: usize },
}

/// Hash of a block, chained over every block before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockHash(pub u64);

/// A contiguous slice of a prompt's token ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block<'a> {
    /// Position of the block in the prompt.
    pub index: usize,
    pub token_ids: &'a [Token],
}

impl Block<'_> {
    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }
}

/// Deterministic block splitter and chain hasher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHasher {
    block_size: usize,
}

impl BlockHasher {
    pub fn new(block_size: usize) -> Result<Self, BlockError> {
        if block_size == 0 {
            return Err(BlockError::InvalidBlockSize);
        }
        Ok(Self { block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks a prompt of `len` tokens splits into, counting a
    /// ragged final block.
    pub fn block_count(&self, len: usize) -> usize {
        len.div_ceil(self.block_size)
    }

    /// Number of complete blocks in a prompt of `len` tokens.
    pub fn full_block_count(&self, len: usize) -> usize {
        len / self.block_size
    }

    /// Reject prompts longer than `limit` tokens.
    pub fn validate_prompt(&self, token_ids: &[Token], limit: usize) -> Result<(), BlockError> {
        if token_ids.len() > limit {
            return Err(BlockError::PromptTooLong {
                len: token_ids.len(),
                limit,
            });
        }
        Ok(())
    }

    /// Split a prompt into ordered blocks. The last block may be shorter.
    pub fn split<'a>(&self, token_ids: &'a [Token]) -> Vec<Block<'a>> {
        token_ids
            .chunks(self.block_size)
            .enumerate()
            .map(|(index, token_ids)| Block { index, token_ids })
            .collect()
    }

    /// Compute the hash chain for a sequence of blocks.
    ///
    /// - The first block hashes its own tokens.
    /// - Every later block hashes `parent_hash ‖ tokens`.
    /// - A ragged block is tagged so it never equals a full-size block.
    pub fn chain_hash(&self, blocks: &[Block<'_>]) -> Vec<BlockHash> {
        let mut hashes: Vec<BlockHash> = Vec::with_capacity(blocks.len());
        let mut bytes: Vec<u8> = Vec::with_capacity(1 + 8 + self.block_size * 4);

        for block in blocks {
            bytes.clear();
            let parent = hashes.last().copied();

            let mut tag = 0u8;
            if parent.is_some() {
                tag |= TAG_CHAINED;
            }
            if block.len() < self.block_size {
                tag |= TAG_RAGGED;
            }
            bytes.push(tag);

            if let Some(BlockHash(parent)) = parent {
                bytes.extend_from_slice(&parent.to_le_bytes());
            }
            for token in block.token_ids {
                bytes.extend_from_slice(&token.to_le_bytes());
            }

            hashes.push(BlockHash(xxh3::xxh3_64_with_seed(&bytes, XXH3_SEED)));
        }

        hashes
    }

    /// Split and chain-hash a prompt in one step.
    pub fn hash_tokens(&self, token_ids: &[Token]) -> Vec<BlockHash> {
        self.chain_hash(&self.split(token_ids))
    }
}
