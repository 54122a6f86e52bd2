//! Per-worker radix cache keyed by block hash chains.
//!
//! Models the prefix cache of a single worker, including:
//! - Longest-prefix lookup over chained block hashes
//! - Insertion of the unmatched suffix of a request
//! - Reference counting for blocks pinned by live requests
//! - LRU eviction of leaves (unreferenced leaves first) down to a capacity
//!
//! Each node stands for one cached block. The root is the empty prefix and is
//! never evicted.

use crate::block::BlockHash;
use crate::clock::AccessClock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Identifier of a node inside one [`RadixCache`]. Ids are never reused.
pub type NodeId = u64;

const ROOT: NodeId = 0;

/// A single cached block in the tree.
#[derive(Debug, Clone)]
pub struct RadixNode {
    /// Edge label into this node (None for root).
    pub block_hash: Option<BlockHash>,
    /// Parent node (None for root).
    pub parent: Option<NodeId>,
    /// Child nodes keyed by their block hash.
    pub children: HashMap<BlockHash, NodeId>,
    /// Logical tick of the last lookup or insertion that passed through.
    pub last_access: u64,
    /// Live requests pinning this node.
    pub ref_count: u32,
    /// Number of edges between the root and this node.
    pub depth: usize,
}

impl RadixNode {
    fn root() -> Self {
        Self {
            block_hash: None,
            parent: None,
            children: HashMap::new(),
            last_access: 0,
            ref_count: 0,
            depth: 0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Statistics snapshot for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadixStats {
    /// Every node in the tree, root included, each counted once.
    pub total_nodes: u64,
    /// Sum of root-to-leaf path lengths.
    pub total_cached_blocks: u64,
    /// Non-root nodes, i.e. distinct cached blocks.
    pub resident_blocks: u64,
    /// Nodes removed by eviction since creation.
    pub evictions: u64,
}

impl RadixStats {
    /// Combine stats from several caches.
    pub fn merge(&self, other: &RadixStats) -> RadixStats {
        RadixStats {
            total_nodes: self.total_nodes + other.total_nodes,
            total_cached_blocks: self.total_cached_blocks + other.total_cached_blocks,
            resident_blocks: self.resident_blocks + other.resident_blocks,
            evictions: self.evictions + other.evictions,
        }
    }
}

/// Capacity-bounded radix cache for a single worker.
#[derive(Debug, Clone)]
pub struct RadixCache {
    nodes: HashMap<NodeId, RadixNode>,
    /// Leaves ordered for eviction: `(last_access, id)`. Ids grow with
    /// insertion order, so equal ticks fall back to oldest-inserted first.
    leaves: BTreeSet<(u64, NodeId)>,
    clock: AccessClock,
    next_id: NodeId,
    /// Capacity in cached blocks (path-sum definition).
    capacity_blocks: u64,
    /// Running sum of root-to-leaf path lengths.
    path_blocks: u64,
    evictions: u64,
}

impl RadixCache {
    /// Create an empty cache holding at most `capacity_blocks` cached blocks.
    pub fn new(capacity_blocks: u64) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT, RadixNode::root());
        Self {
            nodes,
            leaves: BTreeSet::new(),
            clock: AccessClock::new(),
            next_id: ROOT + 1,
            capacity_blocks,
            path_blocks: 0,
            evictions: 0,
        }
    }

    pub fn capacity_blocks(&self) -> u64 {
        self.capacity_blocks
    }

    /// Cached blocks as counted against capacity.
    pub fn cached_blocks(&self) -> u64 {
        self.path_blocks
    }

    /// Look up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&RadixNode> {
        self.nodes.get(&id)
    }

    /// Whether every hash of `chain` is cached, in order.
    pub fn contains_chain(&self, chain: &[BlockHash]) -> bool {
        self.probe(chain) == chain.len()
    }

    /// Node ids along the longest cached prefix of `chain`.
    fn walk(&self, chain: &[BlockHash]) -> Vec<NodeId> {
        let mut path = Vec::with_capacity(chain.len());
        let mut current = ROOT;
        for (idx, hash) in chain.iter().enumerate() {
            let next = self
                .nodes
                .get(&current)
                .and_then(|node| node.children.get(hash))
                .copied();
            match next {
                Some(child) => {
                    path.push(child);
                    current = child;
                }
                None => {
                    tracing::trace!(index = idx, hash = hash.0, "radix walk stopped");
                    break;
                }
            }
        }
        path
    }

    /// Longest cached prefix of `chain`, without refreshing recency.
    pub fn probe(&self, chain: &[BlockHash]) -> usize {
        self.walk(chain).len()
    }

    /// Longest cached prefix of `chain`. Every visited node is touched.
    pub fn match_prefix(&mut self, chain: &[BlockHash]) -> usize {
        let path = self.walk(chain);
        let now = self.clock.tick();
        for &id in &path {
            self.touch(id, now);
        }
        path.len()
    }

    /// Insert the unmatched suffix of `chain`, returning the number of new
    /// nodes.
    ///
    /// `matched` is the caller's probe result for the same chain. The walk
    /// reuses any node that already exists, so a stale count never
    /// duplicates a block. Runs eviction down to capacity afterwards if
    /// needed.
    pub fn insert(&mut self, chain: &[BlockHash], matched: usize) -> usize {
        let now = self.clock.tick();
        let mut current = ROOT;
        let mut created = 0usize;

        for hash in chain {
            let existing = self
                .nodes
                .get(&current)
                .and_then(|node| node.children.get(hash))
                .copied();
            current = match existing {
                Some(child) => {
                    self.touch(child, now);
                    child
                }
                None => {
                    created += 1;
                    self.create_child(current, *hash, now)
                }
            };
        }

        tracing::trace!(
            chain_len = chain.len(),
            matched,
            created,
            cached_blocks = self.path_blocks,
            "radix insert"
        );

        if self.path_blocks > self.capacity_blocks {
            self.evict(self.capacity_blocks);
        }
        created
    }

    /// Evict least-recently-touched leaves until at most `target_blocks`
    /// cached blocks remain (or only the root is left). Returns the number of
    /// removed nodes.
    pub fn evict(&mut self, target_blocks: u64) -> usize {
        let before = self.path_blocks;
        let mut removed = 0usize;
        while self.path_blocks > target_blocks {
            let Some(victim) = self.pick_victim() else {
                break;
            };
            self.remove_leaf(victim);
            removed += 1;
        }
        if removed > 0 {
            self.evictions += removed as u64;
            tracing::debug!(
                removed,
                before,
                after = self.path_blocks,
                target = target_blocks,
                "radix eviction"
            );
        }
        removed
    }

    /// Pin every cached node along `chain` for a live request.
    ///
    /// Returns the pinned ids; pass them back to [`RadixCache::release`].
    pub fn acquire(&mut self, chain: &[BlockHash]) -> Vec<NodeId> {
        let path = self.walk(chain);
        for id in &path {
            if let Some(node) = self.nodes.get_mut(id) {
                node.ref_count += 1;
            }
        }
        path
    }

    /// Unpin nodes returned by [`RadixCache::acquire`]. Nodes evicted in the
    /// meantime are skipped.
    pub fn release(&mut self, pinned: &[NodeId]) {
        for id in pinned {
            if let Some(node) = self.nodes.get_mut(id) {
                node.ref_count = node.ref_count.saturating_sub(1);
            }
        }
    }

    /// Get a statistics snapshot.
    pub fn stats(&self) -> RadixStats {
        RadixStats {
            total_nodes: self.nodes.len() as u64,
            total_cached_blocks: self.path_blocks,
            resident_blocks: (self.nodes.len() - 1) as u64,
            evictions: self.evictions,
        }
    }

    /// Drop every cached block, keeping the root. The clock and id counter
    /// keep running so ids handed out before the clear stay unique.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.insert(ROOT, RadixNode::root());
        self.leaves.clear();
        self.path_blocks = 0;
        self.evictions = 0;
    }

    /// Refresh the recency of a node, re-keying it in the leaf index.
    fn touch(&mut self, id: NodeId, now: u64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            if node.is_leaf() {
                self.leaves.remove(&(node.last_access, id));
                self.leaves.insert((now, id));
            }
            node.last_access = now;
        }
    }

    fn create_child(&mut self, parent_id: NodeId, hash: BlockHash, now: u64) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;

        let mut depth = 1;
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            depth = parent.depth + 1;
            if parent_id != ROOT && parent.is_leaf() {
                // The parent's path is extended by one block.
                self.leaves.remove(&(parent.last_access, parent_id));
                self.path_blocks += 1;
            } else {
                self.path_blocks += depth as u64;
            }
            parent.children.insert(hash, id);
        }

        self.nodes.insert(
            id,
            RadixNode {
                block_hash: Some(hash),
                parent: Some(parent_id),
                children: HashMap::new(),
                last_access: now,
                ref_count: 0,
                depth,
            },
        );
        self.leaves.insert((now, id));
        id
    }

    /// Oldest unreferenced leaf, or the oldest leaf if every leaf is pinned.
    fn pick_victim(&self) -> Option<NodeId> {
        self.leaves
            .iter()
            .find(|(_, id)| self.nodes.get(id).is_some_and(|n| n.ref_count == 0))
            .or_else(|| self.leaves.iter().next())
            .map(|&(_, id)| id)
    }

    fn remove_leaf(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        self.leaves.remove(&(node.last_access, id));

        let (Some(parent_id), Some(hash)) = (node.parent, node.block_hash) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.children.remove(&hash);
            if parent_id != ROOT && parent.is_leaf() {
                // The path now ends at the parent.
                self.path_blocks = self.path_blocks.saturating_sub(1);
                self.leaves.insert((parent.last_access, parent_id));
            } else {
                self.path_blocks = self.path_blocks.saturating_sub(node.depth as u64);
            }
        }
    }
}
