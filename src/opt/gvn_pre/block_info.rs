//! Per-block state of the pass.
//!
//! The pass owns all per-block state in a side table indexed by block
//! id; nothing is stored on the IR itself.

use rustc_hash::FxHashMap;

use crate::ir::node::{BlockId, NodeId};

use super::value_set::ValueSet;

/// Dataflow sets and scratch state for one block.
#[derive(Debug, Default)]
pub struct BlockInfo {
    /// Clean expressions generated in this block.
    pub exp_gen: ValueSet,
    /// Values available at the end of this block, mapped to leaders.
    pub avail_out: ValueSet,
    /// Values anticipated at the top of this block.
    pub antic_in: ValueSet,
    /// Values the insertion engine already handled.
    pub antic_done: ValueSet,
    /// Values made available in this block by hoisting.
    pub new_set: ValueSet,
    /// Phi-translation cache: expression in the successor -> its
    /// translation into this block.
    pub trans: FxHashMap<NodeId, NodeId>,
    /// Scratch for one insertion decision: the expression to use for the
    /// current value on the path through this block.
    pub avail: Option<NodeId>,
    /// Scratch: whether the current value was already available here.
    pub found: bool,
}

/// Block-indexed store of [`BlockInfo`].
#[derive(Debug, Default)]
pub struct BlockInfoStore {
    infos: Vec<BlockInfo>,
}

impl BlockInfoStore {
    pub fn new(block_count: usize) -> Self {
        let mut infos = Vec::with_capacity(block_count);
        infos.resize_with(block_count, BlockInfo::default);
        BlockInfoStore { infos }
    }

    #[inline]
    pub fn get(&self, block: BlockId) -> &BlockInfo {
        &self.infos[block.as_usize()]
    }

    #[inline]
    pub fn get_mut(&mut self, block: BlockId) -> &mut BlockInfo {
        &mut self.infos[block.as_usize()]
    }
}
