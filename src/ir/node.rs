//! IR node definitions.

use bitflags::bitflags;
use smallvec::SmallVec;

use super::arena::Id;
use super::mode::Mode;
use super::operators::Operator;

/// Node handle.
pub type NodeId = Id<Node>;

bitflags! {
    /// Per-node state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// Removed from the graph; kept in the arena for index stability.
        const DEAD = 1 << 0;
        /// May not be moved out of its block.
        const PINNED = 1 << 1;
        /// Value representative only; never scheduled, never executed.
        const REP = 1 << 2;
    }
}

// =============================================================================
// Input List
// =============================================================================

/// Ordered inputs of a node, inlined for the common arities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputList {
    Empty,
    Single(NodeId),
    Pair(NodeId, NodeId),
    Many(SmallVec<[NodeId; 4]>),
}

impl InputList {
    pub fn from_slice(inputs: &[NodeId]) -> Self {
        match inputs {
            [] => InputList::Empty,
            [a] => InputList::Single(*a),
            [a, b] => InputList::Pair(*a, *b),
            more => InputList::Many(SmallVec::from_slice(more)),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            InputList::Empty => 0,
            InputList::Single(_) => 1,
            InputList::Pair(_, _) => 2,
            InputList::Many(v) => v.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<NodeId> {
        match (self, index) {
            (InputList::Single(a), 0) => Some(*a),
            (InputList::Pair(a, _), 0) => Some(*a),
            (InputList::Pair(_, b), 1) => Some(*b),
            (InputList::Many(v), i) => v.get(i).copied(),
            _ => None,
        }
    }

    pub fn set(&mut self, index: usize, value: NodeId) {
        match (self, index) {
            (InputList::Single(a), 0) => *a = value,
            (InputList::Pair(a, _), 0) => *a = value,
            (InputList::Pair(_, b), 1) => *b = value,
            (InputList::Many(v), i) if i < v.len() => v[i] = value,
            _ => panic!("input index out of range"),
        }
    }

    pub fn iter(&self) -> InputIter<'_> {
        InputIter { list: self, pos: 0 }
    }
}

/// Iterator over an input list.
pub struct InputIter<'a> {
    list: &'a InputList,
    pos: usize,
}

impl Iterator for InputIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let item = self.list.get(self.pos);
        if item.is_some() {
            self.pos += 1;
        }
        item
    }
}

// =============================================================================
// Node
// =============================================================================

/// Block id forward declaration; the block arena lives in `graph.rs`.
pub type BlockId = Id<crate::ir::graph::BlockData>;

/// A single IR operation.
#[derive(Debug, Clone)]
pub struct Node {
    /// What this node computes, attributes included.
    pub op: Operator,
    /// Result mode.
    pub mode: Mode,
    /// Owning block. For value representatives this is nominal only.
    pub block: BlockId,
    /// Ordered data inputs. For phis, input `i` corresponds to the owning
    /// block's predecessor `i`.
    pub inputs: InputList,
    /// State bits.
    pub flags: NodeFlags,
}

impl Node {
    pub fn new(op: Operator, mode: Mode, block: BlockId, inputs: InputList) -> Self {
        let mut flags = NodeFlags::empty();
        if op.is_pinned_by_default() {
            flags |= NodeFlags::PINNED;
        }
        Node {
            op,
            mode,
            block,
            inputs,
            flags,
        }
    }

    #[inline]
    pub fn is_phi(&self) -> bool {
        self.op.is_phi()
    }

    #[inline]
    pub fn is_const(&self) -> bool {
        self.op.is_const()
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.flags.contains(NodeFlags::PINNED)
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.flags.contains(NodeFlags::DEAD)
    }

    /// Value representative created during phi translation; not part of
    /// the executable graph.
    #[inline]
    pub fn is_rep(&self) -> bool {
        self.flags.contains(NodeFlags::REP)
    }

    /// Integer constant payload, if any.
    pub fn const_value(&self) -> Option<i64> {
        match self.op {
            Operator::ConstInt(v) => Some(v),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
