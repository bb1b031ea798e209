//! The scheduled Sea-of-Nodes graph.
//!
//! Data flow is edges between nodes; control flow is edges between
//! blocks. Every node is assigned to a block and blocks keep a schedule
//! (a topologically ordered node list), so passes that need an ordered
//! view get one without a separate scheduling step.
//!
//! Two kinds of node creation exist:
//! - [`Graph::add_node`] and friends create *executable* nodes: they are
//!   appended to their block's schedule and registered in the use chains.
//! - [`Graph::new_value_rep`] creates a *value representative*: a node
//!   that only exists so value numbering can name the result of a phi
//!   translation. Representatives are never scheduled and never used.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::arena::Arena;
use super::mode::Mode;
use super::node::{BlockId, InputList, Node, NodeFlags, NodeId};
use super::operators::{ArithOp, CmpOp, Operator, PROJ_RES};

// =============================================================================
// Blocks
// =============================================================================

/// A basic block: CFG edges plus the node schedule.
///
/// Predecessor order is significant: input `i` of a phi in this block
/// corresponds to `preds[i]`.
#[derive(Debug, Clone, Default)]
pub struct BlockData {
    /// Control-flow predecessors, in phi-input order.
    pub preds: Vec<BlockId>,
    /// Control-flow successors.
    pub succs: Vec<BlockId>,
    /// Scheduled nodes, topologically ordered; phis first, terminator last.
    pub nodes: Vec<NodeId>,
}

// =============================================================================
// Graph
// =============================================================================

/// A procedure body.
#[derive(Clone)]
pub struct Graph {
    nodes: Arena<Node>,
    blocks: Arena<BlockData>,
    /// For each node, the executable nodes consuming its result.
    uses: FxHashMap<NodeId, Vec<NodeId>>,
    /// Entry block; constants and parameters live here.
    pub start_block: BlockId,
    /// Exit block; has no successors.
    pub end_block: BlockId,
}

impl Graph {
    /// Create a graph with empty start and end blocks.
    pub fn new() -> Self {
        let mut blocks = Arena::new();
        let start_block = blocks.alloc(BlockData::default());
        let end_block = blocks.alloc(BlockData::default());

        Graph {
            nodes: Arena::with_capacity(64),
            blocks,
            uses: FxHashMap::default(),
            start_block,
            end_block,
        }
    }

    // =========================================================================
    // Access
    // =========================================================================

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &BlockData {
        &self.blocks[id]
    }

    /// Number of allocated nodes; also the index the next node will get.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        self.blocks.ids()
    }

    /// Executable users of a node's result.
    pub fn uses(&self, id: NodeId) -> &[NodeId] {
        self.uses.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Position of `pred` among `succ`'s predecessors.
    pub fn pred_index(&self, succ: BlockId, pred: BlockId) -> Option<usize> {
        self.blocks[succ].preds.iter().position(|&p| p == pred)
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Allocate a fresh, unconnected block.
    pub fn add_block(&mut self) -> BlockId {
        self.blocks.alloc(BlockData::default())
    }

    /// Add a control-flow edge `pred -> succ`. The edge's position in
    /// `succ.preds` fixes the phi-input slot for this path.
    pub fn connect(&mut self, pred: BlockId, succ: BlockId) {
        self.blocks[pred].succs.push(succ);
        self.blocks[succ].preds.push(pred);
    }

    /// Create an executable node at the end of `block`'s schedule.
    pub fn add_node(&mut self, block: BlockId, op: Operator, mode: Mode, inputs: &[NodeId]) -> NodeId {
        let id = self
            .nodes
            .alloc(Node::new(op, mode, block, InputList::from_slice(inputs)));
        for &input in inputs {
            self.uses.entry(input).or_default().push(id);
        }
        self.blocks[block].nodes.push(id);
        id
    }

    /// Create an executable node scheduled before `block`'s terminator,
    /// after every existing non-terminator node.
    pub fn add_node_before_terminator(
        &mut self,
        block: BlockId,
        op: Operator,
        mode: Mode,
        inputs: &[NodeId],
    ) -> NodeId {
        let id = self.add_node(block, op, mode, inputs);
        let schedule = &mut self.blocks[block].nodes;
        debug_assert_eq!(schedule.last(), Some(&id));
        schedule.pop();
        let at = schedule
            .iter()
            .position(|&n| self.nodes[n].op.is_terminator())
            .unwrap_or(schedule.len());
        schedule.insert(at, id);
        id
    }

    /// Create a phi in `block`; input `i` flows in from `preds[i]`.
    /// Phis sit at the front of the schedule.
    pub fn new_phi(&mut self, block: BlockId, inputs: &[NodeId], mode: Mode) -> NodeId {
        assert_eq!(
            inputs.len(),
            self.blocks[block].preds.len(),
            "phi arity must match predecessor count"
        );
        let id = self
            .nodes
            .alloc(Node::new(Operator::Phi, mode, block, InputList::from_slice(inputs)));
        for &input in inputs {
            self.uses.entry(input).or_default().push(id);
        }
        let schedule = &mut self.blocks[block].nodes;
        let at = schedule
            .iter()
            .position(|&n| !self.nodes[n].is_phi())
            .unwrap_or(schedule.len());
        schedule.insert(at, id);
        id
    }

    /// Create a value representative: same shape as an executable node
    /// but never scheduled and never entered into the use chains. Its
    /// block is recorded for bookkeeping only.
    pub fn new_value_rep(
        &mut self,
        block: BlockId,
        op: Operator,
        mode: Mode,
        inputs: &[NodeId],
    ) -> NodeId {
        let mut node = Node::new(op, mode, block, InputList::from_slice(inputs));
        node.flags |= NodeFlags::REP;
        self.nodes.alloc(node)
    }

    /// Override the pinned state of a node. Unpinning a `Div`/`Mod` is
    /// how the graph owner asserts the operation cannot trap.
    pub fn set_pinned(&mut self, id: NodeId, pinned: bool) {
        if pinned {
            self.nodes[id].flags |= NodeFlags::PINNED;
        } else {
            self.nodes[id].flags &= !NodeFlags::PINNED;
        }
    }

    // =========================================================================
    // Convenience constructors
    // =========================================================================

    /// Integer constant, placed in the start block.
    pub fn const_int(&mut self, value: i64) -> NodeId {
        self.add_node(self.start_block, Operator::ConstInt(value), Mode::Int64, &[])
    }

    /// Function parameter, placed in the start block.
    pub fn param(&mut self, index: u16) -> NodeId {
        self.add_node(self.start_block, Operator::Param(index), Mode::Int64, &[])
    }

    pub fn int_add(&mut self, block: BlockId, lhs: NodeId, rhs: NodeId) -> NodeId {
        let mode = self.nodes[lhs].mode;
        self.add_node(block, Operator::Arith(ArithOp::Add), mode, &[lhs, rhs])
    }

    pub fn int_sub(&mut self, block: BlockId, lhs: NodeId, rhs: NodeId) -> NodeId {
        let mode = self.nodes[lhs].mode;
        self.add_node(block, Operator::Arith(ArithOp::Sub), mode, &[lhs, rhs])
    }

    pub fn int_mul(&mut self, block: BlockId, lhs: NodeId, rhs: NodeId) -> NodeId {
        let mode = self.nodes[lhs].mode;
        self.add_node(block, Operator::Arith(ArithOp::Mul), mode, &[lhs, rhs])
    }

    pub fn int_cmp(&mut self, block: BlockId, op: CmpOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.add_node(block, Operator::Cmp(op), Mode::Bool, &[lhs, rhs])
    }

    /// Division as a tuple-mode node; extract the quotient with
    /// [`Graph::proj_res`].
    pub fn int_div(&mut self, block: BlockId, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.add_node(block, Operator::Div, Mode::Tuple, &[lhs, rhs])
    }

    /// Data-result projection of a tuple-mode node.
    pub fn proj_res(&mut self, block: BlockId, tuple: NodeId, mode: Mode) -> NodeId {
        self.add_node(block, Operator::Proj(PROJ_RES), mode, &[tuple])
    }

    pub fn jmp(&mut self, block: BlockId) -> NodeId {
        self.add_node(block, Operator::Jmp, Mode::Control, &[])
    }

    pub fn cond(&mut self, block: BlockId, selector: NodeId) -> NodeId {
        self.add_node(block, Operator::Cond, Mode::Control, &[selector])
    }

    pub fn return_value(&mut self, block: BlockId, value: NodeId) -> NodeId {
        self.add_node(block, Operator::Return, Mode::Control, &[value])
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Rewire one input of a node, keeping the use chains consistent.
    /// This is how loop phis get their back-edge input closed.
    pub fn set_input(&mut self, node: NodeId, index: usize, new_input: NodeId) {
        if let Some(old) = self.nodes[node].inputs.get(index) {
            if let Some(users) = self.uses.get_mut(&old) {
                if let Some(pos) = users.iter().position(|&u| u == node) {
                    users.swap_remove(pos);
                }
            }
        }
        self.nodes[node].inputs.set(index, new_input);
        self.uses.entry(new_input).or_default().push(node);
    }

    /// Redirect every use of `old` to `new` and remove `old` from the
    /// graph. The arena slot stays so indices remain stable.
    pub fn exchange(&mut self, old: NodeId, new: NodeId) {
        assert_ne!(old, new, "exchange with self");

        let users = self.uses.remove(&old).unwrap_or_default();
        for &user in &users {
            let arity = self.nodes[user].inputs.len();
            for i in 0..arity {
                if self.nodes[user].inputs.get(i) == Some(old) {
                    self.nodes[user].inputs.set(i, new);
                }
            }
        }
        self.uses.entry(new).or_default().extend(users);

        self.kill(old);
    }

    /// Mark a node dead and drop it from its schedule and use chains.
    pub fn kill(&mut self, id: NodeId) {
        let inputs: SmallVec<[NodeId; 4]> = self.nodes[id].inputs.iter().collect();
        for input in inputs {
            if let Some(users) = self.uses.get_mut(&input) {
                users.retain(|&u| u != id);
            }
        }
        let block = self.nodes[id].block;
        self.blocks[block].nodes.retain(|&n| n != id);
        self.nodes[id].flags |= NodeFlags::DEAD;
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Structural consistency check, used by tests and debug builds.
    pub fn verify(&self) -> Result<(), String> {
        for (id, node) in self.nodes.iter() {
            if node.is_dead() || node.is_rep() {
                continue;
            }
            for input in node.inputs.iter() {
                if input.as_usize() >= self.nodes.len() {
                    return Err(format!("node {id:?} has out-of-range input {input:?}"));
                }
                if self.nodes[input].is_dead() {
                    return Err(format!("node {id:?} uses dead node {input:?}"));
                }
            }
            if node.is_phi() {
                let preds = self.blocks[node.block].preds.len();
                if node.inputs.len() != preds {
                    return Err(format!(
                        "phi {id:?} has {} inputs for {} predecessors",
                        node.inputs.len(),
                        preds
                    ));
                }
            }
        }
        for block in self.blocks.ids() {
            for &n in &self.blocks[block].nodes {
                if self.nodes[n].block != block {
                    return Err(format!("node {n:?} scheduled outside its block"));
                }
            }
        }
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Graph ({} nodes, {} blocks)", self.nodes.len(), self.blocks.len())?;
        for block in self.blocks.ids() {
            writeln!(f, "  block {block:?} preds={:?}", self.blocks[block].preds)?;
            for &n in &self.blocks[block].nodes {
                let node = &self.nodes[n];
                writeln!(f, "    {n:?}: {:?} {} {:?}", node.op, node.mode, node.inputs)?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
