//! Global Value Numbering - Partial Redundancy Elimination.
//!
//! The pass of VanDrunen & Hosking (2004): find expressions whose value
//! is computed on *some* of the paths into a join block, synthesize the
//! missing computations in the other predecessors, merge everything with
//! a phi, and exchange the now fully redundant occurrences for their
//! leaders.
//!
//! # Phases
//!
//! 1. **Value numbering + exp_gen** (`exp_gen`): a blockwise topological
//!    walk assigns every node a value and collects per-block generated
//!    expressions and availability leaves.
//! 2. **Avail_out** (`exp_gen::propagate_avail`): dominator-tree
//!    inheritance completes availability with the dominating leaders.
//! 3. **Antic_in** (`antic`): a backward fixed point with phi
//!    translation computes the anticipated values, capped at
//!    [`MAX_ANTIC_ITER`] iterations.
//! 4. **Insertion** (`insert`): a dominator pre-order fixed point
//!    detects partial redundancy, builds copies and phis, capped at
//!    [`MAX_INSERT_ITER`] iterations.
//! 5. **Hoist-high** (`hoist`, optional): pushes hoisted copies into the
//!    common dominator when their operands die there.
//! 6. **Elimination** (`eliminate`): deferred exchange of redundant
//!    nodes for their leaders.
//!
//! The caps are bounded-work guarantees, not error conditions: when a
//! fixed point is not reached the pass keeps whatever redundancies it
//! has proven and leaves the rest of the graph untouched.
//!
//! # Preconditions
//!
//! No critical edges (asserted), consistent CFG edges; dominators and
//! loops are computed internally. The graph may be left with fewer
//! properties than it had: callers re-derive what they need.

mod antic;
mod block_info;
mod eliminate;
mod exp_gen;
mod hoist;
mod infinite_loops;
mod insert;
pub mod value_set;
pub mod value_table;

pub use value_set::{ValueId, ValueSet};
pub use value_table::ValueTable;

use crate::ir::cfg::{has_critical_edge, topological_order, DominatorTree, LoopForest};
use crate::ir::graph::Graph;
use crate::ir::node::BlockId;
use crate::opt::OptimizationPass;

use block_info::BlockInfoStore;
use eliminate::ElimPair;
use infinite_loops::InfiniteLoops;

/// Antic_in iteration cap, as suggested by the GVN-PRE authors.
pub const MAX_ANTIC_ITER: usize = 10;
/// Insertion iteration cap, as suggested by the GVN-PRE authors.
pub const MAX_INSERT_ITER: usize = 3;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the GVN-PRE pass.
#[derive(Debug, Clone, Copy)]
pub struct GvnPreConfig {
    /// Push hoisted copies further up the dominator tree when their
    /// operands die there. Reduces register pressure; off by default.
    pub hoist_high: bool,
    /// Keep the anticipated sets of endless loops empty.
    pub no_inf_loops: bool,
    /// Do not propagate across back edges of endless loops during the
    /// first two antic iterations.
    pub no_inf_loops2: bool,
    /// Value-number memory loads. Requires an IR that can phi-translate
    /// memory chains; rejected by this implementation.
    pub loads: bool,
    /// Value-number division and remainder through their memory edges.
    /// Requires the same IR support; rejected by this implementation.
    pub divmods: bool,
}

impl Default for GvnPreConfig {
    fn default() -> Self {
        GvnPreConfig {
            hoist_high: false,
            no_inf_loops: false,
            no_inf_loops2: false,
            loads: false,
            divmods: false,
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Counters from the last run.
#[derive(Debug, Clone, Copy, Default)]
pub struct GvnPreStats {
    /// Nodes exchanged for a leader.
    pub replaced: usize,
    /// Exchanges whose leader predates the pass.
    pub replaced_fully: usize,
    /// Exchanges whose leader was created by the pass.
    pub replaced_partially: usize,
    /// Values found fully redundant through the dominator.
    pub fully_redundant: usize,
    /// Values found partially redundant and hoisted.
    pub partially_redundant: usize,
    /// Partially redundant values found in the first insert iteration.
    pub first_iter_found: usize,
    /// Antic_in iterations run.
    pub antic_iterations: usize,
    /// Insertion iterations run.
    pub insert_iterations: usize,
    /// Endless loops detected.
    pub infinite_loops: usize,
    /// Copies moved further up by hoist-high.
    pub hoist_high: usize,
}

// =============================================================================
// Pass Context
// =============================================================================

/// Everything the phases share, allocated per run and dropped wholesale.
struct GvnPreCtx<'a> {
    graph: &'a mut Graph,
    order: Vec<BlockId>,
    dom: DominatorTree,
    loops: LoopForest,
    inf: InfiniteLoops,
    infos: BlockInfoStore,
    table: ValueTable,
    config: GvnPreConfig,
    stats: GvnPreStats,
    /// Node count before the pass; nodes at or above this index were
    /// created here.
    last_idx: usize,
    /// Set when an iteration of a fixed point changed a set.
    changes: bool,
    /// First iteration of the current fixed point.
    first_iter: bool,
    /// Antic iteration counter, for the endless-loop policy bits.
    iteration: u32,
    /// Deferred exchanges.
    pairs: Vec<ElimPair>,
}

// =============================================================================
// The Pass
// =============================================================================

/// The GVN-PRE optimization pass.
#[derive(Debug, Default)]
pub struct GvnPre {
    config: GvnPreConfig,
    stats: GvnPreStats,
}

impl GvnPre {
    pub fn new() -> Self {
        Self::with_config(GvnPreConfig::default())
    }

    pub fn with_config(config: GvnPreConfig) -> Self {
        GvnPre {
            config,
            stats: GvnPreStats::default(),
        }
    }

    /// Counters from the last run.
    pub fn stats(&self) -> &GvnPreStats {
        &self.stats
    }

    /// Run the pass. Returns true if any node was exchanged.
    pub fn run(&mut self, graph: &mut Graph) -> bool {
        assert!(
            !self.config.loads && !self.config.divmods,
            "memory-dependent PRE requires phi translation of memory chains, \
             which this IR does not provide"
        );

        let order = topological_order(graph);
        let dom = DominatorTree::build(graph, &order);
        assert!(
            !has_critical_edge(graph),
            "critical edges must be split before GVN-PRE"
        );
        let loops = LoopForest::compute(graph, &dom, &order);
        let inf = InfiniteLoops::classify(graph, &loops, &order);

        let mut stats = GvnPreStats::default();
        stats.infinite_loops = inf.count;

        let last_idx = graph.node_count();
        let block_count = graph.block_count();

        let mut ctx = GvnPreCtx {
            graph,
            order,
            dom,
            loops,
            inf,
            infos: BlockInfoStore::new(block_count),
            table: ValueTable::new(),
            config: self.config,
            stats,
            last_idx,
            changes: false,
            first_iter: true,
            iteration: 0,
            pairs: Vec::new(),
        };

        exp_gen::build(ctx.graph, &mut ctx.table, &mut ctx.infos, &ctx.order);
        exp_gen::propagate_avail(ctx.graph, &ctx.dom, &mut ctx.infos);

        antic::solve(&mut ctx);
        insert::solve(&mut ctx);

        if ctx.config.hoist_high {
            hoist::run(&mut ctx);
        }

        eliminate::collect(&mut ctx);
        eliminate::apply(&mut ctx);

        debug_assert_eq!(ctx.graph.verify(), Ok(()));

        self.stats = ctx.stats;
        self.stats.replaced > 0
    }
}

impl OptimizationPass for GvnPre {
    fn name(&self) -> &'static str {
        "gvn-pre"
    }

    fn run(&mut self, graph: &mut Graph) -> bool {
        GvnPre::run(self, graph)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::mode::Mode;
    use crate::ir::operators::{ArithOp, Operator};

    /// start -> left/right -> join -> end, with a jmp in each branch.
    fn diamond(g: &mut Graph) -> (BlockId, BlockId, BlockId) {
        let left = g.add_block();
        let right = g.add_block();
        let join = g.add_block();
        g.connect(g.start_block, left);
        g.connect(g.start_block, right);
        g.connect(left, join);
        g.connect(right, join);
        g.connect(join, g.end_block);
        (left, right, join)
    }

    #[test]
    fn empty_graph_is_a_noop() {
        let mut g = Graph::new();
        g.connect(g.start_block, g.end_block);

        let mut pass = GvnPre::new();
        assert!(!pass.run(&mut g));
        assert_eq!(pass.stats().replaced, 0);
    }

    #[test]
    fn fully_redundant_join_gets_a_phi() {
        let mut g = Graph::new();
        let (left, right, join) = diamond(&mut g);
        let x = g.param(0);
        let y = g.param(1);
        let t1 = g.int_add(left, x, y);
        let t2 = g.int_add(right, x, y);
        let t3 = g.int_add(join, x, y);
        let ret = g.return_value(join, t3);

        let mut pass = GvnPre::new();
        assert!(pass.run(&mut g));

        // t3 is gone; the return now flows through a phi of t1 and t2.
        assert!(g.node(t3).is_dead());
        let merged = g.node(ret).inputs.get(0).unwrap();
        assert!(g.node(merged).is_phi());
        assert_eq!(g.node(merged).block, join);
        assert_eq!(g.node(merged).inputs.get(0), Some(t1));
        assert_eq!(g.node(merged).inputs.get(1), Some(t2));
        assert!(g.verify().is_ok());
    }

    #[test]
    fn partially_redundant_join_hoists_a_copy() {
        let mut g = Graph::new();
        let (left, _right, join) = diamond(&mut g);
        let x = g.param(0);
        let y = g.param(1);
        let t1 = g.int_add(left, x, y);
        let t3 = g.int_add(join, x, y);
        let ret = g.return_value(join, t3);

        let mut pass = GvnPre::new();
        assert!(pass.run(&mut g));
        assert_eq!(pass.stats().partially_redundant, 1);

        // A copy landed in the empty branch and a phi merges both.
        assert!(g.node(t3).is_dead());
        let merged = g.node(ret).inputs.get(0).unwrap();
        assert!(g.node(merged).is_phi());
        assert_eq!(g.node(merged).inputs.get(0), Some(t1));
        let copy = g.node(merged).inputs.get(1).unwrap();
        assert_ne!(copy, t1);
        assert_eq!(g.node(copy).op, g.node(t1).op);
        assert!(g.verify().is_ok());
    }

    #[test]
    fn non_redundant_value_is_left_alone() {
        // Available on no predecessor at all: hoisting would only add
        // instructions to every path.
        let mut g = Graph::new();
        let (_left, _right, join) = diamond(&mut g);
        let x = g.param(0);
        let y = g.param(1);
        let t3 = g.int_add(join, x, y);
        let ret = g.return_value(join, t3);

        let mut pass = GvnPre::new();
        assert!(!pass.run(&mut g));

        assert!(!g.node(t3).is_dead());
        assert_eq!(g.node(ret).inputs.get(0), Some(t3));
        assert_eq!(pass.stats().partially_redundant, 0);
    }

    #[test]
    fn dependent_chain_cascades() {
        // t3 = o3 + z depends on o3 = x * y, also computed locally. The
        // greediness check defers t3 until o3's copy exists on the empty
        // path; both end up hoisted with their own phis.
        let mut g = Graph::new();
        let (left, right, join) = diamond(&mut g);
        let x = g.param(0);
        let y = g.param(1);
        let z = g.param(2);
        let o1 = g.int_mul(left, x, y);
        let t1 = g.int_add(left, o1, z);
        let o3 = g.int_mul(join, x, y);
        let t3 = g.int_add(join, o3, z);
        let ret = g.return_value(join, t3);

        let mut pass = GvnPre::new();
        assert!(pass.run(&mut g));

        assert!(g.node(o3).is_dead());
        assert!(g.node(t3).is_dead());
        assert_eq!(pass.stats().partially_redundant, 2);

        // The right branch received copies of both computations.
        let right_ops: Vec<_> = g
            .block(right)
            .nodes
            .iter()
            .map(|&n| g.node(n).op)
            .collect();
        assert!(right_ops.contains(&g.node(o1).op));
        assert!(right_ops.contains(&g.node(t1).op));

        // The return flows through the merging phi.
        let merged = g.node(ret).inputs.get(0).unwrap();
        assert!(g.node(merged).is_phi());
        assert_eq!(g.node(merged).inputs.get(0), Some(t1));
        assert!(g.verify().is_ok());
    }

    #[test]
    fn phi_through_translation_finds_the_value() {
        let mut g = Graph::new();
        let (left, right, join) = diamond(&mut g);
        let follow = g.add_block();
        g.connect(join, follow);
        // Rewire join -> end through the follow block.
        // (diamond() connected join -> end; keep both, end tolerates it.)

        let a = g.const_int(1);
        let b = g.const_int(2);
        g.jmp(left);
        g.jmp(right);
        let p = g.new_phi(join, &[a, b], Mode::Int64);
        let one = g.const_int(1);
        let t = g.int_add(join, p, one);
        let u = g.int_add(follow, p, one);
        let ret = g.return_value(follow, u);

        let mut pass = GvnPre::new();
        assert!(pass.run(&mut g));

        // u is the same value as t and gets exchanged for it.
        assert!(g.node(u).is_dead());
        assert_eq!(g.node(ret).inputs.get(0), Some(t));
        assert!(g.verify().is_ok());
    }

    #[test]
    fn iteration_caps_hold() {
        let mut g = Graph::new();
        let (left, _right, join) = diamond(&mut g);
        let x = g.param(0);
        let y = g.param(1);
        let _t1 = g.int_add(left, x, y);
        let _t3 = g.int_add(join, x, y);

        let mut pass = GvnPre::new();
        pass.run(&mut g);

        assert!(pass.stats().antic_iterations <= MAX_ANTIC_ITER);
        assert!(pass.stats().insert_iterations <= MAX_INSERT_ITER);
    }

    #[test]
    #[should_panic(expected = "critical edges")]
    fn critical_edge_is_rejected() {
        let mut g = Graph::new();
        let a = g.add_block();
        let join = g.add_block();
        g.connect(g.start_block, a);
        g.connect(g.start_block, join);
        g.connect(a, join);
        g.connect(join, g.end_block);

        let mut pass = GvnPre::new();
        pass.run(&mut g);
    }

    #[test]
    #[should_panic(expected = "memory-dependent")]
    fn loads_flag_is_rejected() {
        let mut g = Graph::new();
        g.connect(g.start_block, g.end_block);

        let mut pass = GvnPre::with_config(GvnPreConfig {
            loads: true,
            ..Default::default()
        });
        pass.run(&mut g);
    }

    #[test]
    fn pass_trait_name() {
        let pass = GvnPre::new();
        assert_eq!(OptimizationPass::name(&pass), "gvn-pre");
    }

    #[test]
    fn dominating_leader_needs_no_phi() {
        // The value is computed in the dominator: fully redundant, and
        // the local occurrence is exchanged directly.
        let mut g = Graph::new();
        let (_left, _right, join) = diamond(&mut g);
        let x = g.param(0);
        let y = g.param(1);
        let t0 = g.int_add(g.start_block, x, y);
        let t3 = g.int_add(join, x, y);
        let ret = g.return_value(join, t3);

        let mut pass = GvnPre::new();
        assert!(pass.run(&mut g));

        assert!(g.node(t3).is_dead());
        assert_eq!(g.node(ret).inputs.get(0), Some(t0));
        assert_eq!(pass.stats().fully_redundant, 1);
        assert_eq!(pass.stats().replaced_fully, 1);
        assert!(g.block(join).nodes.iter().all(|&n| !g.node(n).is_phi()));
        assert!(g.verify().is_ok());
    }

    #[test]
    fn loop_invariant_phi_collapses() {
        // A loop header computing an invariant gets a phi of (copy in
        // preheader, itself); the eliminator collapses that degenerate
        // phi and the loop body ends up computation-free.
        let mut g = Graph::new();
        let pre = g.add_block();
        let header = g.add_block();
        let latch = g.add_block();
        let exit = g.add_block();
        g.connect(g.start_block, pre);
        g.connect(pre, header);
        g.connect(header, latch);
        g.connect(header, exit);
        g.connect(latch, header);
        g.connect(exit, g.end_block);

        let x = g.param(0);
        let y = g.param(1);
        let cond_in = g.param(2);
        g.jmp(pre);
        let t3 = g.int_add(header, x, y);
        g.cond(header, cond_in);
        g.jmp(latch);
        let ret = g.return_value(exit, t3);

        let mut pass = GvnPre::new();
        assert!(pass.run(&mut g));

        // t3 left the loop; its replacement sits in the preheader.
        assert!(g.node(t3).is_dead());
        let replacement = g.node(ret).inputs.get(0).unwrap();
        assert_eq!(g.node(replacement).block, pre);
        assert_eq!(g.node(replacement).op, Operator::Arith(ArithOp::Add));

        // No phi survived in the header.
        assert!(g.block(header).nodes.iter().all(|&n| !g.node(n).is_phi()));
        assert!(g.verify().is_ok());
    }
}
