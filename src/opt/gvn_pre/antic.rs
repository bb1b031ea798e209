//! Anticipated values.
//!
//! `antic_in(B)` holds the values that are computed on every path from
//! `B` to the exit with operands still intact. The computation runs
//! backwards over the CFG and has to rewrite expressions when they cross
//! a control-flow merge: an expression using a phi's result stands, in a
//! given predecessor, for the expression over that predecessor's phi
//! input. That rewrite is *phi translation*.
//!
//! Translated expressions are materialized as value representatives
//! only; real nodes are created later by the insertion engine.

use smallvec::SmallVec;

use crate::ir::graph::Graph;
use crate::ir::node::{BlockId, NodeId};

use super::block_info::{BlockInfo, BlockInfoStore};
use super::exp_gen::is_clean_in_block;
use super::value_table::ValueTable;
use super::{GvnPreCtx, MAX_ANTIC_ITER};

/// Cached translation of `node` into `block`, if any. Constants
/// translate to themselves.
pub(super) fn get_translated(
    graph: &Graph,
    infos: &BlockInfoStore,
    block: BlockId,
    node: NodeId,
) -> Option<NodeId> {
    if graph.node(node).is_const() {
        return Some(node);
    }
    infos.get(block).trans.get(&node).copied()
}

/// Record the translation of `node` into a block's cache. Constants
/// need no entry.
pub(super) fn set_translated(graph: &Graph, info: &mut BlockInfo, node: NodeId, trans: NodeId) {
    if graph.node(node).is_const() {
        return;
    }
    info.trans.insert(node, trans);
}

/// Translate `expr` from the join block `succ` into its predecessor at
/// input position `pos`.
///
/// The result is a node whose value is what `expr` evaluates to at the
/// bottom of that predecessor. Operand lookup goes through the anti
/// leaders: a value's representative in `antic_in(succ)` is the node
/// whose translation is cached, so chains of merges translate step by
/// step.
pub(super) fn phi_translate(
    graph: &mut Graph,
    table: &mut ValueTable,
    infos: &BlockInfoStore,
    succ: BlockId,
    pos: usize,
    expr: NodeId,
) -> NodeId {
    let pred_block = graph.block(succ).preds[pos];

    if graph.node(expr).is_phi() {
        if graph.node(expr).block == succ {
            return graph.node(expr).inputs.get(pos).expect("phi input per pred");
        }
        // A phi of another block keeps its meaning across this merge.
        return expr;
    }

    let arity = graph.node(expr).inputs.len();
    let mut translated: SmallVec<[NodeId; 4]> = SmallVec::with_capacity(arity);
    let mut needed = false;

    for i in 0..arity {
        let pred = graph.node(expr).inputs.get(i).unwrap();
        let value = table.identify(graph, pred);
        let leader = infos.get(succ).antic_in.lookup(value).unwrap_or(pred);

        let new_pred = match get_translated(graph, infos, pred_block, leader) {
            None => pred,
            Some(t) => {
                if table.identify(graph, t) != table.identify(graph, pred) {
                    needed = true;
                }
                t
            }
        };
        translated.push(new_pred);
    }

    if !needed {
        return expr;
    }

    let node = graph.node(expr);
    let (op, mode) = (node.op, node.mode);
    graph.new_value_rep(pred_block, op, mode, &translated)
}

/// Run the antic_in fixed point, bounded by [`MAX_ANTIC_ITER`].
pub(super) fn solve(ctx: &mut GvnPreCtx<'_>) {
    let mut iterations = 0;
    ctx.first_iter = true;
    ctx.iteration = 1;

    loop {
        iterations += 1;
        ctx.changes = false;

        // Successors first: reverse topological order converges fastest
        // for a backward problem.
        for i in (0..ctx.order.len()).rev() {
            let block = ctx.order[i];
            compute_block_antic(ctx, block);
        }

        ctx.first_iter = false;
        ctx.iteration += 1;

        if !ctx.changes || iterations >= MAX_ANTIC_ITER {
            break;
        }
    }

    ctx.stats.antic_iterations = iterations;
}

/// One antic_in update for `block`.
fn compute_block_antic(ctx: &mut GvnPreCtx<'_>, block: BlockId) {
    if block == ctx.graph.end_block {
        return;
    }

    let size_before = ctx.infos.get(block).antic_in.len();

    // Seed with the block's own clean expressions.
    if ctx.first_iter {
        let seed = !(ctx.config.no_inf_loops && ctx.inf.contains(&ctx.loops, block));
        if seed {
            let generated = ctx.infos.get(block).exp_gen.entries();
            let info = ctx.infos.get_mut(block);
            for (value, expr) in generated {
                info.antic_in.insert(value, expr);
            }
        }
    }

    let succs = ctx.graph.block(block).succs.clone();

    if succs.len() == 1 && ctx.graph.block(succs[0]).preds.len() > 1 {
        // Sole successor is a join: translate its anticipated values
        // across the merge.
        let succ = succs[0];
        let pos = ctx
            .graph
            .pred_index(succ, block)
            .expect("block is a predecessor of its successor");

        for (value, expr) in ctx.infos.get(succ).antic_in.entries() {
            let trans = match get_translated(ctx.graph, &ctx.infos, block, expr) {
                Some(t) => t,
                None => phi_translate(ctx.graph, &mut ctx.table, &ctx.infos, succ, pos, expr),
            };
            let trans_value = ctx.table.identify_or_remember(ctx.graph, trans);

            // When a phi rewrote an operand, later translations have to
            // start from the rewritten node, not the original.
            let represent = if value != trans_value { trans } else { expr };

            if is_clean_in_block(
                ctx.graph,
                &mut ctx.table,
                expr,
                block,
                &ctx.infos.get(block).antic_in,
            ) {
                // Policy bit: keep early iterations from pumping values
                // around the back edge of an endless loop.
                let skip = ctx.config.no_inf_loops2
                    && ctx.iteration <= 2
                    && ctx.inf.contains(&ctx.loops, succ)
                    && ctx.dom.dominates(succ, block);
                if !skip {
                    ctx.infos.get_mut(block).antic_in.replace(trans_value, represent);
                }
            }
            set_translated(ctx.graph, ctx.infos.get_mut(block), expr, represent);
        }
    } else if succs.len() > 1 {
        // Values anticipated along every outgoing path survive: the
        // intersection over all successors, keyed by value.
        let candidates = ctx.infos.get(succs[0]).antic_in.entries();
        for (value, expr) in candidates {
            let common = succs[1..]
                .iter()
                .all(|&s| ctx.infos.get(s).antic_in.lookup(value).is_some());
            if common
                && is_clean_in_block(
                    ctx.graph,
                    &mut ctx.table,
                    expr,
                    block,
                    &ctx.infos.get(block).antic_in,
                )
            {
                ctx.infos.get_mut(block).antic_in.replace(value, expr);
            }
        }
    }

    if size_before != ctx.infos.get(block).antic_in.len() {
        ctx.changes = true;
    }
}
