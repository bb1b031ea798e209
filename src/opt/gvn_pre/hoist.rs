//! Hoist-high: push already hoisted expressions further up.
//!
//! After insertion, the per-predecessor copies of an optimized value sit
//! directly in the join's predecessors. When every operand of such a
//! copy is available in the predecessors' common dominator and has no
//! other surviving user on the path, moving the copy up shortens operand
//! live ranges. This is a register-pressure tweak, not a correctness
//! step, and runs only when [`super::GvnPreConfig::hoist_high`] is set.

use smallvec::SmallVec;

use crate::ir::node::{BlockId, NodeId};

use super::antic::get_translated;
use super::insert::update_new_set;
use super::GvnPreCtx;

/// Run the hoist-high post-pass, then re-propagate new_set down the
/// dominator tree so elimination sees the moved leaders.
pub(super) fn run(ctx: &mut GvnPreCtx<'_>) {
    for i in 0..ctx.dom.pre_order().len() {
        let block = ctx.dom.pre_order()[i];
        hoist_block(ctx, block);
    }

    for i in 0..ctx.dom.pre_order().len() {
        let block = ctx.dom.pre_order()[i];
        if block == ctx.graph.start_block {
            continue;
        }
        if let Some(idom) = ctx.dom.idom(block) {
            update_new_set(ctx, block, idom);
        }
    }
}

fn hoist_block(ctx: &mut GvnPreCtx<'_>, block: BlockId) {
    // The insert-phase new_sets are spent; this walk rebuilds them with
    // the hoisted nodes only.
    ctx.infos.get_mut(block).new_set.clear();

    if block == ctx.graph.start_block {
        return;
    }
    let arity = ctx.graph.block(block).preds.len();
    if arity < 2 {
        return;
    }
    let Some(common_dom) = ctx.dom.idom(block) else {
        return;
    };

    for (_, expr) in ctx.infos.get(block).antic_done.entries() {
        if ctx.graph.node(expr).op.is_memop() || ctx.graph.node(expr).op.is_proj() {
            continue;
        }

        let preds = ctx.graph.block(block).preds.clone();
        for &target in &preds {
            // The expression as it exists on this path.
            let Some(trans_expr) = get_translated(ctx.graph, &ctx.infos, target, expr) else {
                continue;
            };
            let trans_value = ctx.table.identify(ctx.graph, trans_expr);
            let Some(avail) = ctx.infos.get(target).avail_out.lookup(trans_value) else {
                continue;
            };
            let avail_value = ctx.table.identify(ctx.graph, avail);

            // Anticipation border: the value must still be wanted in the
            // common dominator.
            if ctx
                .infos
                .get(common_dom)
                .antic_in
                .lookup(avail_value)
                .is_none()
            {
                continue;
            }

            // Never hoist into a deeper loop.
            if ctx.loops.loop_depth(common_dom) > ctx.loops.loop_depth(target) {
                continue;
            }

            if !operands_die(ctx, common_dom, avail, avail_value) {
                continue;
            }

            // Rebuild from the leaders available in the dominator.
            let avail_arity = ctx.graph.node(avail).inputs.len();
            let mut inputs: SmallVec<[NodeId; 4]> = SmallVec::with_capacity(avail_arity);
            for i in 0..avail_arity {
                let operand = ctx.graph.node(avail).inputs.get(i).unwrap();
                let operand_value = ctx.table.identify(ctx.graph, operand);
                let leader = ctx
                    .infos
                    .get(common_dom)
                    .avail_out
                    .lookup(operand_value)
                    .expect("operand availability checked above");
                inputs.push(leader);
            }

            let node = ctx.graph.node(avail);
            let (op, mode) = (node.op, node.mode);
            let hoisted = ctx
                .graph
                .add_node_before_terminator(common_dom, op, mode, &inputs);
            ctx.table.identify_or_remember(ctx.graph, hoisted);
            ctx.infos
                .get_mut(common_dom)
                .new_set
                .insert(avail_value, hoisted);
            ctx.stats.hoist_high += 1;
        }
    }
}

/// True if every operand of `avail` is available in `dom_block` and has
/// no user besides the hoisted value itself anywhere `dom_block`
/// dominates.
fn operands_die(
    ctx: &mut GvnPreCtx<'_>,
    dom_block: BlockId,
    avail: NodeId,
    avail_value: NodeId,
) -> bool {
    let arity = ctx.graph.node(avail).inputs.len();

    for i in 0..arity {
        let operand = ctx.graph.node(avail).inputs.get(i).unwrap();
        let operand_value = ctx.table.identify(ctx.graph, operand);

        if ctx
            .infos
            .get(dom_block)
            .avail_out
            .lookup(operand_value)
            .is_none()
        {
            return false;
        }

        let users: SmallVec<[NodeId; 8]> = ctx.graph.uses(operand).iter().copied().collect();
        for user in users {
            if ctx.graph.node(user).is_dead() {
                continue;
            }
            if !ctx.dom.dominates(dom_block, ctx.graph.node(user).block) {
                continue;
            }
            if ctx.table.identify(ctx.graph, user) != avail_value {
                return false;
            }
        }
    }
    true
}
