//! Insertion of partially redundant values.
//!
//! Walks the dominator tree in pre-order. For every join block and every
//! anticipated value there, decide whether the value is available on
//! some but not all incoming paths; if so, synthesize the computation in
//! the paths where it is missing and merge everything with a new phi.
//! Later occurrences of the value then become fully redundant and fall
//! to the eliminator.

use smallvec::SmallVec;

use crate::ir::mode::Mode;
use crate::ir::node::{BlockId, NodeId};

use super::antic::get_translated;
use super::{GvnPreCtx, MAX_INSERT_ITER};

/// Run the insertion fixed point, bounded by [`MAX_INSERT_ITER`].
pub(super) fn solve(ctx: &mut GvnPreCtx<'_>) {
    let mut iterations = 0;
    ctx.first_iter = true;

    loop {
        iterations += 1;
        ctx.changes = false;

        for i in 0..ctx.dom.pre_order().len() {
            let block = ctx.dom.pre_order()[i];
            insert_block(ctx, block);
        }

        ctx.first_iter = false;

        if !ctx.changes || iterations >= MAX_INSERT_ITER {
            break;
        }
    }

    ctx.stats.insert_iterations = iterations;
}

/// Propagate the dominator's newly hoisted values: they join this
/// block's new_set and displace the leaders in avail_out.
pub(super) fn update_new_set(ctx: &mut GvnPreCtx<'_>, block: BlockId, idom: BlockId) {
    let inherited = ctx.infos.get(idom).new_set.entries();
    let info = ctx.infos.get_mut(block);
    for (value, expr) in inherited {
        info.new_set.insert(value, expr);
        info.avail_out.replace(value, expr);
    }
}

fn insert_block(ctx: &mut GvnPreCtx<'_>, block: BlockId) {
    ctx.infos.get_mut(block).new_set.clear();

    if block == ctx.graph.start_block {
        return;
    }
    let Some(idom) = ctx.dom.idom(block) else {
        return;
    };
    update_new_set(ctx, block, idom);

    let arity = ctx.graph.block(block).preds.len();
    if arity < 2 {
        return;
    }

    for (value, expr) in ctx.infos.get(block).antic_in.entries() {
        if ctx.infos.get(block).antic_done.lookup(value).is_some() {
            continue;
        }
        if ctx.graph.node(expr).is_phi() {
            continue;
        }

        // Computed in the dominator: fully redundant, nothing to insert.
        // The eliminator exchanges the local occurrence.
        if ctx.infos.get(idom).avail_out.lookup(value).is_some() {
            ctx.stats.fully_redundant += 1;
            ctx.infos.get_mut(block).antic_done.insert(value, expr);
            continue;
        }

        // Hoisting an expression whose operands are themselves missing
        // on some path would drag a whole chain upwards.
        if is_hoisting_greedy(ctx, block, expr) {
            continue;
        }

        let Some(mode) = is_partially_redundant(ctx, block, expr) else {
            continue;
        };

        if !ctx.graph.node(expr).op.is_proj() {
            if ctx.first_iter {
                ctx.stats.first_iter_found += 1;
            }
            ctx.stats.partially_redundant += 1;
        }

        let preds = ctx.graph.block(block).preds.clone();
        let mut phi_in: SmallVec<[NodeId; 4]> = SmallVec::with_capacity(arity);
        for &pred_block in &preds {
            if ctx.infos.get(pred_block).found {
                let avail = ctx
                    .infos
                    .get(pred_block)
                    .avail
                    .expect("availability recorded for this predecessor");
                phi_in.push(avail);
            } else {
                phi_in.push(synthesize_copy(ctx, block, pred_block, expr));
            }
        }

        // Tuple results get no phi; their users merge the projections.
        if ctx.graph.node(expr).mode != Mode::Tuple {
            let phi = ctx.graph.new_phi(block, &phi_in, mode);
            let info = ctx.infos.get_mut(block);
            info.avail_out.replace(value, phi);
            info.new_set.insert(value, phi);
        }

        ctx.infos.get_mut(block).antic_done.insert(value, expr);
        ctx.changes = true;
    }
}

/// Largest magnitude of a constant the pass will materialize on a path
/// that never computed it.
const NEW_CONST_LIMIT: i64 = 127;

/// Decide partial redundancy of `expr` at the join `block`.
///
/// Per predecessor, look the translated value up in that predecessor's
/// avail_out and record the finding in the block's scratch fields.
/// Translated constants count as available only within a small immediate
/// range; merging a large constant with itself through a phi would only
/// grow the program.
///
/// Returns the mode to build the phi with iff the value is available on
/// at least one predecessor but not identically on all of them.
fn is_partially_redundant(ctx: &mut GvnPreCtx<'_>, block: BlockId, expr: NodeId) -> Option<Mode> {
    let preds = ctx.graph.block(block).preds.clone();

    let mut first_avail: Option<NodeId> = None;
    let mut fully_redundant = true;
    let mut partially_redundant = false;
    let mut mode = None;

    for &pred_block in &preds {
        let trans_expr = get_translated(ctx.graph, &ctx.infos, pred_block, expr).unwrap_or(expr);
        let trans_value = ctx.table.identify(ctx.graph, trans_expr);

        let avail_expr = if ctx.graph.node(trans_expr).is_const() {
            match ctx.graph.node(trans_expr).const_value() {
                Some(c) if (-NEW_CONST_LIMIT..=NEW_CONST_LIMIT).contains(&c) => Some(trans_expr),
                _ => None,
            }
        } else {
            ctx.infos.get(pred_block).avail_out.lookup(trans_value)
        };

        match avail_expr {
            None => {
                let info = ctx.infos.get_mut(pred_block);
                info.avail = Some(trans_expr);
                info.found = false;
                fully_redundant = false;
            }
            Some(avail) => {
                let info = ctx.infos.get_mut(pred_block);
                info.avail = Some(avail);
                info.found = true;
                mode = Some(ctx.graph.node(avail).mode);
                partially_redundant = true;

                match first_avail {
                    None => first_avail = Some(avail),
                    Some(first) if first != avail => fully_redundant = false,
                    _ => {}
                }
            }
        }
    }

    // Fully redundant joins are left to the idom path and elimination;
    // fully absent values would only lengthen every path.
    if !partially_redundant || fully_redundant {
        return None;
    }
    mode
}

/// Bound for constants the greediness check lets a hoist create.
const GREEDY_CONST_LIMIT: i64 = 128;

/// True if hoisting `expr` above `block` would require hoisting
/// non-redundant operands along with it: some operand, on some
/// predecessor path, is neither a small constant nor available there.
fn is_hoisting_greedy(ctx: &mut GvnPreCtx<'_>, block: BlockId, expr: NodeId) -> bool {
    let preds = ctx.graph.block(block).preds.clone();
    let arity = ctx.graph.node(expr).inputs.len();

    for &pred_block in &preds {
        for i in 0..arity {
            let pred = ctx.graph.node(expr).inputs.get(i).unwrap();

            // A phi of this block resolves to a plain input on each path.
            if ctx.graph.node(pred).is_phi() && ctx.graph.node(pred).block == block {
                continue;
            }

            let value = ctx.table.identify(ctx.graph, pred);
            let leader = ctx.infos.get(block).antic_in.lookup(value).unwrap_or(pred);
            let trans = get_translated(ctx.graph, &ctx.infos, pred_block, leader).unwrap_or(pred);
            let trans_value = ctx.table.identify(ctx.graph, trans);

            if ctx.graph.node(trans_value).is_const() {
                // Pre-existing constants cost nothing; new ones only
                // within immediate range.
                if (trans_value.index() as usize) < ctx.last_idx {
                    continue;
                }
                match ctx.graph.node(trans_value).const_value() {
                    Some(c) if c > -GREEDY_CONST_LIMIT && c < GREEDY_CONST_LIMIT => continue,
                    _ => return true,
                }
            }

            if ctx.infos.get(pred_block).avail_out.lookup(trans_value).is_none() {
                return true;
            }
        }
    }
    false
}

/// Build the missing computation in `pred_block`.
///
/// Anticipated sets speak in anti leaders; the new node must use the
/// *leaders* actually available in the predecessor, so every operand is
/// mapped value -> anti leader -> translation -> available leader.
fn synthesize_copy(
    ctx: &mut GvnPreCtx<'_>,
    block: BlockId,
    pred_block: BlockId,
    expr: NodeId,
) -> NodeId {
    let arity = ctx.graph.node(expr).inputs.len();
    let mut inputs: SmallVec<[NodeId; 4]> = SmallVec::with_capacity(arity);

    for i in 0..arity {
        let pred = ctx.graph.node(expr).inputs.get(i).unwrap();
        let value = ctx.table.identify(ctx.graph, pred);
        let leader = ctx.infos.get(block).antic_in.lookup(value).unwrap_or(pred);
        let trans = get_translated(ctx.graph, &ctx.infos, pred_block, leader).unwrap_or(pred);

        // A phi of the join block becomes its input for this path.
        if ctx.graph.node(pred).is_phi() && ctx.graph.node(pred).block == block {
            inputs.push(trans);
            continue;
        }

        let trans_value = ctx.table.identify(ctx.graph, trans);

        // Constants are available everywhere without being tracked.
        if ctx.graph.node(trans_value).is_const() {
            inputs.push(trans);
            continue;
        }

        let avail = ctx
            .infos
            .get(pred_block)
            .avail_out
            .lookup(trans_value)
            .expect("operand available in predecessor after greediness check");
        inputs.push(avail);
    }

    let node = ctx.graph.node(expr);
    let (op, mode) = (node.op, node.mode);
    let new_node = ctx
        .graph
        .add_node_before_terminator(pred_block, op, mode, &inputs);

    // The copy makes its value available at the end of the predecessor,
    // both under its own value and under the translated expression's.
    let new_value = ctx.table.identify_or_remember(ctx.graph, new_node);
    ctx.infos
        .get_mut(pred_block)
        .avail_out
        .insert(new_value, new_node);

    if let Some(trans_expr) = get_translated(ctx.graph, &ctx.infos, pred_block, expr) {
        let trans_value = ctx.table.identify(ctx.graph, trans_expr);
        ctx.infos
            .get_mut(pred_block)
            .avail_out
            .insert(trans_value, new_node);
    }

    new_node
}

// =============================================================================
// Tests
// =============================================================================
