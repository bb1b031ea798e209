//! Expression generation and availability leaves.
//!
//! The blockwise topological walk gives every scheduled node a value,
//! collects the per-block `avail_out` leaves, and builds `exp_gen`: the
//! clean expressions a block generates. Cleanliness is what makes phi
//! translation over an expression well defined, so only clean
//! expressions may enter the anticipated sets later.

use crate::ir::cfg::DominatorTree;
use crate::ir::graph::Graph;
use crate::ir::node::{BlockId, NodeId};

use super::block_info::BlockInfoStore;
use super::value_set::ValueSet;
use super::value_table::ValueTable;

/// A candidate for redundancy elimination: movable, value-producing.
///
/// Phis qualify (they are translated rather than moved); projections do
/// not; pinned operations do not; non-data modes only through `Div` and
/// `Mod` tuples.
pub(super) fn is_nice_value(graph: &Graph, node: NodeId) -> bool {
    let n = graph.node(node);

    if n.is_phi() {
        return true;
    }
    if n.op.is_proj() {
        return false;
    }
    if n.is_pinned() {
        return false;
    }
    if !n.mode.is_data() && !n.op.is_div() && !n.op.is_mod() {
        return false;
    }
    true
}

/// True if `node` is clean in `block` relative to `set`: every non-phi
/// operand defined in the same block is itself nice and already known to
/// `set` as a value.
pub(super) fn is_clean_in_block(
    graph: &Graph,
    table: &mut ValueTable,
    node: NodeId,
    block: BlockId,
    set: &ValueSet,
) -> bool {
    if graph.node(node).is_phi() {
        return true;
    }
    if !is_nice_value(graph, node) {
        return false;
    }

    let arity = graph.node(node).inputs.len();
    for i in 0..arity {
        let pred = graph.node(node).inputs.get(i).unwrap();

        if graph.node(pred).is_phi() {
            continue;
        }
        // Operands defined elsewhere are handled by their own block.
        if graph.node(pred).block != block {
            continue;
        }
        if !is_nice_value(graph, pred) {
            return false;
        }
        let value = table.identify(graph, pred);
        if set.lookup(value).is_none() {
            return false;
        }
    }
    true
}

/// Blockwise topological walk: value-number every node, then record the
/// avail_out and exp_gen leaves of each block. Constants are globally
/// available and stay implicit.
pub(super) fn build(
    graph: &mut Graph,
    table: &mut ValueTable,
    infos: &mut BlockInfoStore,
    order: &[BlockId],
) {
    for &block in order {
        let schedule = graph.block(block).nodes.clone();
        for node in schedule {
            let value = table.remember(graph, node);

            if !is_nice_value(graph, node) {
                continue;
            }
            if graph.node(node).is_const() {
                continue;
            }

            infos.get_mut(block).avail_out.insert(value, node);

            let clean = is_clean_in_block(graph, table, node, block, &infos.get(block).exp_gen);
            if clean {
                infos.get_mut(block).exp_gen.insert(value, node);
            }
        }
    }
}

/// Complete avail_out by dominator inheritance: the dominator's leaders
/// replace local representatives, so every block sees the leader from
/// the dominating context.
pub(super) fn propagate_avail(graph: &Graph, dom: &DominatorTree, infos: &mut BlockInfoStore) {
    for &block in dom.pre_order() {
        if block == graph.end_block || block == graph.start_block {
            continue;
        }
        let Some(idom) = dom.idom(block) else {
            continue;
        };
        let inherited = infos.get(idom).avail_out.entries();
        let info = infos.get_mut(block);
        for (value, expr) in inherited {
            info.avail_out.replace(value, expr);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::cfg::topological_order;
    use crate::ir::mode::Mode;
    use crate::ir::operators::Operator;

    #[test]
    fn loads_are_not_nice() {
        let mut g = Graph::new();
        let addr = g.param(0);
        let mem = g.param(1);
        let load = g.add_node(g.start_block, Operator::Load, Mode::Int64, &[mem, addr]);

        assert!(is_nice_value(&g, addr));
        assert!(!is_nice_value(&g, load));
    }

    #[test]
    fn pinned_div_is_not_nice_until_unpinned() {
        let mut g = Graph::new();
        let x = g.param(0);
        let y = g.param(1);
        let div = g.int_div(g.start_block, x, y);

        assert!(!is_nice_value(&g, div));
        g.set_pinned(div, false);
        assert!(is_nice_value(&g, div));
    }

    #[test]
    fn exp_gen_requires_clean_operands() {
        let mut g = Graph::new();
        let b = g.add_block();
        g.connect(g.start_block, b);
        g.connect(b, g.end_block);

        let x = g.param(0);
        let mem = g.param(1);
        // In b: a load (not nice) feeding an add. The add's local
        // operand is dirty, so the add is generated but not clean.
        let load = g.add_node(b, Operator::Load, Mode::Int64, &[mem, x]);
        let dirty = g.int_add(b, load, x);
        let clean = g.int_add(b, x, x);

        let order = topological_order(&g);
        let mut table = ValueTable::new();
        let mut infos = BlockInfoStore::new(g.block_count());
        build(&mut g, &mut table, &mut infos, &order);

        let dirty_value = table.identify(&g, dirty);
        let clean_value = table.identify(&g, clean);
        assert!(infos.get(b).exp_gen.lookup(dirty_value).is_none());
        assert!(infos.get(b).exp_gen.lookup(clean_value).is_some());
        // Both still reach avail_out: they are computed in this block.
        assert!(infos.get(b).avail_out.lookup(dirty_value).is_some());
    }

    #[test]
    fn avail_out_inherits_dominator_leaders() {
        let mut g = Graph::new();
        let b = g.add_block();
        g.connect(g.start_block, b);
        g.connect(b, g.end_block);

        let x = g.param(0);
        let y = g.param(1);
        let t1 = g.int_add(g.start_block, x, y);
        let t2 = g.int_add(b, x, y);

        let order = topological_order(&g);
        let mut table = ValueTable::new();
        let mut infos = BlockInfoStore::new(g.block_count());
        build(&mut g, &mut table, &mut infos, &order);

        let dom = crate::ir::cfg::DominatorTree::build(&g, &order);
        propagate_avail(&g, &dom, &mut infos);

        // b's local computation is displaced by the dominating leader.
        let value = table.identify(&g, t2);
        assert_eq!(infos.get(b).avail_out.lookup(value), Some(t1));
        assert_eq!(table.identify(&g, t1), value);
    }
}
