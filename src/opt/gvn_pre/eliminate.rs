//! Elimination of fully redundant nodes.
//!
//! The final walk finds every node whose value has a different leader in
//! its block's avail_out and queues an exchange. Exchanges are deferred:
//! performing them during the walk would change the structural identity
//! of nodes the walk still has to look at. The drain then rewires uses,
//! collapsing the degenerate phis insertion tends to create on the way.

use rustc_hash::FxHashMap;

use crate::ir::node::NodeId;

use super::GvnPreCtx;

/// Why a node was replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ElimReason {
    /// The leader predates this pass: the value was available anyway.
    Fully,
    /// The leader was created by this pass's insertions.
    Partially,
}

/// A deferred replacement.
#[derive(Debug, Clone, Copy)]
pub(super) struct ElimPair {
    pub old: NodeId,
    pub new: NodeId,
    pub reason: ElimReason,
}

/// Collect the elimination pairs. The graph is read-only here.
pub(super) fn collect(ctx: &mut GvnPreCtx<'_>) {
    for i in 0..ctx.order.len() {
        let block = ctx.order[i];
        let schedule = ctx.graph.block(block).nodes.clone();
        for node in schedule {
            let value = ctx.table.identify(ctx.graph, node);
            let Some(leader) = ctx.infos.get(block).avail_out.lookup(value) else {
                continue;
            };
            if leader == node {
                continue;
            }
            let reason = if (leader.index() as usize) < ctx.last_idx {
                ElimReason::Fully
            } else {
                ElimReason::Partially
            };
            ctx.pairs.push(ElimPair {
                old: node,
                new: leader,
                reason,
            });
        }
    }
}

/// Drain the queued pairs, performing the exchanges.
pub(super) fn apply(ctx: &mut GvnPreCtx<'_>) {
    // Replacement targets may themselves get replaced; later pairs must
    // follow the chain to the surviving node.
    let mut resolved: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    let pairs = std::mem::take(&mut ctx.pairs);

    for pair in pairs {
        let mut new = resolve(&resolved, pair.new);
        if new == pair.old {
            continue;
        }

        // Insertion likes to produce Phi(self, .., x, .., self); such a
        // phi is just x.
        if ctx.graph.node(new).is_phi() {
            if let Some(single) = single_distinct_input(ctx, new, pair.old) {
                if single != new {
                    ctx.graph.exchange(new, single);
                    resolved.insert(new, single);
                    new = single;
                }
            }
        }

        if new == pair.old {
            continue;
        }
        ctx.graph.exchange(pair.old, new);
        resolved.insert(pair.old, new);
        ctx.stats.replaced += 1;
        match pair.reason {
            ElimReason::Fully => ctx.stats.replaced_fully += 1,
            ElimReason::Partially => ctx.stats.replaced_partially += 1,
        }
    }
}

fn resolve(map: &FxHashMap<NodeId, NodeId>, mut node: NodeId) -> NodeId {
    while let Some(&next) = map.get(&node) {
        node = next;
    }
    node
}

/// If every input of `phi` is either `old` or one single other node,
/// return that node.
fn single_distinct_input(ctx: &GvnPreCtx<'_>, phi: NodeId, old: NodeId) -> Option<NodeId> {
    let mut result = None;
    let arity = ctx.graph.node(phi).inputs.len();
    for i in 0..arity {
        let input = ctx.graph.node(phi).inputs.get(i).unwrap();
        if input == old {
            continue;
        }
        match result {
            None => result = Some(input),
            Some(seen) if seen == input => {}
            Some(_) => return None,
        }
    }
    result
}
