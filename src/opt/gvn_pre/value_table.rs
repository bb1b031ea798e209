//! Value numbering.
//!
//! Each node is assigned a *value*: the canonical node of its
//! equivalence class. Two expressions share a value when they have the
//! same operator (attributes included), mode and arity, and their inputs
//! share values pairwise. The table normalizes expressions before
//! hashing: every non-phi input is replaced by the leader of its value,
//! so textually different chains that compute the same thing collapse to
//! one structural key.
//!
//! Exceptions, baked into [`ValueTable::identify_remember`]:
//! - a phi is always its own value. Phi inputs can transitively depend
//!   on the phi itself; cutting the class at phis keeps value
//!   computation well founded and lets phi translation terminate.
//! - memory operations are always their own value; their order matters.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::ir::graph::Graph;
use crate::ir::mode::Mode;
use crate::ir::node::NodeId;
use crate::ir::operators::Operator;

use super::value_set::ValueId;

/// Structural identity of a normalized expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IdentKey {
    op: Operator,
    mode: Mode,
    inputs: SmallVec<[NodeId; 4]>,
}

/// Node-to-value map plus the structural identity set.
#[derive(Debug, Default)]
pub struct ValueTable {
    /// Remembered mapping node -> value.
    values: FxHashMap<NodeId, ValueId>,
    /// Canonical node per structural key.
    identities: FxHashMap<IdentKey, NodeId>,
}

impl ValueTable {
    pub fn new() -> Self {
        ValueTable::default()
    }

    /// The value of `node`. Uses the remembered mapping when present and
    /// otherwise canonicalizes the node as-is, without recording a
    /// mapping. Use once the value map has been built.
    pub fn identify(&mut self, graph: &Graph, node: NodeId) -> ValueId {
        if let Some(&value) = self.values.get(&node) {
            return value;
        }
        self.identify_remember(graph, node)
    }

    /// Look up `node` in the identity set, inserting it as the canonical
    /// representative of its structural key if the key is new. Phis and
    /// memory operations never unify and are returned unchanged.
    pub fn identify_remember(&mut self, graph: &Graph, node: NodeId) -> ValueId {
        let n = graph.node(node);
        if n.op.is_phi() || n.op.is_memop() {
            return node;
        }
        let key = IdentKey {
            op: n.op,
            mode: n.mode,
            inputs: n.inputs.iter().collect(),
        };
        *self.identities.entry(key).or_insert(node)
    }

    /// Compute and record the value of `node`, building a normalized
    /// twin whose non-phi inputs are the leaders of their values. The
    /// twin shares structure with every other expression computing the
    /// same value, so it collapses in the identity set.
    pub fn remember(&mut self, graph: &mut Graph, node: NodeId) -> ValueId {
        let arity = graph.node(node).inputs.len();
        let mut normalized: SmallVec<[NodeId; 4]> = SmallVec::with_capacity(arity);
        let mut changed = false;

        for i in 0..arity {
            let pred = graph.node(node).inputs.get(i).unwrap();
            if graph.node(pred).is_phi() {
                // Every phi represents its own value; translation
                // handles them later.
                normalized.push(pred);
                continue;
            }
            let pred_value = self.identify(graph, pred);
            if pred_value != pred {
                changed = true;
            }
            normalized.push(pred_value);
        }

        let value = if changed {
            let n = graph.node(node);
            let (op, mode, block) = (n.op, n.mode, n.block);
            let twin = graph.new_value_rep(block, op, mode, &normalized);
            self.identify_remember(graph, twin)
        } else {
            self.identify_remember(graph, node)
        };

        self.values.insert(node, value);
        value
    }

    /// Lookup, else remember.
    pub fn identify_or_remember(&mut self, graph: &mut Graph, node: NodeId) -> ValueId {
        if let Some(&value) = self.values.get(&node) {
            return value;
        }
        self.remember(graph, node)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_expressions_share_a_value() {
        let mut g = Graph::new();
        let x = g.param(0);
        let y = g.param(1);
        let t1 = g.int_add(g.start_block, x, y);
        let t2 = g.int_add(g.start_block, x, y);

        let mut table = ValueTable::new();
        for n in [x, y, t1, t2] {
            table.remember(&mut g, n);
        }

        assert_eq!(table.identify(&g, t1), table.identify(&g, t2));
    }

    #[test]
    fn values_flow_through_chains() {
        let mut g = Graph::new();
        let x = g.param(0);
        let y = g.param(1);
        let z = g.param(2);
        let t1 = g.int_add(g.start_block, x, y);
        let t2 = g.int_add(g.start_block, x, y);
        let u1 = g.int_add(g.start_block, t1, z);
        let u2 = g.int_add(g.start_block, t2, z);

        let mut table = ValueTable::new();
        for n in [x, y, z, t1, t2, u1, u2] {
            table.remember(&mut g, n);
        }

        // u2's input t2 normalizes to t1's value, so u1 and u2 collapse.
        assert_eq!(table.identify(&g, u1), table.identify(&g, u2));
    }

    #[test]
    fn distinct_attributes_stay_distinct() {
        let mut g = Graph::new();
        let c1 = g.const_int(1);
        let c2 = g.const_int(2);
        let c1b = g.const_int(1);

        let mut table = ValueTable::new();
        for n in [c1, c2, c1b] {
            table.remember(&mut g, n);
        }

        assert_eq!(table.identify(&g, c1), table.identify(&g, c1b));
        assert_ne!(table.identify(&g, c1), table.identify(&g, c2));
    }

    #[test]
    fn phis_are_their_own_value() {
        let mut g = Graph::new();
        let left = g.add_block();
        let right = g.add_block();
        let join = g.add_block();
        g.connect(g.start_block, left);
        g.connect(g.start_block, right);
        g.connect(left, join);
        g.connect(right, join);

        let a = g.const_int(1);
        let b = g.const_int(2);
        let p1 = g.new_phi(join, &[a, b], crate::ir::mode::Mode::Int64);
        let p2 = g.new_phi(join, &[a, b], crate::ir::mode::Mode::Int64);

        let mut table = ValueTable::new();
        for n in [a, b, p1, p2] {
            table.remember(&mut g, n);
        }

        // Structurally identical phis still get distinct values.
        assert_ne!(table.identify(&g, p1), table.identify(&g, p2));
    }

    #[test]
    fn memops_never_unify() {
        let mut g = Graph::new();
        let addr = g.param(0);
        let mem = g.param(1);
        let l1 = g.add_node(g.start_block, Operator::Load, Mode::Int64, &[mem, addr]);
        let l2 = g.add_node(g.start_block, Operator::Load, Mode::Int64, &[mem, addr]);

        let mut table = ValueTable::new();
        for n in [addr, mem, l1, l2] {
            table.remember(&mut g, n);
        }

        assert_ne!(table.identify(&g, l1), table.identify(&g, l2));
    }
}
