//! Endless-loop classification.
//!
//! Nothing downstream of an endless loop ever constrains its values, so
//! the anticipated-values fixed point would keep translating loop-carried
//! expressions and grow without bound. This walk marks the outermost
//! real loop of every block that cannot reach the end block; the antic
//! solver consults the marks when the corresponding policy bits are on.

use crate::ir::arena::BitSet;
use crate::ir::cfg::LoopForest;
use crate::ir::graph::Graph;
use crate::ir::node::BlockId;

/// Which outermost loops never terminate.
#[derive(Debug, Default)]
pub struct InfiniteLoops {
    flagged: Vec<bool>,
    /// Number of endless loops found.
    pub count: usize,
}

impl InfiniteLoops {
    /// Classify endless loops by walking blocks from the end backwards.
    ///
    /// A block is reachable if a successor already is, or if it sits
    /// outside every real loop. Hitting an unreachable block inside a
    /// loop flags that loop's outermost ancestor; predecessors inside
    /// the same outermost loop stay unreachable, predecessors outside it
    /// are declared reachable again.
    pub fn classify(graph: &Graph, loops: &LoopForest, order: &[BlockId]) -> Self {
        let mut inf = InfiniteLoops {
            flagged: vec![false; loops.loops.len()],
            count: 0,
        };

        let mut reachable = BitSet::with_capacity(graph.block_count());
        reachable.insert(graph.end_block.as_usize());

        // Successors before predecessors: reverse topological order.
        for &block in order.iter().rev() {
            if block == graph.start_block {
                continue;
            }

            if loops.loop_of(block).is_none() {
                reachable.insert(block.as_usize());
            }

            if reachable.contains(block.as_usize()) {
                for &pred in &graph.block(block).preds {
                    reachable.insert(pred.as_usize());
                }
            } else {
                let outermost = loops
                    .outermost_loop(block)
                    .expect("unreachable block outside any loop");
                if !inf.flagged[outermost] {
                    inf.count += 1;
                }
                inf.flagged[outermost] = true;

                // Predecessors still inside the endless loop remain
                // unreachable; leaving the loop re-enters reachable
                // territory.
                for &pred in &graph.block(block).preds {
                    if loops.is_in_loop(pred, outermost) {
                        reachable.remove(pred.as_usize());
                    } else {
                        reachable.insert(pred.as_usize());
                    }
                }
            }
        }

        inf
    }

    /// True if `block` lies inside a flagged endless loop.
    pub fn contains(&self, loops: &LoopForest, block: BlockId) -> bool {
        loops
            .outermost_loop(block)
            .map(|idx| self.flagged[idx])
            .unwrap_or(false)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::cfg::{topological_order, DominatorTree};

    #[test]
    fn terminating_loop_not_flagged() {
        let mut g = Graph::new();
        let header = g.add_block();
        let body = g.add_block();
        let exit = g.add_block();
        g.connect(g.start_block, header);
        g.connect(header, body);
        g.connect(header, exit);
        g.connect(body, header);
        g.connect(exit, g.end_block);

        let order = topological_order(&g);
        let dom = DominatorTree::build(&g, &order);
        let loops = LoopForest::compute(&g, &dom, &order);
        let inf = InfiniteLoops::classify(&g, &loops, &order);

        assert_eq!(inf.count, 0);
        assert!(!inf.contains(&loops, header));
    }

    #[test]
    fn endless_self_loop_flagged() {
        let mut g = Graph::new();
        let pre = g.add_block();
        let lp = g.add_block();
        g.connect(g.start_block, pre);
        g.connect(pre, lp);
        g.connect(lp, lp);

        let order = topological_order(&g);
        let dom = DominatorTree::build(&g, &order);
        let loops = LoopForest::compute(&g, &dom, &order);
        let inf = InfiniteLoops::classify(&g, &loops, &order);

        assert_eq!(inf.count, 1);
        assert!(inf.contains(&loops, lp));
        assert!(!inf.contains(&loops, pre));
    }

    #[test]
    fn endless_inner_loop_flags_outermost() {
        let mut g = Graph::new();
        let outer = g.add_block();
        let inner = g.add_block();
        let latch = g.add_block();
        g.connect(g.start_block, outer);
        g.connect(outer, inner);
        g.connect(inner, inner);
        g.connect(inner, latch);
        g.connect(latch, outer);
        // No exit anywhere: the outer loop is endless too.

        let order = topological_order(&g);
        let dom = DominatorTree::build(&g, &order);
        let loops = LoopForest::compute(&g, &dom, &order);
        let inf = InfiniteLoops::classify(&g, &loops, &order);

        assert!(inf.count >= 1);
        assert!(inf.contains(&loops, inner));
        assert!(inf.contains(&loops, outer));
    }
}
