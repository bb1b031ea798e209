//! Control-flow analyses: block orders, dominators, loops.
//!
//! All traversals are materialized as order arrays once and then
//! iterated, so passes never recurse through callbacks.

use super::arena::{BitSet, SecondaryMap};
use super::graph::{BlockData, Graph};
use super::node::BlockId;

// =============================================================================
// Block Orders
// =============================================================================

/// Blocks reachable from the start block in reverse postorder.
///
/// Predecessors come before successors except across back edges, which
/// makes this the blockwise topological order used by the dataflow walks.
pub fn topological_order(graph: &Graph) -> Vec<BlockId> {
    let n = graph.block_count();
    let mut visited = BitSet::with_capacity(n);
    let mut postorder = Vec::with_capacity(n);

    // Iterative DFS; the stack entry tracks the next successor to visit.
    let mut stack: Vec<(BlockId, usize)> = vec![(graph.start_block, 0)];
    visited.insert(graph.start_block.as_usize());

    while let Some(&mut (block, ref mut next)) = stack.last_mut() {
        let succs = &graph.block(block).succs;
        if *next < succs.len() {
            let succ = succs[*next];
            *next += 1;
            if !visited.contains(succ.as_usize()) {
                visited.insert(succ.as_usize());
                stack.push((succ, 0));
            }
        } else {
            postorder.push(block);
            stack.pop();
        }
    }

    postorder.reverse();
    postorder
}

/// True if some edge runs from a multi-successor block into a
/// multi-predecessor block. Such edges must be split before GVN-PRE.
pub fn has_critical_edge(graph: &Graph) -> bool {
    graph.block_ids().any(|block| {
        graph.block(block).succs.len() > 1
            && graph
                .block(block)
                .succs
                .iter()
                .any(|&succ| graph.block(succ).preds.len() > 1)
    })
}

// =============================================================================
// Dominator Tree
// =============================================================================

/// Immediate dominators, dominator-tree children and a precomputed
/// pre-order walk array.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    idom: SecondaryMap<BlockData, BlockId>,
    children: SecondaryMap<BlockData, Vec<BlockId>>,
    depth: SecondaryMap<BlockData, u32>,
    pre_order: Vec<BlockId>,
}

impl DominatorTree {
    /// Build the tree with the Cooper-Harvey-Kennedy iteration over the
    /// reverse postorder.
    pub fn build(graph: &Graph, order: &[BlockId]) -> Self {
        let n = graph.block_count();
        let mut postorder_num: SecondaryMap<BlockData, u32> = SecondaryMap::with_capacity(n);
        for (i, &block) in order.iter().enumerate() {
            postorder_num.set(block, (order.len() - i) as u32);
        }

        let mut idom: SecondaryMap<BlockData, BlockId> = SecondaryMap::with_capacity(n);
        for block in graph.block_ids() {
            idom.set(block, BlockId::INVALID);
        }
        idom.set(graph.start_block, graph.start_block);

        let intersect = |idom: &SecondaryMap<BlockData, BlockId>,
                         mut a: BlockId,
                         mut b: BlockId|
         -> BlockId {
            while a != b {
                while postorder_num[a] < postorder_num[b] {
                    a = idom[a];
                }
                while postorder_num[b] < postorder_num[a] {
                    b = idom[b];
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &block in order {
                if block == graph.start_block {
                    continue;
                }
                let mut new_idom = BlockId::INVALID;
                for &pred in &graph.block(block).preds {
                    if !idom[pred].is_valid() {
                        continue;
                    }
                    new_idom = if new_idom.is_valid() {
                        intersect(&idom, pred, new_idom)
                    } else {
                        pred
                    };
                }
                if new_idom.is_valid() && idom[block] != new_idom {
                    idom.set(block, new_idom);
                    changed = true;
                }
            }
        }

        let mut children: SecondaryMap<BlockData, Vec<BlockId>> = SecondaryMap::with_capacity(n);
        for &block in order {
            if block != graph.start_block && idom[block].is_valid() {
                children[idom[block]].push(block);
            }
        }

        // Pre-order array and depths via an explicit stack.
        let mut pre_order = Vec::with_capacity(order.len());
        let mut depth: SecondaryMap<BlockData, u32> = SecondaryMap::with_capacity(n);
        let mut stack = vec![graph.start_block];
        while let Some(block) = stack.pop() {
            pre_order.push(block);
            for &child in children[block].iter().rev() {
                depth.set(child, depth[block] + 1);
                stack.push(child);
            }
        }

        DominatorTree {
            idom,
            children,
            depth,
            pre_order,
        }
    }

    /// Immediate dominator; `None` for the start block and for blocks
    /// unreachable from it.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        match self.idom.get(block).copied() {
            Some(id) if id.is_valid() && id != block => Some(id),
            _ => None,
        }
    }

    /// Dominator-tree pre-order: every block appears after its
    /// immediate dominator.
    pub fn pre_order(&self) -> &[BlockId] {
        &self.pre_order
    }

    pub fn children(&self, block: BlockId) -> &[BlockId] {
        self.children.get(block).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn depth(&self, block: BlockId) -> u32 {
        self.depth.get(block).copied().unwrap_or(0)
    }

    /// True if `a` dominates `b` (reflexive).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom(current) {
                Some(up) => current = up,
                None => return false,
            }
        }
    }
}

// =============================================================================
// Loop Forest
// =============================================================================

/// A natural loop.
#[derive(Debug, Clone)]
pub struct LoopData {
    /// Header block; dominates every block in the body.
    pub header: BlockId,
    /// Blocks in the loop body, header included.
    pub body: Vec<BlockId>,
    /// Enclosing loop, if nested.
    pub parent: Option<usize>,
    /// Nesting depth; 1 for outermost loops.
    pub depth: u32,
}

/// All natural loops of a graph, with nesting.
#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    pub loops: Vec<LoopData>,
    /// Innermost loop of each block, if any.
    block_loop: Vec<Option<usize>>,
}

impl LoopForest {
    /// Detect loops from back edges (edges whose target dominates their
    /// source) and compute nesting.
    pub fn compute(graph: &Graph, dom: &DominatorTree, order: &[BlockId]) -> Self {
        let mut forest = LoopForest {
            loops: Vec::new(),
            block_loop: vec![None; graph.block_count()],
        };

        let mut header_loop: Vec<Option<usize>> = vec![None; graph.block_count()];

        for &block in order {
            for &succ in &graph.block(block).succs {
                if dom.dominates(succ, block) {
                    forest.add_back_edge(graph, succ, block, &mut header_loop);
                }
            }
        }

        forest.compute_nesting();
        forest
    }

    fn add_back_edge(
        &mut self,
        graph: &Graph,
        header: BlockId,
        tail: BlockId,
        header_loop: &mut [Option<usize>],
    ) {
        let idx = match header_loop[header.as_usize()] {
            Some(idx) => idx,
            None => {
                let idx = self.loops.len();
                self.loops.push(LoopData {
                    header,
                    body: vec![header],
                    parent: None,
                    depth: 1,
                });
                header_loop[header.as_usize()] = Some(idx);
                idx
            }
        };

        // Everything that reaches the back edge without passing the
        // header belongs to the loop.
        let mut member = BitSet::with_capacity(graph.block_count());
        for &b in &self.loops[idx].body {
            member.insert(b.as_usize());
        }
        let mut worklist = vec![tail];
        while let Some(block) = worklist.pop() {
            if member.contains(block.as_usize()) {
                continue;
            }
            member.insert(block.as_usize());
            self.loops[idx].body.push(block);
            for &pred in &graph.block(block).preds {
                worklist.push(pred);
            }
        }
    }

    fn compute_nesting(&mut self) {
        let n = self.loops.len();
        for i in 0..n {
            let header = self.loops[i].header;
            let mut best: Option<usize> = None;
            for j in 0..n {
                if i != j
                    && self.loops[j].header != header
                    && self.loops[j].body.contains(&header)
                {
                    match best {
                        Some(b) if self.loops[b].body.len() <= self.loops[j].body.len() => {}
                        _ => best = Some(j),
                    }
                }
            }
            self.loops[i].parent = best;
        }

        for i in 0..n {
            let mut depth = 1;
            let mut current = self.loops[i].parent;
            while let Some(p) = current {
                depth += 1;
                current = self.loops[p].parent;
            }
            self.loops[i].depth = depth;
        }

        // Innermost loop per block: deeper loops win.
        for (i, lp) in self.loops.iter().enumerate() {
            for &block in &lp.body {
                let slot = &mut self.block_loop[block.as_usize()];
                match *slot {
                    Some(other) if self.loops[other].depth >= lp.depth => {}
                    _ => *slot = Some(i),
                }
            }
        }
    }

    /// Innermost loop containing `block`.
    pub fn loop_of(&self, block: BlockId) -> Option<usize> {
        self.block_loop.get(block.as_usize()).copied().flatten()
    }

    /// Nesting depth of `block`; 0 outside any loop.
    pub fn loop_depth(&self, block: BlockId) -> u32 {
        self.loop_of(block).map(|i| self.loops[i].depth).unwrap_or(0)
    }

    /// The outermost real loop containing `block`.
    pub fn outermost_loop(&self, block: BlockId) -> Option<usize> {
        let mut current = self.loop_of(block)?;
        while let Some(parent) = self.loops[current].parent {
            current = parent;
        }
        Some(current)
    }

    /// True if `block` is inside loop `idx` (directly or nested).
    pub fn is_in_loop(&self, block: BlockId, idx: usize) -> bool {
        let mut current = self.loop_of(block);
        while let Some(i) = current {
            if i == idx {
                return true;
            }
            current = self.loops[i].parent;
        }
        false
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// start -> a -> join, start -> b -> join (a diamond).
    fn diamond() -> (Graph, BlockId, BlockId, BlockId) {
        let mut g = Graph::new();
        let a = g.add_block();
        let b = g.add_block();
        let join = g.add_block();
        g.connect(g.start_block, a);
        g.connect(g.start_block, b);
        g.connect(a, join);
        g.connect(b, join);
        g.connect(join, g.end_block);
        (g, a, b, join)
    }

    #[test]
    fn rpo_starts_at_entry() {
        let (g, ..) = diamond();
        let order = topological_order(&g);
        assert_eq!(order[0], g.start_block);
        assert_eq!(*order.last().unwrap(), g.end_block);
        assert_eq!(order.len(), 5);
    }

    #[test]
    fn diamond_idoms() {
        let (g, a, b, join) = diamond();
        let order = topological_order(&g);
        let dom = DominatorTree::build(&g, &order);

        assert_eq!(dom.idom(g.start_block), None);
        assert_eq!(dom.idom(a), Some(g.start_block));
        assert_eq!(dom.idom(b), Some(g.start_block));
        assert_eq!(dom.idom(join), Some(g.start_block));
        assert!(dom.dominates(g.start_block, join));
        assert!(!dom.dominates(a, join));
    }

    #[test]
    fn pre_order_parents_first() {
        let (g, ..) = diamond();
        let order = topological_order(&g);
        let dom = DominatorTree::build(&g, &order);

        let position: std::collections::HashMap<_, _> = dom
            .pre_order()
            .iter()
            .enumerate()
            .map(|(i, &b)| (b, i))
            .collect();
        for &block in dom.pre_order() {
            if let Some(idom) = dom.idom(block) {
                assert!(position[&idom] < position[&block]);
            }
        }
    }

    #[test]
    fn critical_edge_detection() {
        let (g, ..) = diamond();
        assert!(!has_critical_edge(&g));

        // start has two successors; adding an edge straight into the
        // join (two predecessors) makes it critical.
        let mut g2 = Graph::new();
        let a = g2.add_block();
        let join = g2.add_block();
        g2.connect(g2.start_block, a);
        g2.connect(g2.start_block, join);
        g2.connect(a, join);
        assert!(has_critical_edge(&g2));
    }

    #[test]
    fn simple_loop_detected() {
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

        assert_eq!(loops.loops.len(), 1);
        assert_eq!(loops.loops[0].header, header);
        assert_eq!(loops.loop_depth(header), 1);
        assert_eq!(loops.loop_depth(body), 1);
        assert_eq!(loops.loop_depth(exit), 0);
    }

    #[test]
    fn nested_loops() {
        let mut g = Graph::new();
        let outer = g.add_block();
        let inner = g.add_block();
        let latch = g.add_block();
        let exit = g.add_block();
        g.connect(g.start_block, outer);
        g.connect(outer, inner);
        g.connect(inner, inner); // self loop nested in outer
        g.connect(inner, latch);
        g.connect(latch, outer);
        g.connect(outer, exit);
        g.connect(exit, g.end_block);

        let order = topological_order(&g);
        let dom = DominatorTree::build(&g, &order);
        let loops = LoopForest::compute(&g, &dom, &order);

        assert_eq!(loops.loops.len(), 2);
        assert_eq!(loops.loop_depth(inner), 2);
        assert_eq!(loops.loop_depth(outer), 1);
        assert_eq!(loops.outermost_loop(inner).map(|i| loops.loops[i].header), Some(outer));
    }
}
