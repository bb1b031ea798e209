//! Optimization passes over the IR graph.

pub mod gvn_pre;

pub use gvn_pre::{GvnPre, GvnPreConfig, GvnPreStats};

use crate::ir::graph::Graph;

/// A single optimization pass.
pub trait OptimizationPass {
    /// The name of this pass (for debugging/statistics).
    fn name(&self) -> &'static str;

    /// Run the pass. Returns true if the graph was modified.
    fn run(&mut self, graph: &mut Graph) -> bool;
}
