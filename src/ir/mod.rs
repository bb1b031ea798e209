//! Sea-of-Nodes intermediate representation.
//!
//! - **Arena** (`arena.rs`): typed ids, arenas and side tables
//! - **Mode** (`mode.rs`): typed width tags
//! - **Operators** (`operators.rs`): operation vocabulary and classifiers
//! - **Node** (`node.rs`): node records and input lists
//! - **Graph** (`graph.rs`): the scheduled graph with blocks and use chains
//! - **CFG** (`cfg.rs`): orders, dominator tree, loop forest

pub mod arena;
pub mod cfg;
pub mod graph;
pub mod mode;
pub mod node;
pub mod operators;

pub use arena::{Arena, BitSet, Id, SecondaryMap};
pub use cfg::{topological_order, DominatorTree, LoopForest};
pub use graph::{BlockData, Graph};
pub use mode::Mode;
pub use node::{BlockId, InputList, Node, NodeFlags, NodeId};
pub use operators::{ArithOp, CmpOp, Operator};
