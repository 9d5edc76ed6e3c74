//! Trace-level data model: vector clocks, transitions, trace nodes and
//! the parent-indexed trace tree the generator unfolds into.

pub mod node;
pub mod transition;
pub mod tree;
pub mod vector_clocks;

pub use node::{fmt_trace, parse_trace, NodeId, TraceNode};
pub use transition::{ParseError, Transition, TransitionKind};
pub use tree::{PolicyRestorer, TraceIter, TraceTree, TreeError};
pub use vector_clocks::{VcError, VectorClocks};
