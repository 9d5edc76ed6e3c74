//! The rewriting-engine boundary.
//!
//! The trace generator treats expansion as an opaque batched service:
//! it submits `(id, previous-transition-kind, expression)` tuples and
//! receives, per id, the ordered list of labeled successors under the
//! one-step head-normal-form relation. This crate defines that
//! contract, the expression language, and two engines honoring it: the
//! in-memory [`HnfEngine`] interpreting the language directly, and the
//! table-backed [`ScriptedEngine`] for tests.

pub mod hnf;
pub mod parser;
pub mod scripted;
pub mod term;

mod memory;

use dynet_trace::TransitionKind;

pub use hnf::{EngineEnv, SwitchConfig, SwitchRequest, SwitchUpdate};
pub use memory::HnfEngine;
pub use scripted::ScriptedEngine;
pub use term::{SwitchState, Term};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors reported by an engine. All of them are fatal for the run
/// that submitted the batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("failed to parse expression '{expr}': {message}")]
    Parse { expr: String, message: String },

    #[error("undefined process variable '{0}'")]
    UndefinedVariable(String),

    #[error("process variable '{0}' recurses without an intervening action")]
    UnguardedRecursion(String),

    #[error("unknown switch configuration '{0}'")]
    UnknownSwitchConfig(String),

    #[error("switch configuration '{config}' has no request {index}")]
    UnknownRequest { config: String, index: usize },

    #[error("switch configuration '{config}' update targets slot {slot}, but only {fts} flow tables exist")]
    SlotOutOfRange {
        config: String,
        slot: usize,
        fts: usize,
    },
}

/// One expansion request: the dense batch-local id, the kind of the
/// transition that produced the expression, and the expression itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionInput {
    pub id: usize,
    pub prev_kind: TransitionKind,
    pub expr: String,
}

/// One successor under the head-normal-form relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Successor {
    pub kind: TransitionKind,
    pub label: String,
    pub expr: String,
}

/// The successors of one batch input, keyed back by its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionResult {
    pub id: usize,
    pub successors: Vec<Successor>,
}

/// A head-normal-form service. Each batch is self-contained; the
/// engine must not be assumed to keep state across submissions. The
/// order of successors per input is preserved and becomes
/// child-insertion order in the trace tree.
pub trait RewriteEngine: Send + Sync {
    /// Expands every input of `batch`, fanning the work out over
    /// `shards` workers. Any failure aborts the whole batch.
    fn submit(&self, batch: &[ExpansionInput], shards: usize) -> Result<Vec<ExpansionResult>>;
}
