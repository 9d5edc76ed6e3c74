//! A table-backed engine for exercising the generator without a real
//! head-normal-form relation.

use std::collections::HashMap;

use dynet_trace::TransitionKind;

use crate::{ExpansionInput, ExpansionResult, RewriteEngine, Successor};

/// Maps `(expression, previous-transition-kind)` to a fixed successor
/// list; unknown keys expand to nothing.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    table: HashMap<(String, TransitionKind), Vec<Successor>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the successors of `(expr, prev_kind)`.
    pub fn script(
        mut self,
        expr: &str,
        prev_kind: TransitionKind,
        successors: Vec<Successor>,
    ) -> Self {
        self.table.insert((expr.to_string(), prev_kind), successors);
        self
    }
}

/// Shorthand for building a scripted successor.
pub fn successor(kind: TransitionKind, label: &str, expr: &str) -> Successor {
    Successor {
        kind,
        label: label.to_string(),
        expr: expr.to_string(),
    }
}

impl RewriteEngine for ScriptedEngine {
    fn submit(&self, batch: &[ExpansionInput], _shards: usize) -> crate::Result<Vec<ExpansionResult>> {
        Ok(batch
            .iter()
            .map(|input| ExpansionResult {
                id: input.id,
                successors: self
                    .table
                    .get(&(input.expr.clone(), input.prev_kind))
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect())
    }
}
