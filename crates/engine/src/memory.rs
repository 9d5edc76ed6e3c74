//! The in-memory engine: parses each submitted expression and applies
//! the head-normal-form relation directly, fanning batches out over a
//! rayon pool.

use rayon::prelude::*;

use crate::hnf::{self, EngineEnv};
use crate::{parser, ExpansionInput, ExpansionResult, RewriteEngine, Successor};

/// A head-normal-form service interpreting the process language
/// against a fixed [`EngineEnv`].
#[derive(Debug)]
pub struct HnfEngine {
    env: EngineEnv,
}

impl HnfEngine {
    pub fn new(env: EngineEnv) -> Self {
        Self { env }
    }

    /// Successors of a single expression.
    pub fn expand(&self, expr: &str) -> crate::Result<Vec<Successor>> {
        let elements = parser::parse_parallel(expr)?;
        hnf::successors(&elements, &self.env)
    }
}

impl RewriteEngine for HnfEngine {
    fn submit(&self, batch: &[ExpansionInput], shards: usize) -> crate::Result<Vec<ExpansionResult>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        // Split the batch uniformly over the shards; inputs are
        // independent, so chunked order-preserving collection keeps
        // results aligned with the submission order.
        let chunk_size = batch.len().div_ceil(shards.max(1));
        let chunks: Vec<Vec<ExpansionResult>> = batch
            .par_chunks(chunk_size)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|input| {
                        Ok(ExpansionResult {
                            id: input.id,
                            successors: self.expand(&input.expr)?,
                        })
                    })
                    .collect::<crate::Result<Vec<ExpansionResult>>>()
            })
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(chunks.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use dynet_trace::TransitionKind;

    use super::*;
    use crate::hnf::{SwitchConfig, SwitchUpdate};

    fn engine() -> HnfEngine {
        let mut env = EngineEnv::new();
        env.add_switch(
            "BigSwitch",
            SwitchConfig {
                link: "one".to_string(),
                updates: vec![SwitchUpdate {
                    channel: "up1".to_string(),
                    slot: 0,
                    policy: "f1".to_string(),
                    append: false,
                }],
                requests: Vec::new(),
            },
        );
        env.define("CT1", "up1 ! \"f1\" ; CT1").unwrap();
        HnfEngine::new(env)
    }

    #[test]
    fn batches_preserve_submission_order() {
        let engine = engine();
        let batch: Vec<ExpansionInput> = (0..8)
            .map(|id| ExpansionInput {
                id,
                prev_kind: TransitionKind::Empty,
                expr: "sw(BigSwitch, [\"f0\"], none) || CT1".to_string(),
            })
            .collect();

        for shards in [1, 3, 8, 16] {
            let results = engine.submit(&batch, shards).unwrap();
            assert_eq!(results.len(), 8);
            for (i, result) in results.iter().enumerate() {
                assert_eq!(result.id, i);
                assert_eq!(result.successors.len(), 2);
            }
        }
    }

    #[test]
    fn a_bad_expression_fails_the_whole_batch() {
        let engine = engine();
        let batch = vec![
            ExpansionInput {
                id: 0,
                prev_kind: TransitionKind::Empty,
                expr: "sw(BigSwitch, [\"f0\"], none) || CT1".to_string(),
            },
            ExpansionInput {
                id: 1,
                prev_kind: TransitionKind::Empty,
                expr: "sw(".to_string(),
            },
        ];
        assert!(engine.submit(&batch, 2).is_err());
    }
}
