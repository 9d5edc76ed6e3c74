//! Layered parallel breadth-first generation.
//!
//! Per layer: the frontier is grouped by `(expression,
//! previous-transition-kind)` in first-seen order, the unique keys are
//! probed against the global cache, and only the remaining work is
//! submitted to the engine as one batched call split over the
//! configured shard count. Children are then materialized for every
//! frontier entry in insertion order, so trace enumeration is stable
//! regardless of how the engine parallelizes the batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use dynet_engine::{ExpansionInput, RewriteEngine, Successor};
use dynet_trace::{NodeId, TraceNode, TraceTree, TransitionKind, TreeError};
use tracing::debug;

use crate::{child_node, ExpansionCache, GenMetrics, GenSetup, GeneratorError, TraceGenerator};

struct FrontierEntry {
    parent: NodeId,
    expr: String,
    prev_kind: TransitionKind,
}

/// The batched breadth-first generator.
pub struct PbfsGenerator {
    threads: usize,
    cache: Arc<ExpansionCache>,
    metrics: GenMetrics,
}

impl PbfsGenerator {
    pub fn new(threads: usize) -> Self {
        Self::with_cache(Arc::new(ExpansionCache::new()), threads)
    }

    /// A generator sharing `cache` with other runs or strategies.
    pub fn with_cache(cache: Arc<ExpansionCache>, threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            cache,
            metrics: GenMetrics::default(),
        }
    }

    /// Resolves the successor lists of one layer's unique keys: cache
    /// hits first, then a single batched engine call for the misses.
    fn expand_layer(
        &mut self,
        engine: &dyn RewriteEngine,
        unique: &[(String, TransitionKind)],
    ) -> crate::Result<Vec<Arc<Vec<Successor>>>> {
        let mut results: Vec<Option<Arc<Vec<Successor>>>> = unique
            .iter()
            .map(|(expr, kind)| self.cache.probe(expr, *kind))
            .collect();

        let batch: Vec<ExpansionInput> = results
            .iter()
            .enumerate()
            .filter(|(_, cached)| cached.is_none())
            .map(|(id, _)| ExpansionInput {
                id,
                prev_kind: unique[id].1,
                expr: unique[id].0.clone(),
            })
            .collect();
        debug!(
            unique = unique.len(),
            cached = unique.len() - batch.len(),
            remaining = batch.len(),
            "expanding layer"
        );

        if !batch.is_empty() {
            let start = Instant::now();
            let batch_results = engine.submit(&batch, self.threads)?;
            self.metrics.engine_time += start.elapsed();
            self.metrics.engine_calls += 1;

            for result in batch_results {
                let (expr, kind) = unique
                    .get(result.id)
                    .ok_or(GeneratorError::MissingResult(result.id))?;
                results[result.id] =
                    Some(self.cache.insert(expr.clone(), *kind, result.successors));
            }
        }

        results
            .into_iter()
            .enumerate()
            .map(|(id, cached)| cached.ok_or(GeneratorError::MissingResult(id)))
            .collect()
    }
}

impl TraceGenerator for PbfsGenerator {
    fn run(
        &mut self,
        setup: &GenSetup,
        engine: &dyn RewriteEngine,
        depth: usize,
    ) -> crate::Result<TraceTree> {
        let start = Instant::now();
        self.metrics = GenMetrics::default();

        let mut tree = setup.new_tree();
        let root = tree.add_node(TraceNode::root(setup.elements), None)?;
        let mut frontier = vec![FrontierEntry {
            parent: root,
            expr: setup.start_expr.clone(),
            prev_kind: TransitionKind::Empty,
        }];

        let mut remaining = depth;
        while remaining > 0 && !frontier.is_empty() {
            debug!(depth = remaining, frontier = frontier.len(), "processing layer");

            // Coalesce identical keys, keeping first-seen order.
            let mut key_to_index: HashMap<(String, TransitionKind), usize> = HashMap::new();
            let mut unique: Vec<(String, TransitionKind)> = Vec::new();
            let mut entry_keys: Vec<usize> = Vec::with_capacity(frontier.len());
            for entry in &frontier {
                let key = (entry.expr.clone(), entry.prev_kind);
                let index = match key_to_index.get(&key).copied() {
                    Some(index) => index,
                    None => {
                        let index = unique.len();
                        unique.push(key.clone());
                        key_to_index.insert(key, index);
                        index
                    }
                };
                entry_keys.push(index);
            }

            let results = self.expand_layer(engine, &unique)?;

            let mut next_frontier = Vec::new();
            for (entry, &key_index) in frontier.iter().zip(&entry_keys) {
                for successor in results[key_index].iter() {
                    let parent = tree
                        .node_by_id(entry.parent)
                        .ok_or(GeneratorError::Tree(TreeError::ParentNotFound(entry.parent)))?;
                    let child = child_node(parent, successor)?;
                    let child_id = tree.add_node(child, Some(entry.parent))?;
                    next_frontier.push(FrontierEntry {
                        parent: child_id,
                        expr: successor.expr.clone(),
                        prev_kind: successor.kind,
                    });
                }
            }
            frontier = next_frontier;
            remaining -= 1;
        }

        self.metrics.generated_traces = crate::generated_traces(&tree);
        self.metrics.gen_time = start.elapsed();
        Ok(tree)
    }
}

impl dynet_common::StatsSource for PbfsGenerator {
    fn stats(&self) -> Vec<dynet_common::StatsEntry> {
        crate::metrics_stats(&self.metrics, &self.cache)
    }
}

#[cfg(test)]
mod tests {
    use dynet_engine::scripted::successor;
    use dynet_engine::ScriptedEngine;
    use dynet_trace::fmt_trace;

    use super::*;
    use crate::sequential::BfsGenerator;

    fn engine() -> ScriptedEngine {
        ScriptedEngine::new()
            .script(
                "A",
                TransitionKind::Empty,
                vec![
                    successor(TransitionKind::PktProc, "proc('p0',0)", "B"),
                    successor(TransitionKind::Rcfg, "rcfg(up, 'p1', 1, 0)", "B"),
                ],
            )
            .script(
                "B",
                TransitionKind::PktProc,
                vec![successor(TransitionKind::PktProc, "proc('p0',1)", "A")],
            )
            .script(
                "B",
                TransitionKind::Rcfg,
                vec![successor(TransitionKind::PktProc, "proc('p2',1)", "A")],
            )
    }

    fn setup() -> GenSetup {
        GenSetup {
            start_expr: "A".to_string(),
            elements: 2,
            restorer: None,
        }
    }

    #[test]
    fn depth_zero_yields_only_the_root() {
        let mut generator = PbfsGenerator::new(4);
        let tree = generator.run(&setup(), &engine(), 0).unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn coalesces_identical_frontier_keys() {
        let engine = ScriptedEngine::new()
            .script(
                "A",
                TransitionKind::Empty,
                vec![
                    successor(TransitionKind::PktProc, "proc('p0',0)", "B"),
                    successor(TransitionKind::PktProc, "proc('p1',1)", "B"),
                ],
            )
            .script(
                "B",
                TransitionKind::PktProc,
                vec![successor(TransitionKind::PktProc, "proc('p0',0)", "B")],
            );
        let mut generator = PbfsGenerator::new(2);
        let tree = generator.run(&setup(), &engine, 3).unwrap();
        // layer 2 has two entries with the same (B, proc) key, expanded
        // once; layer 3 hits the cache outright.
        assert_eq!(tree.len(), 1 + 2 + 2 + 2);
        let stats = generator.cache.stats();
        assert_eq!(stats.misses, 2);
        assert!(stats.hits >= 1);
        assert_eq!(generator.metrics.engine_calls, 2);
    }

    #[test]
    fn matches_the_sequential_trace_set() {
        let engine = engine();
        let mut pbfs = PbfsGenerator::new(3);
        let mut bfs = BfsGenerator::new();
        let pbfs_tree = pbfs.run(&setup(), &engine, 4).unwrap();
        let bfs_tree = bfs.run(&setup(), &engine, 4).unwrap();

        let traces_of = |tree: &TraceTree| {
            let mut traces: Vec<String> = tree
                .traces()
                .map(|t| fmt_trace(&tree.trace_nodes(&t)))
                .collect();
            traces.sort();
            traces
        };
        assert_eq!(traces_of(&pbfs_tree), traces_of(&bfs_tree));
    }

    #[test]
    fn layer_children_follow_frontier_insertion_order() {
        let mut generator = PbfsGenerator::new(2);
        let tree = generator.run(&setup(), &engine(), 2).unwrap();
        // Children of the root keep engine successor order.
        assert_eq!(tree.node(1).transition.to_string(), "proc('p0',0)");
        assert_eq!(
            tree.node(2).transition.to_string(),
            "rcfg(up, 'p1', 1, 0)"
        );
        // Layer 2: children of node 1 (kind proc) before children of
        // node 2 (kind rcfg).
        assert_eq!(tree.node(3).transition.to_string(), "proc('p0',1)");
        assert_eq!(tree.node(4).transition.to_string(), "proc('p2',1)");
    }
}
