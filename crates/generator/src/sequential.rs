//! Sequential generation over a work list: LIFO for depth-first, FIFO
//! for breadth-first. Each popped item is expanded through the shared
//! cache, falling back to a single-input engine submission on a miss.

use std::sync::Arc;
use std::time::Instant;

use dynet_engine::{ExpansionInput, RewriteEngine, Successor};
use dynet_trace::{NodeId, TraceNode, TraceTree, TransitionKind, TreeError};

use crate::worklist::{Fifo, Lifo, WorkList};
use crate::{child_node, ExpansionCache, GenMetrics, GenSetup, GeneratorError, TraceGenerator};

/// One pending expansion: the expression reached at `parent`, the kind
/// of the transition that reached it, and its depth in the tree.
#[derive(Debug)]
pub struct WorkItem {
    expr: String,
    prev_kind: TransitionKind,
    parent: NodeId,
    depth: usize,
}

/// Work-list driven generator; the list discipline decides the
/// unfolding order.
pub struct SequentialGenerator<W: WorkList<WorkItem>> {
    worklist: W,
    cache: Arc<ExpansionCache>,
    metrics: GenMetrics,
}

/// Depth-first unfolding.
pub type DfsGenerator = SequentialGenerator<Lifo<WorkItem>>;
/// Breadth-first unfolding.
pub type BfsGenerator = SequentialGenerator<Fifo<WorkItem>>;

impl<W: WorkList<WorkItem>> SequentialGenerator<W> {
    pub fn new() -> Self {
        Self::with_cache(Arc::new(ExpansionCache::new()))
    }

    /// A generator sharing `cache` with other runs or strategies.
    pub fn with_cache(cache: Arc<ExpansionCache>) -> Self {
        Self {
            worklist: W::default(),
            cache,
            metrics: GenMetrics::default(),
        }
    }

    fn expand(
        &mut self,
        engine: &dyn RewriteEngine,
        item: &WorkItem,
    ) -> crate::Result<Arc<Vec<Successor>>> {
        if let Some(successors) = self.cache.probe(&item.expr, item.prev_kind) {
            return Ok(successors);
        }

        let input = ExpansionInput {
            id: 0,
            prev_kind: item.prev_kind,
            expr: item.expr.clone(),
        };
        let start = Instant::now();
        let mut results = engine.submit(std::slice::from_ref(&input), 1)?;
        self.metrics.engine_time += start.elapsed();
        self.metrics.engine_calls += 1;

        let result = results
            .pop()
            .filter(|result| result.id == 0)
            .ok_or(GeneratorError::MissingResult(0))?;
        Ok(self
            .cache
            .insert(item.expr.clone(), item.prev_kind, result.successors))
    }
}

impl<W: WorkList<WorkItem>> Default for SequentialGenerator<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: WorkList<WorkItem>> TraceGenerator for SequentialGenerator<W> {
    fn run(
        &mut self,
        setup: &GenSetup,
        engine: &dyn RewriteEngine,
        depth: usize,
    ) -> crate::Result<TraceTree> {
        let start = Instant::now();
        self.metrics = GenMetrics::default();
        self.worklist.clear();

        let mut tree = setup.new_tree();
        let root = tree.add_node(TraceNode::root(setup.elements), None)?;
        if depth > 0 {
            self.worklist.push(WorkItem {
                expr: setup.start_expr.clone(),
                prev_kind: TransitionKind::Empty,
                parent: root,
                depth: 0,
            });
        }

        while let Some(item) = self.worklist.pop() {
            let successors = self.expand(engine, &item)?;
            for successor in successors.iter() {
                let parent = tree
                    .node_by_id(item.parent)
                    .ok_or(GeneratorError::Tree(TreeError::ParentNotFound(item.parent)))?;
                let child = child_node(parent, successor)?;
                let child_id = tree.add_node(child, Some(item.parent))?;
                if item.depth + 1 < depth {
                    self.worklist.push(WorkItem {
                        expr: successor.expr.clone(),
                        prev_kind: successor.kind,
                        parent: child_id,
                        depth: item.depth + 1,
                    });
                }
            }
        }

        self.metrics.generated_traces = crate::generated_traces(&tree);
        self.metrics.gen_time = start.elapsed();
        Ok(tree)
    }
}

impl<W: WorkList<WorkItem>> dynet_common::StatsSource for SequentialGenerator<W> {
    fn stats(&self) -> Vec<dynet_common::StatsEntry> {
        crate::metrics_stats(&self.metrics, &self.cache)
    }
}

#[cfg(test)]
mod tests {
    use dynet_engine::scripted::successor;
    use dynet_engine::ScriptedEngine;

    use super::*;

    fn diamond_engine() -> ScriptedEngine {
        // A o+ two branches that converge on the same (expr, kind) key.
        ScriptedEngine::new()
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
                vec![successor(TransitionKind::Rcfg, "rcfg(up, 'p2', 1, 0)", "C")],
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
        let mut generator = BfsGenerator::new();
        let tree = generator.run(&setup(), &diamond_engine(), 0).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.trace_count(), 1);
    }

    #[test]
    fn unfolds_to_the_requested_depth() {
        let mut generator = BfsGenerator::new();
        let tree = generator.run(&setup(), &diamond_engine(), 2).unwrap();
        // root + 2 children + 2 grandchildren
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.trace_count(), 2);
        for trace in tree.traces() {
            assert!(trace.len() <= 3);
        }
    }

    #[test]
    fn clocks_follow_the_parent_chain() {
        let mut generator = BfsGenerator::new();
        let tree = generator.run(&setup(), &diamond_engine(), 2).unwrap();
        let trace: Vec<usize> = tree.traces().next().unwrap();
        let leaf = tree.node(trace[trace.len() - 1]);
        // proc(0) then rcfg(1 -> 0)
        assert_eq!(leaf.vector_clocks.row(0).unwrap(), &[2, 1]);
        assert_eq!(leaf.vector_clocks.row(1).unwrap(), &[0, 1]);
    }

    #[test]
    fn identical_keys_are_expanded_once() {
        let mut generator = BfsGenerator::new();
        let tree = generator.run(&setup(), &diamond_engine(), 2).unwrap();
        assert_eq!(tree.len(), 5);
        let stats = generator.cache.stats();
        // (A, none) misses, (B, proc) misses once and hits once
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(generator.metrics.engine_calls, 2);
    }

    #[test]
    fn dfs_and_bfs_agree_on_the_trace_set() {
        let engine = diamond_engine();
        let mut dfs = DfsGenerator::new();
        let mut bfs = BfsGenerator::new();
        let dfs_tree = dfs.run(&setup(), &engine, 2).unwrap();
        let bfs_tree = bfs.run(&setup(), &engine, 2).unwrap();

        let traces_of = |tree: &TraceTree| {
            let mut traces: Vec<String> = tree
                .traces()
                .map(|t| dynet_trace::node::fmt_trace(&tree.trace_nodes(&t)))
                .collect();
            traces.sort();
            traces
        };
        assert_eq!(traces_of(&dfs_tree), traces_of(&bfs_tree));
    }

    #[test]
    fn unparseable_labels_fall_back_to_empty_transitions() {
        let engine = ScriptedEngine::new().script(
            "A",
            TransitionKind::Empty,
            vec![successor(TransitionKind::PktProc, "garbage(", "B")],
        );
        let mut generator = BfsGenerator::new();
        let tree = generator.run(&setup(), &engine, 1).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.node(1).transition, dynet_trace::Transition::Empty);
        assert_eq!(tree.node(1).vector_clocks, tree.node(0).vector_clocks);
    }

    #[test]
    fn engine_failures_abort_the_run() {
        struct BrokenEngine;
        impl RewriteEngine for BrokenEngine {
            fn submit(
                &self,
                _batch: &[ExpansionInput],
                _shards: usize,
            ) -> dynet_engine::Result<Vec<dynet_engine::ExpansionResult>> {
                Err(dynet_engine::EngineError::UndefinedVariable("A".to_string()))
            }
        }

        let mut generator = BfsGenerator::new();
        assert!(generator.run(&setup(), &BrokenEngine, 3).is_err());
    }
}
