//! Bounded unfolding of a network model into a trace tree.
//!
//! Three strategies share the transition semantics and the global
//! expansion cache and produce identical trace sets: depth-first and
//! breadth-first sequential work lists, and a layered breadth-first
//! strategy that coalesces identical frontier keys and expands each
//! layer through one batched, sharded engine call.

pub mod cache;
pub mod pbfs;
pub mod sequential;
pub mod worklist;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dynet_common::{StatsEntry, StatsSource};
use dynet_engine::{EngineError, RewriteEngine, Successor};
use dynet_trace::{
    PolicyRestorer, TraceNode, TraceTree, Transition, TreeError, VcError,
};
use tracing::warn;

pub use cache::{CacheStats, ExpansionCache};
pub use pbfs::PbfsGenerator;
pub use sequential::{BfsGenerator, DfsGenerator};

/// Result type for generator operations.
pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Errors aborting a generation run. No partial tree is emitted.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("engine failure: {0}")]
    Engine(#[from] EngineError),

    #[error("trace tree failure: {0}")]
    Tree(#[from] TreeError),

    #[error("clock update failure: {0}")]
    Clock(#[from] VcError),

    #[error("the engine returned no result for batch input {0}")]
    MissingResult(usize),
}

/// What a generator unfolds: the initial parallel composition, the
/// number of elements (clock width), and the placeholder restorer to
/// install on the trace tree.
pub struct GenSetup {
    pub start_expr: String,
    pub elements: usize,
    pub restorer: Option<Arc<dyn PolicyRestorer>>,
}

impl GenSetup {
    pub(crate) fn new_tree(&self) -> TraceTree {
        match &self.restorer {
            Some(restorer) => TraceTree::with_restorer(restorer.clone()),
            None => TraceTree::new(),
        }
    }
}

/// A bounded trace-tree generator.
pub trait TraceGenerator: StatsSource {
    /// Unfolds the model up to `depth` transitions per trace. The
    /// resulting tree's root carries the empty transition and the zero
    /// clock matrix; every root-to-leaf path has at most `depth + 1`
    /// nodes.
    fn run(
        &mut self,
        setup: &GenSetup,
        engine: &dyn RewriteEngine,
        depth: usize,
    ) -> Result<TraceTree>;
}

/// The available generation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Dfs,
    Bfs,
    Pbfs,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dfs" => Ok(Self::Dfs),
            "bfs" => Ok(Self::Bfs),
            "pbfs" => Ok(Self::Pbfs),
            other => Err(format!("unknown strategy '{other}' (expected dfs, bfs or pbfs)")),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dfs => write!(f, "dfs"),
            Self::Bfs => write!(f, "bfs"),
            Self::Pbfs => write!(f, "pbfs"),
        }
    }
}

/// Builds a generator for `strategy` with a fresh expansion cache.
/// `threads` is the shard count of the batched strategy; the
/// sequential strategies ignore it.
pub fn new_trace_generator(strategy: Strategy, threads: usize) -> Box<dyn TraceGenerator> {
    let cache = Arc::new(ExpansionCache::new());
    match strategy {
        Strategy::Dfs => Box::new(DfsGenerator::with_cache(cache)),
        Strategy::Bfs => Box::new(BfsGenerator::with_cache(cache)),
        Strategy::Pbfs => Box::new(PbfsGenerator::with_cache(cache, threads)),
    }
}

/// Timing and volume counters shared by the strategies.
#[derive(Debug, Default)]
pub(crate) struct GenMetrics {
    pub gen_time: Duration,
    pub engine_time: Duration,
    pub engine_calls: u64,
    pub generated_traces: u64,
}

/// Traces produced by a finished tree; a root-only tree counts as
/// none.
pub(crate) fn generated_traces(tree: &TraceTree) -> u64 {
    if tree.len() <= 1 {
        return 0;
    }
    tree.trace_count() as u64
}

pub(crate) fn metrics_stats(metrics: &GenMetrics, cache: &ExpansionCache) -> Vec<StatsEntry> {
    let cache_stats = cache.stats();
    vec![
        StatsEntry::new(
            "tracesGenTime",
            "Trace(s) generation time",
            metrics.gen_time.as_secs_f64(),
        ),
        StatsEntry::new(
            "engineExecTime",
            "Engine execution time",
            metrics.engine_time.as_secs_f64(),
        ),
        StatsEntry::new("engineCalls", "Engine calls", metrics.engine_calls),
        StatsEntry::new("traceGenCacheHits", "Trace generation cache hits", cache_stats.hits),
        StatsEntry::new(
            "traceGenCacheMisses",
            "Trace generation cache misses",
            cache_stats.misses,
        ),
        StatsEntry::new("generatedTraces", "Generated traces", metrics.generated_traces),
    ]
}

/// Builds the child node for one successor: its transition parsed from
/// the label (falling back to the empty transition on unparseable
/// labels, which leaves the parent's clocks untouched) and the
/// parent's clock matrix advanced by that transition.
pub(crate) fn child_node(parent: &TraceNode, successor: &Successor) -> Result<TraceNode> {
    let transition = match Transition::parse(&successor.label) {
        Ok(transition) => transition,
        Err(err) => {
            warn!(label = %successor.label, %err, "unparseable transition label, using empty transition");
            Transition::Empty
        }
    };
    let clocks = transition.update_vc(&parent.vector_clocks)?;
    Ok(TraceNode::new(transition, clocks))
}
