//! Orchestration of a full run: unfold the model into a trace tree,
//! write the traces, analyze them against the safety properties, and
//! report the harmful races and run statistics.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use dynet_analyzer::{AnalyzerError, HarmfulRace, TracesAnalyzer, TransitionsChecker};
use dynet_common::{RaceKind, StatsCollector, StatsEntry, StatsSource};
use dynet_engine::{
    EngineEnv, EngineError, HnfEngine, SwitchConfig, SwitchRequest, SwitchUpdate,
};
use dynet_generator::{new_trace_generator, GenSetup, GeneratorError, Strategy, TraceGenerator};
use dynet_model::{ModelError, NetworkModel, SafetyProperties};
use dynet_oracle::{MemoizedOracle, PolicyOracle};
use dynet_trace::fmt_trace;
use tracing::info;

const TRACES_FILE_NAME: &str = "traces";
const HARMFUL_TRACES_DIR_NAME: &str = "harmful_traces";
const HARMFUL_TRACES_RAW_DIR_NAME: &str = "harmful_traces_raw";

/// Result type for tracer operations.
pub type Result<T> = std::result::Result<T, TracerError>;

#[derive(Debug, thiserror::Error)]
pub enum TracerError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),

    #[error("failed to write run output: {0}")]
    Io(#[from] std::io::Error),
}

/// Options of one run.
#[derive(Debug, Clone)]
pub struct TracerConfig {
    /// Directory receiving the traces file and the race reports.
    pub output_dir: PathBuf,
    /// Depth bound of the unfolding.
    pub depth: usize,
    /// Shard count of the batched strategy.
    pub threads: usize,
    pub strategy: Strategy,
    /// Race kinds to count but not classify, in addition to `SW-SW`.
    pub skipped_kinds: Vec<RaceKind>,
    /// Stem of the traces file name, usually the input file name.
    pub input_name: String,
}

/// What a run produced.
pub struct RunReport {
    pub generated_traces: u64,
    pub races: Vec<HarmfulRace>,
    /// Statistics of the generation phase.
    pub generation_stats: Vec<StatsEntry>,
    /// Statistics of the analysis phase (empty when no traces were
    /// generated).
    pub analysis_stats: Vec<StatsEntry>,
}

/// Drives generation and analysis for one model.
pub struct Tracer {
    config: TracerConfig,
    generator: Box<dyn TraceGenerator>,
}

impl Tracer {
    pub fn new(config: TracerConfig) -> Self {
        let generator = new_trace_generator(config.strategy, config.threads);
        Self { config, generator }
    }

    /// Runs the full pipeline. The oracle decides the safety
    /// properties; it is memoized for the duration of the run.
    pub fn run(
        &mut self,
        model: &NetworkModel,
        properties: &SafetyProperties,
        oracle: Box<dyn PolicyOracle>,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let raw_dir = self.config.output_dir.join(HARMFUL_TRACES_RAW_DIR_NAME);
        let dot_dir = self.config.output_dir.join(HARMFUL_TRACES_DIR_NAME);
        fs::create_dir_all(&raw_dir)?;
        fs::create_dir_all(&dot_dir)?;

        let engine = build_engine(model)?;
        let setup = GenSetup {
            start_expr: model.start_expression(),
            elements: model.element_count(),
            restorer: Some(model.restorer()),
        };

        info!("generating traces...");
        let mut tree = self
            .generator
            .run(&setup, &engine, self.config.depth)?;
        let generation_stats = self.generator.stats();
        let generated_traces = tree_trace_count(&tree);
        if generated_traces == 0 {
            info!("no traces generated for the given network and depth");
            return Ok(RunReport {
                generated_traces: 0,
                races: Vec::new(),
                generation_stats,
                analysis_stats: Vec::new(),
            });
        }
        self.write_traces_file(&tree)?;

        info!("analyzing traces...");
        let memoized = MemoizedOracle::new(oracle);
        let templates = properties.templates();
        let mut checker = TransitionsChecker::new(&memoized, &model.metadata, &templates)
            .with_skipped(self.config.skipped_kinds.clone());
        let mut analyzer = TracesAnalyzer::new(&raw_dir, &dot_dir);
        let races = analyzer.run(&mut tree, &model.metadata, &mut checker)?;

        let mut analysis_stats = memoized.stats();
        analysis_stats.extend(analyzer.stats());
        analysis_stats.push(StatsEntry::new(
            "totalExecTime",
            "Total execution time",
            start.elapsed().as_secs_f64(),
        ));

        Ok(RunReport {
            generated_traces,
            races,
            generation_stats,
            analysis_stats,
        })
    }

    /// Writes every generated trace, one serialized trace per line.
    fn write_traces_file(&self, tree: &dynet_trace::TraceTree) -> Result<()> {
        let path = self.config.output_dir.join(format!(
            "{TRACES_FILE_NAME}_{}.txt",
            self.config.input_name
        ));
        let lines: Vec<String> = tree
            .traces()
            .map(|indices| fmt_trace(&tree.trace_nodes(&indices)))
            .collect();
        fs::write(path, lines.join("\n"))?;
        Ok(())
    }
}

/// A root-only tree generates no traces.
fn tree_trace_count(tree: &dynet_trace::TraceTree) -> u64 {
    if tree.len() <= 1 {
        return 0;
    }
    tree.trace_count() as u64
}

/// Initializes the in-memory engine against the model's definitions.
pub fn build_engine(model: &NetworkModel) -> std::result::Result<HnfEngine, EngineError> {
    let mut env = EngineEnv::new();
    for (name, expr) in &model.definitions {
        env.define(name, expr)?;
    }
    env.add_switch(
        &model.switch.name,
        SwitchConfig {
            link: model.switch.link.clone(),
            updates: model
                .switch
                .updates
                .iter()
                .map(|u| SwitchUpdate {
                    channel: u.channel.clone(),
                    slot: u.slot,
                    policy: u.policy.clone(),
                    append: u.append,
                })
                .collect(),
            requests: model
                .switch
                .requests
                .iter()
                .map(|r| SwitchRequest {
                    request_channel: r.request_channel.clone(),
                    request_policy: r.request_policy.clone(),
                    response_channel: r.response_channel.clone(),
                    response_policy: r.response_policy.clone(),
                    slot: r.slot,
                })
                .collect(),
        },
    );
    Ok(HnfEngine::new(env))
}

/// Appends one CSV row of `stats` to `path`, writing the header row
/// first when the file does not exist yet.
pub fn log_run_stats(stats: &StatsCollector, path: &Path) -> std::io::Result<()> {
    let sep = ",";
    if !path.exists() {
        fs::write(path, format!("{}\n", stats.keys(sep)))?;
    }
    let mut file = fs::OpenOptions::new().append(true).open(path)?;
    writeln!(file, "{}", stats.values(sep))?;
    Ok(())
}
