//! Command-line entry of the dynamic-network race tracer.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use clap::{Parser, ValueHint};
use dynet_common::{StatsCollector, StatsEntry};
use dynet_generator::Strategy;
use dynet_model::{NetworkModel, SafetyProperties};
use dynet_oracle::NkplOracle;
use dynet_tracer::{log_run_stats, Tracer, TracerConfig};
use tracing_subscriber::EnvFilter;

const RUN_DIR_NAME: &str = "run";
const TRACES_GEN_STATS_FILE_NAME: &str = "trace_generation_stats";
const STATS_FILE_NAME: &str = "final_stats";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Bounded race detection for dynamic software-defined networks",
    long_about = None
)]
struct Args {
    /// Path to the policy-oracle checker binary
    #[arg(value_hint = ValueHint::FilePath)]
    oracle_path: PathBuf,

    /// Path to the network model (JSON format)
    #[arg(value_hint = ValueHint::FilePath)]
    input_file: PathBuf,

    /// Safety properties file (JSON format); defaults to requiring a
    /// non-empty network policy for every classifiable race kind
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    properties: Option<PathBuf>,

    /// Depth of the search
    #[arg(short, long, default_value_t = 5)]
    depth: usize,

    /// Number of worker shards used when generating traces
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// Strategy used to generate the traces
    #[arg(short, long, default_value_t = Strategy::Bfs)]
    strategy: Strategy,

    /// Print log messages during execution
    #[arg(short, long)]
    verbose: bool,

    /// Directory receiving run outputs and statistics
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if args.threads == 0 {
        bail!("number of threads must be a positive integer");
    }
    if !args.oracle_path.is_file() {
        bail!(
            "oracle tool could not be found at '{}'",
            args.oracle_path.display()
        );
    }

    let model_json = fs::read_to_string(&args.input_file)
        .with_context(|| format!("error reading file '{}'", args.input_file.display()))?;
    let model = NetworkModel::from_json(&model_json).context("invalid network model")?;

    let properties = match &args.properties {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("error reading file '{}'", path.display()))?;
            SafetyProperties::from_json(&json).context("invalid safety properties")?
        }
        None => SafetyProperties::default(),
    };

    let run_dir = create_run_dir(&args.output_dir)?;
    let input_name = args
        .input_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());

    let config = TracerConfig {
        output_dir: run_dir.clone(),
        depth: args.depth,
        threads: args.threads,
        strategy: args.strategy,
        skipped_kinds: Vec::new(),
        input_name: input_name.clone(),
    };
    let oracle = NkplOracle::new(&args.oracle_path, &run_dir);

    let mut tracer = Tracer::new(config);
    let report = tracer.run(&model, &properties, Box::new(oracle))?;

    let mut stats = StatsCollector::new();
    stats.add_entries(vec![
        StatsEntry::new("inputFile", "Input file", input_name),
        StatsEntry::new("strategy", "Trace generation strategy", args.strategy.to_string()),
        StatsEntry::new("depth", "Depth", args.depth),
    ]);
    stats.add_entries(dynet_common::StatsSource::stats(&model));
    stats.add_entries(report.generation_stats.clone());
    log_run_stats(
        &stats,
        &args.output_dir.join(format!("{TRACES_GEN_STATS_FILE_NAME}.csv")),
    )?;

    if report.generated_traces == 0 {
        println!("{}", stats.to_pretty_string());
        bail!("could not generate any traces for the given network and depth");
    }

    stats.add_entries(report.analysis_stats.clone());
    println!();
    println!("========== Final Stats ==========");
    println!("{}", stats.to_pretty_string());
    println!("=================================");
    log_run_stats(&stats, &args.output_dir.join(format!("{STATS_FILE_NAME}.csv")))?;
    println!("Output written to: {}", run_dir.display());

    Ok(())
}

/// Creates a fresh timestamped directory for this run's artifacts.
fn create_run_dir(output_dir: &PathBuf) -> anyhow::Result<PathBuf> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut dir = output_dir.join(format!("{RUN_DIR_NAME}_{timestamp}"));
    let mut suffix = 0;
    while dir.exists() {
        suffix += 1;
        dir = output_dir.join(format!("{RUN_DIR_NAME}_{timestamp}_{suffix}"));
    }
    fs::create_dir_all(&dir)
        .with_context(|| format!("could not create run directory '{}'", dir.display()))?;
    Ok(dir)
}
