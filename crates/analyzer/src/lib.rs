//! Trace analysis: finding vector-clock-incomparable transition pairs,
//! classifying them through the race handlers and the policy oracle,
//! and aggregating the harmful races of a run.

pub mod checker;
pub mod dot;
pub mod race;
pub mod reconstruct;
pub mod trace_analyzer;
pub mod traces_analyzer;

use dynet_common::RaceKind;
use dynet_oracle::OracleError;

pub use checker::TransitionsChecker;
pub use race::{HarmfulRace, Race, RacingNode};
pub use trace_analyzer::TraceAnalyzer;
pub use traces_analyzer::TracesAnalyzer;

/// Result type for analyzer operations.
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Errors raised during trace analysis. An [`AnalyzerError::Oracle`]
/// aborts the whole run; every other variant is fatal only for the
/// trace that produced it.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("trace node {pos}: clock matrix does not match the {elements}-element model")]
    ClockSizeMismatch { pos: usize, elements: usize },

    #[error("trace node {pos}: transition has no source element")]
    MissingSource { pos: usize },

    #[error("trace node {pos}: element {element} is outside the {elements}-element model")]
    ElementOutOfBounds {
        pos: usize,
        element: usize,
        elements: usize,
    },

    #[error("transition positions {0} and {1} are out of trace bounds")]
    PositionOutOfBounds(usize, usize),

    #[error("could not match a network switch for reconfiguration channel '{0}'")]
    UnknownChannel(String),

    #[error("no safety property configured for race kind {0}")]
    MissingProperty(RaceKind),

    #[error("failed to write race report: {0}")]
    Io(#[from] std::io::Error),
}
