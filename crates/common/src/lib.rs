//! Shared leaf types for the dynamic-network race tracer: the policy
//! algebra's symbol table and the run-statistics plumbing every stage
//! reports through.

pub mod race;
pub mod stats;
pub mod symbols;

pub use race::RaceKind;
pub use stats::{StatsCollector, StatsEntry, StatsSource, StatsValue};
