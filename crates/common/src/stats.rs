//! Run statistics: keyed entries with stable machine-readable keys and
//! human-readable labels, collected across the pipeline stages and
//! rendered either as aligned text or as CSV rows.

use std::fmt;

use itertools::Itertools;

/// A single statistics value.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsValue {
    Int(u64),
    Float(f64),
    Text(String),
}

impl fmt::Display for StatsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<u64> for StatsValue {
    fn from(v: u64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for StatsValue {
    fn from(v: usize) -> Self {
        Self::Int(v as u64)
    }
}

impl From<f64> for StatsValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for StatsValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for StatsValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// One reported statistic: a stable key for machine consumption and a
/// pretty name for humans.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsEntry {
    pub key: &'static str,
    pub pretty_name: &'static str,
    pub value: StatsValue,
}

impl StatsEntry {
    pub fn new(key: &'static str, pretty_name: &'static str, value: impl Into<StatsValue>) -> Self {
        Self {
            key,
            pretty_name,
            value: value.into(),
        }
    }
}

/// Anything that reports statistics about the work it performed.
pub trait StatsSource {
    fn stats(&self) -> Vec<StatsEntry>;
}

/// Accumulates [`StatsEntry`] values from the pipeline stages.
#[derive(Debug, Default)]
pub struct StatsCollector {
    entries: Vec<StatsEntry>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entries(&mut self, new_entries: Vec<StatsEntry>) {
        self.entries.extend(new_entries);
    }

    /// The keys of all collected entries joined by `sep` (a CSV header
    /// row when `sep` is a comma).
    pub fn keys(&self, sep: &str) -> String {
        self.entries.iter().map(|e| e.key).join(sep)
    }

    /// The values of all collected entries joined by `sep`.
    pub fn values(&self, sep: &str) -> String {
        self.entries.iter().map(|e| e.value.to_string()).join(sep)
    }

    /// One `pretty name: value` line per entry.
    pub fn to_pretty_string(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}: {}", e.pretty_name, e.value))
            .join("\n")
    }
}
