//! The policy-oracle boundary.
//!
//! The analyzer needs exactly two boolean decisions over opaque policy
//! expressions: whether two expressions denote different packet
//! mappings, and whether a safety-property template holds once a
//! policy is substituted into it. [`PolicyOracle`] is that contract;
//! [`MemoizedOracle`] adds per-operation caching and statistics, and
//! [`NkplOracle`] implements the contract by shelling out to an
//! external checker.

pub mod memo;
pub mod nkpl;
pub mod testing;

pub use memo::MemoizedOracle;
pub use nkpl::NkplOracle;

/// Result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;

/// Errors reported by an oracle. Callers treat every one of them as
/// fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("the oracle could not decide '{query}': {reason}")]
    Undecided { query: String, reason: String },

    #[error("failed to invoke the oracle tool: {0}")]
    Io(#[from] std::io::Error),
}

/// Boolean decision procedures over policy expressions. Both operands
/// are opaque to the caller.
pub trait PolicyOracle: Send + Sync {
    /// True iff `a` and `b` denote different packet-mapping relations.
    fn are_not_equivalent(&self, a: &str, b: &str) -> Result<bool>;

    /// True iff substituting `policy` into `template` yields a valid
    /// formula.
    fn property_holds(&self, template: &str, policy: &str) -> Result<bool>;
}
