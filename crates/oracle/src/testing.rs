//! Oracle doubles for tests.

use crate::{PolicyOracle, Result};

type Decision = Box<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// An oracle answering from two closures.
pub struct FnOracle {
    not_equivalent: Decision,
    property_holds: Decision,
}

impl FnOracle {
    pub fn new(
        not_equivalent: impl Fn(&str, &str) -> bool + Send + Sync + 'static,
        property_holds: impl Fn(&str, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            not_equivalent: Box::new(not_equivalent),
            property_holds: Box::new(property_holds),
        }
    }

    /// An oracle deciding syntactically: expressions are equivalent iff
    /// equal, and a property holds iff the substituted policy differs
    /// from `zero`.
    pub fn syntactic() -> Self {
        Self::new(
            |a, b| a != b,
            |_, policy| policy != dynet_common::symbols::ZERO,
        )
    }
}

impl PolicyOracle for FnOracle {
    fn are_not_equivalent(&self, a: &str, b: &str) -> Result<bool> {
        Ok((self.not_equivalent)(a, b))
    }

    fn property_holds(&self, template: &str, policy: &str) -> Result<bool> {
        Ok((self.property_holds)(template, policy))
    }
}

/// An oracle failing every query, for exercising fatal-error paths.
pub struct FailingOracle;

impl PolicyOracle for FailingOracle {
    fn are_not_equivalent(&self, a: &str, b: &str) -> Result<bool> {
        Err(crate::OracleError::Undecided {
            query: format!("{a} != {b}"),
            reason: "failing test oracle".to_string(),
        })
    }

    fn property_holds(&self, template: &str, policy: &str) -> Result<bool> {
        Err(crate::OracleError::Undecided {
            query: format!("{template} / {policy}"),
            reason: "failing test oracle".to_string(),
        })
    }
}
