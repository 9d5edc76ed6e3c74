//! Memoizing oracle wrapper.
//!
//! Both operations are cached by their input tuple in a per-operation
//! map. The state sits behind one coarse mutex: lookups vastly
//! outnumber inserts and each miss already pays for an external
//! decision, so finer locking buys nothing.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dynet_common::{StatsEntry, StatsSource};

use crate::{PolicyOracle, Result};

#[derive(Debug, Default)]
struct MemoState {
    not_equivalent: HashMap<(String, String), bool>,
    property_holds: HashMap<(String, String), bool>,
    hits: u64,
    misses: u64,
    exec_time: Duration,
}

/// Caches the decisions of an inner [`PolicyOracle`] and tracks
/// hit/miss counts and the time spent in the inner oracle.
pub struct MemoizedOracle {
    inner: Box<dyn PolicyOracle>,
    state: Mutex<MemoState>,
}

impl MemoizedOracle {
    pub fn new(inner: Box<dyn PolicyOracle>) -> Self {
        Self {
            inner,
            state: Mutex::new(MemoState::default()),
        }
    }

    fn cached(
        &self,
        which: fn(&mut MemoState) -> &mut HashMap<(String, String), bool>,
        key: (&str, &str),
        compute: impl FnOnce() -> Result<bool>,
    ) -> Result<bool> {
        {
            let mut state = self.state.lock().expect("oracle cache poisoned");
            let cached = which(&mut state)
                .get(&(key.0.to_string(), key.1.to_string()))
                .copied();
            if let Some(verdict) = cached {
                state.hits += 1;
                return Ok(verdict);
            }
        }

        let start = Instant::now();
        let verdict = compute()?;
        let elapsed = start.elapsed();

        let mut state = self.state.lock().expect("oracle cache poisoned");
        state.misses += 1;
        state.exec_time += elapsed;
        which(&mut state).insert((key.0.to_string(), key.1.to_string()), verdict);
        Ok(verdict)
    }

    pub fn cache_hits(&self) -> u64 {
        self.state.lock().expect("oracle cache poisoned").hits
    }

    pub fn cache_misses(&self) -> u64 {
        self.state.lock().expect("oracle cache poisoned").misses
    }

    /// Total time spent inside the wrapped oracle.
    pub fn exec_time(&self) -> Duration {
        self.state.lock().expect("oracle cache poisoned").exec_time
    }
}

impl PolicyOracle for MemoizedOracle {
    fn are_not_equivalent(&self, a: &str, b: &str) -> Result<bool> {
        self.cached(
            |state| &mut state.not_equivalent,
            (a, b),
            || self.inner.are_not_equivalent(a, b),
        )
    }

    fn property_holds(&self, template: &str, policy: &str) -> Result<bool> {
        self.cached(
            |state| &mut state.property_holds,
            (template, policy),
            || self.inner.property_holds(template, policy),
        )
    }
}

impl StatsSource for MemoizedOracle {
    fn stats(&self) -> Vec<StatsEntry> {
        let state = self.state.lock().expect("oracle cache poisoned");
        vec![
            StatsEntry::new("oracleExecTime", "Oracle execution time", state.exec_time.as_secs_f64()),
            StatsEntry::new("oracleCacheHits", "Oracle cache hits", state.hits),
            StatsEntry::new("oracleCacheMisses", "Oracle cache misses", state.misses),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::testing::FnOracle;

    #[test]
    fn repeated_queries_hit_the_cache() {
        let calls = Arc::new(AtomicU64::new(0));
        let counted = calls.clone();
        let oracle = MemoizedOracle::new(Box::new(FnOracle::new(
            move |a, b| {
                counted.fetch_add(1, Ordering::Relaxed);
                a != b
            },
            |_, _| true,
        )));

        assert!(oracle.are_not_equivalent("a", "b").unwrap());
        assert!(oracle.are_not_equivalent("a", "b").unwrap());
        assert!(!oracle.are_not_equivalent("a", "a").unwrap());

        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert_eq!(oracle.cache_hits(), 1);
        assert_eq!(oracle.cache_misses(), 2);
    }

    #[test]
    fn operations_have_separate_caches() {
        let oracle = MemoizedOracle::new(Box::new(FnOracle::new(|_, _| true, |_, _| false)));
        assert!(oracle.are_not_equivalent("x", "y").unwrap());
        assert!(!oracle.property_holds("x", "y").unwrap());
        assert_eq!(oracle.cache_misses(), 2);
        assert_eq!(oracle.cache_hits(), 0);
    }
}
