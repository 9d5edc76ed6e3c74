//! The global expansion cache.
//!
//! The same `(expression, previous-transition-kind)` key can appear in
//! thousands of frontier entries; caching its successor list globally
//! (stable across layers and runs) keeps the engine workload
//! proportional to the number of distinct reachable configurations
//! rather than to the tree size.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dynet_engine::Successor;
use dynet_trace::TransitionKind;

/// Hit/miss counters of one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<(String, TransitionKind), Arc<Vec<Successor>>>,
    stats: CacheStats,
}

/// Successor lists keyed by `(expression, previous-transition-kind)`.
/// Concurrent readers and single-writer inserts behind one coarse
/// lock; the hot path is the pre-coalesced probe, not contention.
#[derive(Debug, Default)]
pub struct ExpansionCache {
    inner: Mutex<CacheInner>,
}

impl ExpansionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks the key up, counting a hit or a miss.
    pub fn probe(&self, expr: &str, prev_kind: TransitionKind) -> Option<Arc<Vec<Successor>>> {
        let mut inner = self.inner.lock().expect("expansion cache poisoned");
        let cached = inner.map.get(&(expr.to_string(), prev_kind)).cloned();
        match cached {
            Some(successors) => {
                inner.stats.hits += 1;
                Some(successors)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Records the successors of a key, keeping any existing entry,
    /// and returns the cached list.
    pub fn insert(
        &self,
        expr: String,
        prev_kind: TransitionKind,
        successors: Vec<Successor>,
    ) -> Arc<Vec<Successor>> {
        let mut inner = self.inner.lock().expect("expansion cache poisoned");
        inner
            .map
            .entry((expr, prev_kind))
            .or_insert_with(|| Arc::new(successors))
            .clone()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().expect("expansion cache poisoned").stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn succ() -> Successor {
        Successor {
            kind: TransitionKind::PktProc,
            label: "proc('p',0)".to_string(),
            expr: "bot".to_string(),
        }
    }

    #[test]
    fn probe_counts_hits_and_misses() {
        let cache = ExpansionCache::new();
        assert!(cache.probe("a", TransitionKind::Empty).is_none());
        cache.insert("a".to_string(), TransitionKind::Empty, vec![succ()]);
        assert_eq!(
            cache.probe("a", TransitionKind::Empty).unwrap().len(),
            1
        );
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn keys_distinguish_the_previous_transition_kind() {
        let cache = ExpansionCache::new();
        cache.insert("a".to_string(), TransitionKind::PktProc, vec![succ()]);
        assert!(cache.probe("a", TransitionKind::Rcfg).is_none());
        assert!(cache.probe("a", TransitionKind::PktProc).is_some());
    }

    #[test]
    fn insert_keeps_the_first_entry() {
        let cache = ExpansionCache::new();
        cache.insert("a".to_string(), TransitionKind::Empty, vec![succ()]);
        let kept = cache.insert("a".to_string(), TransitionKind::Empty, Vec::new());
        assert_eq!(kept.len(), 1);
    }
}
