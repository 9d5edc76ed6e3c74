//! Per-trace analysis: validation, the racing-pair search over vector
//! clocks, and classification through the race handlers.

use dynet_model::{ElementKind, ElementMetadata};
use dynet_trace::vector_clocks::rows_incomparable;
use dynet_trace::{TraceNode, TransitionKind};

use crate::checker::TransitionsChecker;
use crate::race::HarmfulRace;
use crate::AnalyzerError;

/// Analyzes one trace at a time, reporting at most one harmful race
/// per trace.
pub struct TraceAnalyzer<'a, 'c> {
    checker: &'c mut TransitionsChecker<'a>,
    metadata: &'a [ElementMetadata],
}

impl<'a, 'c> TraceAnalyzer<'a, 'c> {
    pub fn new(
        checker: &'c mut TransitionsChecker<'a>,
        metadata: &'a [ElementMetadata],
    ) -> Self {
        Self { checker, metadata }
    }

    /// Finds the first candidate pair of concurrent transitions a race
    /// handler classifies as harmful, or `None` if the trace is free
    /// of harmful races.
    ///
    /// Does not account for policies that are appended to a flow
    /// table.
    pub fn analyze(&mut self, trace: &[TraceNode]) -> crate::Result<Option<HarmfulRace>> {
        self.validate(trace)?;

        let elements = self.metadata.len();
        // last_node[e]: the most recent position where element e
        // processed a packet (switches) or originated a
        // reconfiguration (controllers).
        let mut last_node: Vec<Option<usize>> = vec![None; elements];

        for (i, node) in trace.iter().enumerate().skip(1) {
            let Some(e1) = node.transition.source() else {
                return Err(AnalyzerError::MissingSource { pos: i });
            };
            let records = matches!(
                (self.metadata[e1].kind, node.transition.kind()),
                (ElementKind::Sw, TransitionKind::PktProc)
                    | (ElementKind::Ct, TransitionKind::Rcfg)
            );
            if !records {
                continue;
            }
            last_node[e1] = Some(i);

            for (e2, &last) in last_node.iter().enumerate() {
                if e2 == e1 {
                    continue;
                }
                let Some(j) = last else {
                    continue;
                };
                let vc1 = trace[i]
                    .vector_clocks
                    .row(e1)
                    .ok_or(AnalyzerError::ClockSizeMismatch { pos: i, elements })?;
                let vc2 = trace[j]
                    .vector_clocks
                    .row(e2)
                    .ok_or(AnalyzerError::ClockSizeMismatch { pos: j, elements })?;
                if !rows_incomparable(vc1, vc2, e1, e2) {
                    continue;
                }
                if let Some(race) = self.checker.check(trace, j, i)? {
                    return Ok(Some(HarmfulRace::new(trace.to_vec(), race)));
                }
            }
        }
        Ok(None)
    }

    /// Rejects traces inconsistent with the element metadata.
    fn validate(&self, trace: &[TraceNode]) -> crate::Result<()> {
        let elements = self.metadata.len();
        for (i, node) in trace.iter().enumerate() {
            if !node.vector_clocks.is_square(elements) {
                return Err(AnalyzerError::ClockSizeMismatch { pos: i, elements });
            }
            if i == 0 {
                continue;
            }
            let source = node
                .transition
                .source()
                .ok_or(AnalyzerError::MissingSource { pos: i })?;
            for element in [Some(source), node.transition.rcfg_destination()]
                .into_iter()
                .flatten()
            {
                if element >= elements {
                    return Err(AnalyzerError::ElementOutOfBounds {
                        pos: i,
                        element,
                        elements,
                    });
                }
            }
        }
        Ok(())
    }
}
