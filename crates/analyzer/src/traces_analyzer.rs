//! Whole-run analysis: walks every trace of the tree, aggregates the
//! harmful races, suppresses duplicates, and writes the race reports.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use dynet_common::{StatsEntry, StatsSource};
use dynet_model::ElementMetadata;
use dynet_trace::{TraceNode, TraceTree};
use tracing::{info, warn};

use crate::checker::TransitionsChecker;
use crate::dot::trace_to_dot;
use crate::race::HarmfulRace;
use crate::trace_analyzer::TraceAnalyzer;
use crate::AnalyzerError;

const RAW_HARMFUL_TRACE_FILE_NAME: &str = "harmful_trace_raw";
const HARMFUL_TRACE_FILE_NAME: &str = "harmful_trace";

/// Analyzes all traces of a tree and records the harmful races.
pub struct TracesAnalyzer {
    output_dir_raw: PathBuf,
    output_dir_dot: PathBuf,
    harmful_races: u64,
    exec_time: Duration,
}

impl TracesAnalyzer {
    pub fn new(output_dir_raw: impl Into<PathBuf>, output_dir_dot: impl Into<PathBuf>) -> Self {
        Self {
            output_dir_raw: output_dir_raw.into(),
            output_dir_dot: output_dir_dot.into(),
            harmful_races: 0,
            exec_time: Duration::ZERO,
        }
    }

    /// Analyzes every trace, marks racing nodes in the tree so traces
    /// sharing an already-identified race are skipped, deduplicates
    /// the findings, and writes one raw and one DOT report per race.
    ///
    /// An oracle failure aborts the run; a trace inconsistent with the
    /// metadata is logged and skipped while other traces continue.
    pub fn run<'a>(
        &mut self,
        tree: &mut TraceTree,
        metadata: &'a [ElementMetadata],
        checker: &mut TransitionsChecker<'a>,
    ) -> crate::Result<Vec<HarmfulRace>> {
        let start = Instant::now();

        let trace_lists: Vec<Vec<usize>> = tree.traces().collect();
        let mut harmful = Vec::new();
        for indices in trace_lists {
            let nodes = tree.trace_nodes(&indices);
            if has_existing_race(&nodes) {
                continue;
            }
            let mut analyzer = TraceAnalyzer::new(checker, metadata);
            match analyzer.analyze(&nodes) {
                Ok(None) => {}
                Ok(Some(race)) => {
                    let positions = race.racing_positions();
                    for (a, pos_a) in positions.iter().enumerate() {
                        for pos_b in &positions[a + 1..] {
                            tree.mark_racing_pair(indices[*pos_a], indices[*pos_b]);
                        }
                    }
                    harmful.push(race);
                }
                Err(AnalyzerError::Oracle(err)) => return Err(AnalyzerError::Oracle(err)),
                Err(err) => warn!(%err, "skipping trace inconsistent with the model"),
            }
        }

        let filtered = filter_harmful_races(harmful);
        self.write_reports(&filtered, metadata)?;
        self.harmful_races = filtered.len() as u64;

        let skipped = checker.skipped_summary("\t");
        if !skipped.is_empty() {
            info!("skipped races:\n{skipped}");
        }

        self.exec_time += start.elapsed();
        Ok(filtered)
    }

    fn write_reports(
        &self,
        races: &[HarmfulRace],
        metadata: &[ElementMetadata],
    ) -> crate::Result<()> {
        for (i, race) in races.iter().enumerate() {
            let raw_name = format!("{RAW_HARMFUL_TRACE_FILE_NAME}_{i}_{}.txt", race.kind);
            std::fs::write(self.output_dir_raw.join(raw_name), race.raw_report())?;

            let dot_name = format!("{HARMFUL_TRACE_FILE_NAME}_{i}_{}.gv", race.kind);
            std::fs::write(
                self.output_dir_dot.join(dot_name),
                trace_to_dot(race, metadata),
            )?;
        }
        Ok(())
    }
}

impl StatsSource for TracesAnalyzer {
    fn stats(&self) -> Vec<StatsEntry> {
        vec![
            StatsEntry::new("harmfulRaces", "Harmful races found", self.harmful_races),
            StatsEntry::new(
                "traceAnalyzerExecTime",
                "Trace analyzer execution time",
                self.exec_time.as_secs_f64(),
            ),
        ]
    }
}

/// True if the trace contains a node pair already marked as racing by
/// the analysis of an earlier trace.
fn has_existing_race(nodes: &[TraceNode]) -> bool {
    let racing: Vec<&TraceNode> = nodes.iter().filter(|n| n.is_part_of_race()).collect();
    for (a, node) in racing.iter().enumerate() {
        for other in &racing[a + 1..] {
            if node.is_racing_with(other.id()) {
                return true;
            }
        }
    }
    false
}

/// Deduplicates races by the string forms of their racing transitions;
/// of two duplicates, the one with the lexicographically earliest
/// racing positions is kept. Distinct reconstructions yielding the
/// same transition strings at the same positions still collapse.
fn filter_harmful_races(races: Vec<HarmfulRace>) -> Vec<HarmfulRace> {
    let mut kept: Vec<(Vec<String>, HarmfulRace)> = Vec::new();
    for race in races {
        let key: Vec<String> = race
            .racing
            .iter()
            .map(|r| race.nodes[r.node_pos].transition.to_string())
            .collect();
        match kept.iter().position(|(k, _)| *k == key) {
            Some(i) => {
                if race.racing_positions() < kept[i].1.racing_positions() {
                    kept[i].1 = race;
                }
            }
            None => kept.push((key, race)),
        }
    }
    kept.into_iter().map(|(_, race)| race).collect()
}

#[cfg(test)]
mod tests {
    use dynet_common::RaceKind;
    use dynet_trace::{Transition, VectorClocks};

    use super::*;
    use crate::race::{Race, RacingNode};

    fn node(label: &str) -> TraceNode {
        TraceNode::new(Transition::parse(label).unwrap(), VectorClocks::new(2))
    }

    fn race_with_positions(positions: (usize, usize)) -> HarmfulRace {
        let nodes = vec![
            node(""),
            node("proc('f0',0)"),
            node("rcfg(up1, 'f1', 1, 0)"),
            node("proc('f0',0)"),
        ];
        HarmfulRace::new(
            nodes,
            Race {
                kind: RaceKind::CtSw,
                racing: vec![
                    RacingNode {
                        node_pos: positions.0,
                        element_pos: 1,
                        net_policy: "netA".to_string(),
                    },
                    RacingNode {
                        node_pos: positions.1,
                        element_pos: 0,
                        net_policy: "netB".to_string(),
                    },
                ],
            },
        )
    }

    #[test]
    fn duplicate_races_collapse_to_the_earliest_positions() {
        // positions (2, 3) and (2, 1) carry the same transition
        // strings in this trace, so they are duplicates
        let filtered = filter_harmful_races(vec![
            race_with_positions((2, 3)),
            race_with_positions((2, 1)),
        ]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].racing_positions(), vec![2, 1]);
    }

    #[test]
    fn distinct_transition_tuples_are_kept() {
        let other = {
            let nodes = vec![node(""), node("proc('g9',0)"), node("rcfg(up1, 'g8', 1, 0)")];
            HarmfulRace::new(
                nodes,
                Race {
                    kind: RaceKind::CtSw,
                    racing: vec![
                        RacingNode {
                            node_pos: 1,
                            element_pos: 0,
                            net_policy: "x".to_string(),
                        },
                        RacingNode {
                            node_pos: 2,
                            element_pos: 1,
                            net_policy: "y".to_string(),
                        },
                    ],
                },
            )
        };
        let filtered = filter_harmful_races(vec![race_with_positions((1, 2)), other]);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn existing_races_are_detected_only_for_linked_pairs() {
        let mut nodes = vec![node(""), node("proc('f0',0)"), node("rcfg(up1, 'f1', 1, 0)")];
        assert!(!has_existing_race(&nodes));

        let id2 = nodes[2].id();
        let id1 = nodes[1].id();
        nodes[1].add_racing_node(id2);
        // one-directional marking is not a pair
        assert!(!has_existing_race(&nodes));
        nodes[2].add_racing_node(id1);
        assert!(has_existing_race(&nodes));
    }
}
