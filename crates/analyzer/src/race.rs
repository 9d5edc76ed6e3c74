//! Harmful-race records.

use dynet_common::RaceKind;
use dynet_trace::{fmt_trace, TraceNode};

/// One racing node of a classified race: its position in the trace,
/// the element whose clock is involved, and the network policy that
/// position would install or apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RacingNode {
    pub node_pos: usize,
    pub element_pos: usize,
    pub net_policy: String,
}

/// A classified race, before it is attached to its trace.
#[derive(Debug, Clone)]
pub struct Race {
    pub kind: RaceKind,
    pub racing: Vec<RacingNode>,
}

/// A harmful race together with the trace exhibiting it.
#[derive(Debug, Clone)]
pub struct HarmfulRace {
    pub kind: RaceKind,
    pub nodes: Vec<TraceNode>,
    pub racing: Vec<RacingNode>,
}

impl HarmfulRace {
    pub fn new(nodes: Vec<TraceNode>, race: Race) -> Self {
        Self {
            kind: race.kind,
            nodes,
            racing: race.racing,
        }
    }

    /// The racing-node positions, in report order.
    pub fn racing_positions(&self) -> Vec<usize> {
        self.racing.iter().map(|r| r.node_pos).collect()
    }

    /// The raw report written next to the DOT rendering: the trace's
    /// node list, the race kind, and one line per racing node.
    pub fn raw_report(&self) -> String {
        let mut lines = vec![fmt_trace(&self.nodes), self.kind.to_string()];
        for racing in &self.racing {
            lines.push(format!(
                "(trans: {}, el: {}, networkPolicy: \"{}\")",
                racing.node_pos, racing.element_pos, racing.net_policy
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use dynet_trace::{Transition, VectorClocks};

    use super::*;

    #[test]
    fn raw_report_lists_trace_kind_and_racing_nodes() {
        let nodes = vec![
            TraceNode::new(Transition::Empty, VectorClocks::new(2)),
            TraceNode::new(
                Transition::parse("proc('f0',0)").unwrap(),
                VectorClocks::from(vec![vec![1, 0], vec![0, 0]]),
            ),
        ];
        let race = HarmfulRace::new(
            nodes,
            Race {
                kind: RaceKind::CtSw,
                racing: vec![RacingNode {
                    node_pos: 1,
                    element_pos: 0,
                    net_policy: "((f0) . (one)) . ((f0) . (one))*".to_string(),
                }],
            },
        );

        let report = race.raw_report();
        let mut lines = report.lines();
        assert!(lines.next().unwrap().starts_with("[(\\\"\\\","));
        assert_eq!(lines.next().unwrap(), "CT->SW");
        assert_eq!(
            lines.next().unwrap(),
            "(trans: 1, el: 0, networkPolicy: \"((f0) . (one)) . ((f0) . (one))*\")"
        );
    }
}
