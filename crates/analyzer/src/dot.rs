//! DOT rendering of a harmful trace: one rectangular node per trace
//! position labeled with the element names and clock rows, edges
//! labeled with transitions, and the racing positions highlighted.

use std::collections::HashMap;

use dynet_model::ElementMetadata;
use dynet_trace::vector_clocks::fmt_row;
use dynet_trace::TraceNode;
use itertools::Itertools;

use crate::race::HarmfulRace;

const ERR_PRIMARY: &str = "#FF2400";
const ERR_SECONDARY: &str = "#FF9280";
const ACCENT: &str = "#F2F4FB";
const NODE_BG: &str = "#F2F4FB";
const EDGE: &str = "#000000";

const LABEL_WIDTH: usize = 50;
const LABEL_MAX_LINES: usize = 10;

/// Renders the race's trace as a DOT digraph.
pub fn trace_to_dot(race: &HarmfulRace, metadata: &[ElementMetadata]) -> String {
    let racing_elements: HashMap<usize, usize> = race
        .racing
        .iter()
        .map(|r| (r.node_pos, r.element_pos))
        .collect();
    let racing_policies: HashMap<usize, &str> = race
        .racing
        .iter()
        .map(|r| (r.node_pos, r.net_policy.as_str()))
        .collect();

    let mut lines = vec!["digraph g {".to_string()];
    for (i, node) in race.nodes.iter().enumerate() {
        let highlight = racing_elements.get(&i).copied();
        lines.push(format!(
            "n{i} [label=<{}>, shape=rectangle, style=filled, fillcolor=\"{}\"];",
            node_label(node, metadata, highlight),
            node_color(node, highlight.is_some()),
        ));
        if i == 0 {
            // the first node does not have a transition
            continue;
        }
        let mut label = split_into_lines(&node.transition.to_string(), LABEL_WIDTH, LABEL_MAX_LINES);
        let (color, penwidth) = match racing_policies.get(&i) {
            Some(policy) => {
                label.push_str("\\nnetworkPolicy: ");
                label.push_str(&split_into_lines(policy, LABEL_WIDTH, LABEL_MAX_LINES));
                (ERR_PRIMARY, "2.0")
            }
            None => (EDGE, "1.0"),
        };
        lines.push(format!(
            "n{} -> n{i} [label=\"{label}\", color=\"{color}\", penwidth={penwidth}];",
            i - 1
        ));
    }
    lines.push("}".to_string());
    lines.join("\n")
}

fn node_color(node: &TraceNode, racing: bool) -> &'static str {
    if racing {
        return ERR_PRIMARY;
    }
    if !node.vector_clocks.incomparable_pairs().is_empty() {
        return ERR_SECONDARY;
    }
    NODE_BG
}

/// `SW, CT1<br/>[[2, 1], [0, 1]]`, with the racing element's row
/// wrapped in the accent color.
fn node_label(
    node: &TraceNode,
    metadata: &[ElementMetadata],
    highlight: Option<usize>,
) -> String {
    let type_label = metadata.iter().map(ElementMetadata::label).join(", ");
    let vc_label = (0..node.vector_clocks.size())
        .map(|i| {
            let row = node
                .vector_clocks
                .row(i)
                .map(fmt_row)
                .unwrap_or_default();
            if highlight == Some(i) {
                format!("<font color=\"{ACCENT}\">{row}</font>")
            } else {
                row
            }
        })
        .join(", ");
    format!("{type_label}<br/>[{vc_label}]")
}

/// Chunks `s` into `width`-character lines joined by escaped newlines,
/// keeping at most `max_lines` lines.
fn split_into_lines(s: &str, width: usize, max_lines: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut lines: Vec<String> = chars
        .chunks(width)
        .map(|chunk| chunk.iter().collect())
        .collect();
    if lines.len() > max_lines {
        lines.truncate(max_lines);
        lines.push("...".to_string());
    }
    lines.join("\\n")
}
