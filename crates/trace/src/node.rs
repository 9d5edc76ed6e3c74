//! Trace nodes: a transition paired with the vector-clock matrix that
//! resulted from it, under a process-unique id.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::transition::{ParseError, Transition};
use crate::vector_clocks::VectorClocks;

/// Process-unique identifier of a trace node.
pub type NodeId = u64;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// One node of a trace: the transition that produced it and the clock
/// matrix after that transition.
#[derive(Debug, Clone)]
pub struct TraceNode {
    id: NodeId,
    pub transition: Transition,
    pub vector_clocks: VectorClocks,
    /// Ids of other nodes whose transitions race with this node's
    /// transition. Filled in by the analyzer only.
    racing_nodes: SmallVec<[NodeId; 2]>,
}

impl TraceNode {
    pub fn new(transition: Transition, vector_clocks: VectorClocks) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            transition,
            vector_clocks,
            racing_nodes: SmallVec::new(),
        }
    }

    /// The root node: empty transition over the zero matrix.
    pub fn root(elements: usize) -> Self {
        Self::new(Transition::Empty, VectorClocks::new(elements))
    }

    pub const fn id(&self) -> NodeId {
        self.id
    }

    pub fn add_racing_node(&mut self, other: NodeId) {
        if !self.racing_nodes.contains(&other) {
            self.racing_nodes.push(other);
        }
    }

    pub fn is_racing_with(&self, other: NodeId) -> bool {
        self.racing_nodes.contains(&other)
    }

    pub fn is_part_of_race(&self) -> bool {
        !self.racing_nodes.is_empty()
    }
}

impl fmt::Display for TraceNode {
    /// Serialized node form: `(\"<transition>\",<clock matrix>)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(\\\"{}\\\",{})", self.transition, self.vector_clocks)
    }
}

/// Renders a whole trace the way it is written to the traces file: the
/// bracketed, comma-separated list of serialized nodes.
pub fn fmt_trace(trace: &[TraceNode]) -> String {
    let nodes: Vec<String> = trace.iter().map(TraceNode::to_string).collect();
    format!("[{}]", nodes.join(", "))
}

/// Parses one traces-file line back into nodes. Inverse of
/// [`fmt_trace`]; parsed nodes get fresh ids.
pub fn parse_trace(line: &str) -> Result<Vec<TraceNode>, ParseError> {
    let line = line.trim();
    let inner = line
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| ParseError::InvalidTraceNode(line.to_string()))?;

    let mut nodes = Vec::new();
    let mut rest = inner.trim_start();
    while !rest.is_empty() {
        let (node, remainder) = parse_node(rest)?;
        nodes.push(node);
        rest = remainder
            .strip_prefix(',')
            .map(str::trim_start)
            .unwrap_or(remainder);
    }
    Ok(nodes)
}

/// Parses one `(\"<transition>\",<matrix>)` prefix of `s`, returning
/// the node and the unconsumed remainder.
fn parse_node(s: &str) -> Result<(TraceNode, &str), ParseError> {
    let err = || ParseError::InvalidTraceNode(s.to_string());

    let body = s.strip_prefix("(\\\"").ok_or_else(err)?;
    let trans_end = body.find("\\\",").ok_or_else(err)?;
    let transition = Transition::parse(&body[..trans_end])?;

    let matrix_str = &body[trans_end + 3..];
    let (rows, consumed) = parse_matrix(matrix_str).ok_or_else(err)?;
    let rest = matrix_str[consumed..].strip_prefix(')').ok_or_else(err)?;

    Ok((TraceNode::new(transition, VectorClocks::from(rows)), rest))
}

/// Parses a `[[..], [..]]` prefix, returning the rows and the number of
/// consumed bytes. Returns `None` on malformed input.
fn parse_matrix(s: &str) -> Option<(Vec<Vec<u64>>, usize)> {
    let mut rows = Vec::new();
    let mut chars = s.char_indices().peekable();
    match chars.next() {
        Some((_, '[')) => {}
        _ => return None,
    }
    loop {
        match chars.peek()? {
            (_, ']') => {
                let (i, _) = chars.next()?;
                return Some((rows, i + 1));
            }
            (_, '[') => {
                chars.next();
                let mut row = Vec::new();
                let mut num = String::new();
                loop {
                    let (_, c) = chars.next()?;
                    match c {
                        '0'..='9' => num.push(c),
                        ',' => {
                            row.push(num.parse().ok()?);
                            num.clear();
                        }
                        ']' => {
                            if !num.is_empty() {
                                row.push(num.parse().ok()?);
                            }
                            break;
                        }
                        ' ' => {}
                        _ => return None,
                    }
                }
                rows.push(row);
            }
            (_, ',') | (_, ' ') => {
                chars.next();
            }
            _ => return None,
        }
    }
}
