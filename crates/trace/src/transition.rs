//! Transitions labeling trace-tree edges.
//!
//! A transition is either a packet-processing step of one switch, a
//! reconfiguration carrying a policy from one element to another over a
//! named channel, or the empty placeholder used for the root node.
//! The textual forms are fixed:
//!
//! - `proc('<policy>',<swPos>)` — no spaces inside the parentheses
//! - `rcfg(<channel>, '<policy>', <srcPos>, <dstPos>)` — one space
//!   after each comma
//!
//! [`Transition::parse`] and the `Display` impl are exact inverses.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::vector_clocks::{VcError, VectorClocks};

/// Errors raised while parsing transition labels or serialized traces.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("'{0}' is not a valid packet processing transition")]
    InvalidPktProc(String),

    #[error("'{0}' is not a valid reconfiguration transition")]
    InvalidRcfg(String),

    #[error("reconfiguration source and destination must differ, got {0} twice")]
    SameEndpoints(usize),

    #[error("'{0}' is not a valid transition")]
    UnknownTransition(String),

    #[error("'{0}' is not a valid serialized trace node")]
    InvalidTraceNode(String),
}

/// The variant tag of a [`Transition`], used as part of expansion-cache
/// keys and race-handler dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Empty,
    PktProc,
    Rcfg,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "none"),
            Self::PktProc => write!(f, "proc"),
            Self::Rcfg => write!(f, "rcfg"),
        }
    }
}

/// A single step of the network model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Placeholder for the root node only.
    Empty,
    /// The switch at `sw_pos` processes a packet under `policy`.
    PktProc { policy: String, sw_pos: usize },
    /// Element `src_pos` transfers `policy` to element `dst_pos` over
    /// `channel`.
    Rcfg {
        policy: String,
        src_pos: usize,
        dst_pos: usize,
        channel: String,
    },
}

static PKT_PROC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^proc\('([^']*)',([0-9]+)\)$").unwrap());
static RCFG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^rcfg\(([^,]*), '([^']*)', ([0-9]+), ([0-9]+)\)$").unwrap());

impl Transition {
    /// Parses a transition from its canonical string form. The empty
    /// string parses to [`Transition::Empty`]; anything else must be a
    /// well-formed `proc(...)` or `rcfg(...)` label.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        if s.is_empty() {
            return Ok(Self::Empty);
        }
        if s.starts_with("proc") {
            let caps = PKT_PROC_RE
                .captures(s)
                .ok_or_else(|| ParseError::InvalidPktProc(s.to_string()))?;
            let sw_pos: usize = caps[2]
                .parse()
                .map_err(|_| ParseError::InvalidPktProc(s.to_string()))?;
            return Ok(Self::PktProc {
                policy: caps[1].to_string(),
                sw_pos,
            });
        }
        if s.starts_with("rcfg") {
            let caps = RCFG_RE
                .captures(s)
                .ok_or_else(|| ParseError::InvalidRcfg(s.to_string()))?;
            let src_pos: usize = caps[3]
                .parse()
                .map_err(|_| ParseError::InvalidRcfg(s.to_string()))?;
            let dst_pos: usize = caps[4]
                .parse()
                .map_err(|_| ParseError::InvalidRcfg(s.to_string()))?;
            if src_pos == dst_pos {
                return Err(ParseError::SameEndpoints(src_pos));
            }
            return Ok(Self::Rcfg {
                policy: caps[2].to_string(),
                src_pos,
                dst_pos,
                channel: caps[1].to_string(),
            });
        }
        Err(ParseError::UnknownTransition(s.to_string()))
    }

    /// The variant tag of this transition.
    pub const fn kind(&self) -> TransitionKind {
        match self {
            Self::Empty => TransitionKind::Empty,
            Self::PktProc { .. } => TransitionKind::PktProc,
            Self::Rcfg { .. } => TransitionKind::Rcfg,
        }
    }

    /// The policy carried by this transition (empty for [`Self::Empty`]).
    pub fn policy(&self) -> &str {
        match self {
            Self::Empty => "",
            Self::PktProc { policy, .. } | Self::Rcfg { policy, .. } => policy,
        }
    }

    /// Rewrites the carried policy in place.
    pub fn set_policy(&mut self, new_policy: String) {
        match self {
            Self::Empty => {}
            Self::PktProc { policy, .. } | Self::Rcfg { policy, .. } => *policy = new_policy,
        }
    }

    /// The element that fired this transition: the processing switch
    /// for packet processing, the reconfiguration source otherwise.
    pub const fn source(&self) -> Option<usize> {
        match self {
            Self::Empty => None,
            Self::PktProc { sw_pos, .. } => Some(*sw_pos),
            Self::Rcfg { src_pos, .. } => Some(*src_pos),
        }
    }

    /// True if `pos` is the destination of this reconfiguration.
    pub const fn targets_element(&self, pos: usize) -> bool {
        match self {
            Self::Rcfg { dst_pos, .. } => *dst_pos == pos,
            _ => false,
        }
    }

    /// The destination element of this reconfiguration, if it is one.
    pub const fn rcfg_destination(&self) -> Option<usize> {
        match self {
            Self::Rcfg { dst_pos, .. } => Some(*dst_pos),
            _ => None,
        }
    }

    /// True if applying this transition changes element `pos`'s clock.
    pub const fn modifies_vc_pos(&self, pos: usize) -> bool {
        match self {
            Self::Empty => false,
            Self::PktProc { sw_pos, .. } => *sw_pos == pos,
            Self::Rcfg {
                src_pos, dst_pos, ..
            } => *src_pos == pos || *dst_pos == pos,
        }
    }

    /// Applies this transition's clock update to `vcs`, returning the
    /// updated matrix. [`Self::Empty`] leaves the clocks unchanged.
    pub fn update_vc(&self, vcs: &VectorClocks) -> Result<VectorClocks, VcError> {
        match self {
            Self::Empty => Ok(vcs.clone()),
            Self::PktProc { sw_pos, .. } => vcs.increment(*sw_pos),
            Self::Rcfg {
                src_pos, dst_pos, ..
            } => vcs.transfer(*src_pos, *dst_pos),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::PktProc { policy, sw_pos } => write!(f, "proc('{policy}',{sw_pos})"),
            Self::Rcfg {
                policy,
                src_pos,
                dst_pos,
                channel,
            } => write!(f, "rcfg({channel}, '{policy}', {src_pos}, {dst_pos})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_packet_processing_label() {
        let t = Transition::parse("proc('f0 + f1',2)").unwrap();
        assert_eq!(
            t,
            Transition::PktProc {
                policy: "f0 + f1".to_string(),
                sw_pos: 2
            }
        );
    }

    #[test]
    fn parses_reconfiguration_label() {
        let t = Transition::parse("rcfg(up1, 'f1', 2, 0)").unwrap();
        assert_eq!(
            t,
            Transition::Rcfg {
                policy: "f1".to_string(),
                src_pos: 2,
                dst_pos: 0,
                channel: "up1".to_string(),
            }
        );
    }

    #[test]
    fn empty_label_is_the_empty_transition() {
        assert_eq!(Transition::parse("").unwrap(), Transition::Empty);
    }

    #[test]
    fn rejects_spaces_in_proc_label() {
        assert!(matches!(
            Transition::parse("proc('f0', 1)"),
            Err(ParseError::InvalidPktProc(_))
        ));
    }

    #[test]
    fn rejects_negative_positions() {
        assert!(Transition::parse("proc('f0',-1)").is_err());
        assert!(Transition::parse("rcfg(ch, 'f0', -1, 2)").is_err());
    }

    #[test]
    fn rejects_rcfg_with_equal_endpoints() {
        assert_eq!(
            Transition::parse("rcfg(ch, 'f0', 1, 1)"),
            Err(ParseError::SameEndpoints(1))
        );
    }

    #[test]
    fn rejects_unknown_labels() {
        assert!(matches!(
            Transition::parse("halt(1)"),
            Err(ParseError::UnknownTransition(_))
        ));
    }

    #[test]
    fn vc_positions_modified_by_each_variant() {
        let proc = Transition::parse("proc('f0',1)").unwrap();
        assert!(proc.modifies_vc_pos(1));
        assert!(!proc.modifies_vc_pos(0));

        let rcfg = Transition::parse("rcfg(ch, 'f0', 0, 2)").unwrap();
        assert!(rcfg.modifies_vc_pos(0));
        assert!(rcfg.modifies_vc_pos(2));
        assert!(!rcfg.modifies_vc_pos(1));

        assert!(!Transition::Empty.modifies_vc_pos(0));
    }

    #[test]
    fn pkt_proc_updates_only_own_clock() {
        let t = Transition::parse("proc('f0',0)").unwrap();
        let vc = t.update_vc(&VectorClocks::new(2)).unwrap();
        assert_eq!(vc, VectorClocks::from(vec![vec![1, 0], vec![0, 0]]));
    }

    #[test]
    fn rcfg_transfers_clocks() {
        let t = Transition::parse("rcfg(up1, 'f1', 1, 0)").unwrap();
        let base = VectorClocks::from(vec![vec![1, 0], vec![0, 0]]);
        let vc = t.update_vc(&base).unwrap();
        assert_eq!(vc, VectorClocks::from(vec![vec![2, 1], vec![0, 1]]));
    }

    #[test]
    fn out_of_range_position_is_an_error() {
        let t = Transition::parse("proc('f0',5)").unwrap();
        assert!(t.update_vc(&VectorClocks::new(2)).is_err());
    }

    proptest! {
        #[test]
        fn proc_round_trips(policy in "[a-z0-9 .+*()<-]{0,30}", sw in 0usize..64) {
            prop_assume!(!policy.contains('\''));
            let t = Transition::PktProc { policy, sw_pos: sw };
            prop_assert_eq!(Transition::parse(&t.to_string()).unwrap(), t);
        }

        #[test]
        fn rcfg_round_trips(
            policy in "[a-z0-9 .+*()<-]{0,30}",
            channel in "[a-zA-Z][a-zA-Z0-9]{0,8}",
            src in 0usize..64,
            dst in 0usize..64,
        ) {
            prop_assume!(src != dst);
            let t = Transition::Rcfg { policy, src_pos: src, dst_pos: dst, channel };
            prop_assert_eq!(Transition::parse(&t.to_string()).unwrap(), t);
        }
    }
}
