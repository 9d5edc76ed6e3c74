//! Terms of the dynamic-network process language.
//!
//! The printed form of a term is canonical: parsing it back yields the
//! same term, and structurally equal terms print identically. The
//! generator relies on this to use printed expressions as
//! expansion-cache keys.

use std::fmt;

/// The dynamic state of a big-switch element: which configuration it
/// runs, its current flow tables, and whether it awaits the response
/// of one of its requested updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchState {
    /// Name of the [`crate::SwitchConfig`] registered with the engine.
    pub config: String,
    /// Current flow table of each inner-switch slot.
    pub fts: Vec<String>,
    /// Index into the configuration's requests while a response is
    /// outstanding.
    pub pending: Option<usize>,
}

/// A process term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// The inert process.
    Bot,
    /// A packet-processing step under the given policy.
    Policy(String),
    /// Offer of a policy on a channel.
    Send { channel: String, policy: String },
    /// Acceptance of a policy from a channel.
    Recv { channel: String, policy: String },
    /// Sequencing: the left term's first action, then the rest.
    Seq(Box<Term>, Box<Term>),
    /// Non-deterministic choice between alternatives.
    Choice(Vec<Term>),
    /// Reference to a recursion definition.
    Var(String),
    /// A stateful big-switch element.
    Switch(SwitchState),
}

impl Term {
    pub fn seq(first: Self, rest: Self) -> Self {
        Self::Seq(Box::new(first), Box::new(rest))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_choice(self, f)
    }
}

fn fmt_choice(term: &Term, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match term {
        Term::Choice(alts) => {
            for (i, alt) in alts.iter().enumerate() {
                if i > 0 {
                    write!(f, " o+ ")?;
                }
                fmt_seq(alt, f)?;
            }
            Ok(())
        }
        _ => fmt_seq(term, f),
    }
}

fn fmt_seq(term: &Term, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match term {
        Term::Seq(first, rest) => {
            fmt_atom(first, f)?;
            write!(f, " ; ")?;
            fmt_seq(rest, f)
        }
        _ => fmt_atom(term, f),
    }
}

fn fmt_atom(term: &Term, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match term {
        Term::Bot => write!(f, "bot"),
        Term::Policy(p) => write!(f, "\"{p}\""),
        Term::Send { channel, policy } => write!(f, "{channel} ! \"{policy}\""),
        Term::Recv { channel, policy } => write!(f, "{channel} ? \"{policy}\""),
        Term::Var(name) => write!(f, "{name}"),
        Term::Switch(state) => {
            let fts: Vec<String> = state.fts.iter().map(|ft| format!("\"{ft}\"")).collect();
            write!(f, "sw({}, [{}], ", state.config, fts.join(", "))?;
            match state.pending {
                Some(i) => write!(f, "wait({i}))"),
                None => write!(f, "none)"),
            }
        }
        Term::Seq(..) | Term::Choice(..) => {
            write!(f, "(")?;
            fmt_choice(term, f)?;
            write!(f, ")")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_prefixes_without_parentheses() {
        let t = Term::seq(
            Term::Send {
                channel: "up1".to_string(),
                policy: "#0".to_string(),
            },
            Term::Var("CT1".to_string()),
        );
        assert_eq!(t.to_string(), "up1 ! \"#0\" ; CT1");
    }

    #[test]
    fn parenthesizes_nested_choice() {
        let t = Term::seq(
            Term::Choice(vec![Term::Policy("a".to_string()), Term::Bot]),
            Term::Var("X".to_string()),
        );
        assert_eq!(t.to_string(), "(\"a\" o+ bot) ; X");
    }

    #[test]
    fn prints_switch_states() {
        let idle = Term::Switch(SwitchState {
            config: "BigSwitch".to_string(),
            fts: vec!["#0".to_string(), "#1".to_string()],
            pending: None,
        });
        assert_eq!(idle.to_string(), "sw(BigSwitch, [\"#0\", \"#1\"], none)");

        let waiting = Term::Switch(SwitchState {
            config: "BigSwitch".to_string(),
            fts: vec!["#0".to_string()],
            pending: Some(1),
        });
        assert_eq!(waiting.to_string(), "sw(BigSwitch, [\"#0\"], wait(1))");
    }
}
