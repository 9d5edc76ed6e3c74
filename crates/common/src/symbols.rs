//! Textual symbols of the network-policy algebra and of the dynamic
//! layer on top of it.
//!
//! Policies are opaque strings built from these symbols; the tracer
//! never interprets them beyond concatenation. Deciding equivalence of
//! the resulting expressions is the oracle's job.

/// Field assignment inside a policy, e.g. `port <- 1`.
pub const ASSIGN: &str = "<-";
/// Field test, e.g. `port = 1`.
pub const EQUAL: &str = "=";
/// Equivalence of two policy expressions, in property formulas.
pub const EQUIV: &str = "==";
/// Non-equivalence of two policy expressions, in property formulas.
pub const NOT_EQUIV: &str = "!=";
/// Sequential composition of policies.
pub const AND: &str = ".";
/// Alternation of policies.
pub const OR: &str = "+";
/// Kleene closure.
pub const STAR: &str = "*";
/// The policy dropping every packet.
pub const ZERO: &str = "zero";
/// The policy forwarding every packet unchanged.
pub const ONE: &str = "one";

/// Sequencing in the dynamic layer (`step ; continuation`).
pub const SEQ: &str = ";";
/// Send half of a reconfiguration over a channel.
pub const SEND: &str = "!";
/// Receive half of a reconfiguration over a channel.
pub const RECV: &str = "?";
/// Non-deterministic choice between dynamic behaviors.
pub const OPLUS: &str = "o+";
/// The inert dynamic process.
pub const BOT: &str = "bot";

/// Token in safety-property formulas that stands for the network
/// policy under scrutiny; the oracle substitutes the reconstructed
/// policy for it.
pub const POLICY_PLACEHOLDER: &str = "#NP";

/// Builds the aggregated network policy of a switch from its
/// per-inner-switch flow tables and its link policy:
/// `(F1 + .. + Fk) . (L) . ((F1 + .. + Fk) . (L))*`, or [`ZERO`] when
/// the switch has no flow tables.
pub fn build_network_policy(fts: &[String], link: &str) -> String {
    if fts.is_empty() {
        return ZERO.to_string();
    }
    let fts_str = fts.join(&format!(" {OR} "));
    let one_step = format!("({fts_str}) {AND} ({link})");
    format!("({one_step}) {AND} ({one_step}){STAR}")
}
