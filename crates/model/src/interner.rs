//! Policy interning.
//!
//! Long policy strings are replaced by short `#<i>` placeholders before
//! the network is handed to the rewriting engine, keeping expressions
//! (and expansion-cache keys) small. The trace tree substitutes the
//! placeholders back on node insertion. This is a locality
//! optimization, not semantics.

use std::collections::HashMap;
use std::sync::LazyLock;

use dynet_trace::PolicyRestorer;
use regex::Regex;

use crate::json::Network;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\d+").unwrap());
static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""[^"]*""#).unwrap());

/// Table mapping interned policies to their `#<i>` placeholders and
/// back.
#[derive(Debug, Default)]
pub struct PolicyInterner {
    policies: Vec<String>,
    policy_to_id: HashMap<String, usize>,
}

impl PolicyInterner {
    /// Replaces every policy literal in `network` with a placeholder,
    /// returning the table that can restore them.
    pub fn intern_network(network: &mut Network) -> Self {
        let mut interner = Self::default();
        if let Some(links) = &mut network.links {
            *links = interner.intern(links);
        }
        for sw in network.switches.values_mut() {
            if let Some(ft) = &mut sw.initial_flow_table {
                *ft = interner.intern(ft);
            }
            for du in &mut sw.direct_updates {
                du.policy = interner.intern(&du.policy);
            }
            for ru in &mut sw.requested_updates {
                ru.request_policy = interner.intern(&ru.request_policy);
                ru.response_policy = interner.intern(&ru.response_policy);
            }
        }
        for expr in network.recursive_variables.values_mut() {
            *expr = interner.intern_quoted_literals(expr);
        }
        interner
    }

    /// The placeholder for `policy`, interning it on first sight.
    pub fn intern(&mut self, policy: &str) -> String {
        let id = match self.policy_to_id.get(policy).copied() {
            Some(id) => id,
            None => {
                let id = self.policies.len();
                self.policies.push(policy.to_string());
                self.policy_to_id.insert(policy.to_string(), id);
                id
            }
        };
        format!("#{id}")
    }

    /// Interns the contents of every `"..."` literal in a process
    /// expression, leaving the quotes in place.
    fn intern_quoted_literals(&mut self, expr: &str) -> String {
        QUOTED_RE
            .replace_all(expr, |caps: &regex::Captures<'_>| {
                let literal = &caps[0];
                let policy = &literal[1..literal.len() - 1];
                format!("\"{}\"", self.intern(policy))
            })
            .into_owned()
    }

    /// Substitutes every `#<i>` placeholder in `s` back to its policy.
    /// Unknown placeholder ids are left untouched.
    pub fn restore_placeholders(&self, s: &str) -> String {
        PLACEHOLDER_RE
            .replace_all(s, |caps: &regex::Captures<'_>| {
                let id: usize = match caps[0][1..].parse() {
                    Ok(id) => id,
                    Err(_) => return caps[0].to_string(),
                };
                match self.policies.get(id) {
                    Some(policy) => policy.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

impl PolicyRestorer for PolicyInterner {
    fn restore(&self, s: &str) -> String {
        self.restore_placeholders(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent_per_policy() {
        let mut interner = PolicyInterner::default();
        assert_eq!(interner.intern("pt = 1"), "#0");
        assert_eq!(interner.intern("pt = 2"), "#1");
        assert_eq!(interner.intern("pt = 1"), "#0");
    }

    #[test]
    fn restore_replaces_every_placeholder() {
        let mut interner = PolicyInterner::default();
        interner.intern("a");
        interner.intern("b + c");
        assert_eq!(interner.restore_placeholders("(#0) . (#1) o+ #0"), "(a) . (b + c) o+ a");
    }

    #[test]
    fn unknown_placeholders_survive() {
        let interner = PolicyInterner::default();
        assert_eq!(interner.restore_placeholders("#7"), "#7");
    }

    #[test]
    fn network_literals_are_interned_in_place() {
        let mut network = Network::from_json(
            r#"{
                "Switches": {
                    "S1": {
                        "InitialFlowTable": "f0",
                        "DirectUpdates": [{"Channel": "up1", "Policy": "f1"}],
                        "RequestedUpdates": []
                    }
                },
                "Links": "one",
                "RecursiveVariables": {"CT1": "up1 ! \"f1\" ; CT1"},
                "Controllers": ["CT1"]
            }"#,
        )
        .unwrap();

        let interner = PolicyInterner::intern_network(&mut network);
        assert_eq!(network.links.as_deref(), Some("#0"));
        let sw = &network.switches["S1"];
        assert_eq!(sw.initial_flow_table.as_deref(), Some("#1"));
        assert_eq!(sw.direct_updates[0].policy, "#2");
        assert_eq!(network.recursive_variables["CT1"], "up1 ! \"#2\" ; CT1");
        assert_eq!(interner.restore_placeholders("#2"), "f1");
    }
}
