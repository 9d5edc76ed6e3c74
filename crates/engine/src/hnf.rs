//! The one-step head-normal-form relation.
//!
//! Successors of a parallel composition are, in this order: every
//! packet-processing step any element offers, then every
//! reconfiguration formed by one element's send meeting another
//! element's receive on the same channel with the same policy. Within
//! each pass, elements are visited left to right and alternatives in
//! syntactic order, so the successor list is deterministic.

use std::collections::HashMap;

use dynet_common::symbols::{build_network_policy, OR};
use dynet_trace::TransitionKind;

use crate::term::{SwitchState, Term};
use crate::{parser, EngineError, Successor};

/// A direct flow-table update branch of a switch configuration.
#[derive(Debug, Clone)]
pub struct SwitchUpdate {
    pub channel: String,
    pub slot: usize,
    pub policy: String,
    pub append: bool,
}

/// A request/response branch of a switch configuration. The response,
/// once received, is appended to the slot's flow table.
#[derive(Debug, Clone)]
pub struct SwitchRequest {
    pub request_channel: String,
    pub request_policy: String,
    pub response_channel: String,
    pub response_policy: String,
    pub slot: usize,
}

/// The static behavior of a big-switch element; its dynamic state
/// lives in the [`SwitchState`] term.
#[derive(Debug, Clone, Default)]
pub struct SwitchConfig {
    pub link: String,
    pub updates: Vec<SwitchUpdate>,
    pub requests: Vec<SwitchRequest>,
}

/// The module an engine instance is initialized against: recursion
/// definitions and switch configurations.
#[derive(Debug, Default)]
pub struct EngineEnv {
    defs: HashMap<String, Term>,
    switches: HashMap<String, SwitchConfig>,
}

impl EngineEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the recursion definition `name = src`.
    pub fn define(&mut self, name: &str, src: &str) -> crate::Result<()> {
        let term = parser::parse_term(src)?;
        self.defs.insert(name.to_string(), term);
        Ok(())
    }

    pub fn add_switch(&mut self, name: &str, config: SwitchConfig) {
        self.switches.insert(name.to_string(), config);
    }

    fn def(&self, name: &str) -> crate::Result<&Term> {
        self.defs
            .get(name)
            .ok_or_else(|| EngineError::UndefinedVariable(name.to_string()))
    }

    fn switch(&self, name: &str) -> crate::Result<&SwitchConfig> {
        self.switches
            .get(name)
            .ok_or_else(|| EngineError::UnknownSwitchConfig(name.to_string()))
    }
}

/// A head action an element can take, with its continuation.
enum Action {
    Proc(String),
    Send { channel: String, policy: String },
    Recv { channel: String, policy: String },
}

type HeadActions = Vec<(Action, Term)>;

fn head_actions(term: &Term, env: &EngineEnv, path: &mut Vec<String>) -> crate::Result<HeadActions> {
    match term {
        Term::Bot => Ok(Vec::new()),
        Term::Policy(p) => Ok(vec![(Action::Proc(p.clone()), Term::Bot)]),
        Term::Send { channel, policy } => Ok(vec![(
            Action::Send {
                channel: channel.clone(),
                policy: policy.clone(),
            },
            Term::Bot,
        )]),
        Term::Recv { channel, policy } => Ok(vec![(
            Action::Recv {
                channel: channel.clone(),
                policy: policy.clone(),
            },
            Term::Bot,
        )]),
        Term::Seq(first, rest) => {
            let acts = head_actions(first, env, path)?;
            Ok(acts
                .into_iter()
                .map(|(action, cont)| {
                    let cont = match cont {
                        Term::Bot => (**rest).clone(),
                        cont => Term::seq(cont, (**rest).clone()),
                    };
                    (action, cont)
                })
                .collect())
        }
        Term::Choice(alts) => {
            let mut acts = Vec::new();
            for alt in alts {
                acts.extend(head_actions(alt, env, path)?);
            }
            Ok(acts)
        }
        Term::Var(name) => {
            if path.iter().any(|seen| seen == name) {
                return Err(EngineError::UnguardedRecursion(name.clone()));
            }
            let def = env.def(name)?;
            path.push(name.clone());
            let acts = head_actions(def, env, path)?;
            path.pop();
            Ok(acts)
        }
        Term::Switch(state) => switch_actions(state, env),
    }
}

fn switch_actions(state: &SwitchState, env: &EngineEnv) -> crate::Result<HeadActions> {
    let config = env.switch(&state.config)?;
    let check_slot = |slot: usize| {
        if slot >= state.fts.len() {
            return Err(EngineError::SlotOutOfRange {
                config: state.config.clone(),
                slot,
                fts: state.fts.len(),
            });
        }
        Ok(())
    };

    let mut acts: HeadActions = vec![(
        Action::Proc(build_network_policy(&state.fts, &config.link)),
        Term::Switch(state.clone()),
    )];

    for update in &config.updates {
        check_slot(update.slot)?;
        let mut fts = state.fts.clone();
        fts[update.slot] = if update.append {
            format!("{} {OR} {}", fts[update.slot], update.policy)
        } else {
            update.policy.clone()
        };
        acts.push((
            Action::Recv {
                channel: update.channel.clone(),
                policy: update.policy.clone(),
            },
            Term::Switch(SwitchState {
                config: state.config.clone(),
                fts,
                pending: state.pending,
            }),
        ));
    }

    match state.pending {
        None => {
            for (i, request) in config.requests.iter().enumerate() {
                check_slot(request.slot)?;
                acts.push((
                    Action::Send {
                        channel: request.request_channel.clone(),
                        policy: request.request_policy.clone(),
                    },
                    Term::Switch(SwitchState {
                        config: state.config.clone(),
                        fts: state.fts.clone(),
                        pending: Some(i),
                    }),
                ));
            }
        }
        Some(index) => {
            let request =
                config
                    .requests
                    .get(index)
                    .ok_or_else(|| EngineError::UnknownRequest {
                        config: state.config.clone(),
                        index,
                    })?;
            check_slot(request.slot)?;
            let mut fts = state.fts.clone();
            fts[request.slot] = format!("{} {OR} {}", fts[request.slot], request.response_policy);
            acts.push((
                Action::Recv {
                    channel: request.response_channel.clone(),
                    policy: request.response_policy.clone(),
                },
                Term::Switch(SwitchState {
                    config: state.config.clone(),
                    fts,
                    pending: None,
                }),
            ));
        }
    }

    Ok(acts)
}

/// All successors of the parallel composition `elements`.
pub fn successors(elements: &[Term], env: &EngineEnv) -> crate::Result<Vec<Successor>> {
    let mut all_actions = Vec::with_capacity(elements.len());
    for element in elements {
        let mut path = Vec::new();
        all_actions.push(head_actions(element, env, &mut path)?);
    }

    let mut out = Vec::new();
    for (i, acts) in all_actions.iter().enumerate() {
        for (action, cont) in acts {
            if let Action::Proc(policy) = action {
                out.push(Successor {
                    kind: TransitionKind::PktProc,
                    label: format!("proc('{policy}',{i})"),
                    expr: compose(elements, &[(i, cont)]),
                });
            }
        }
    }
    for (i, acts) in all_actions.iter().enumerate() {
        for (action, send_cont) in acts {
            let Action::Send { channel, policy } = action else {
                continue;
            };
            for (j, other) in all_actions.iter().enumerate() {
                if i == j {
                    continue;
                }
                for (other_action, recv_cont) in other {
                    let Action::Recv {
                        channel: recv_channel,
                        policy: recv_policy,
                    } = other_action
                    else {
                        continue;
                    };
                    if recv_channel == channel && recv_policy == policy {
                        out.push(Successor {
                            kind: TransitionKind::Rcfg,
                            label: format!("rcfg({channel}, '{policy}', {i}, {j})"),
                            expr: compose(elements, &[(i, send_cont), (j, recv_cont)]),
                        });
                    }
                }
            }
        }
    }
    Ok(out)
}

/// The printed composition with some elements replaced.
fn compose(elements: &[Term], replacements: &[(usize, &Term)]) -> String {
    let parts: Vec<String> = elements
        .iter()
        .enumerate()
        .map(|(k, element)| {
            replacements
                .iter()
                .find(|(i, _)| *i == k)
                .map(|(_, term)| term.to_string())
                .unwrap_or_else(|| element.to_string())
        })
        .collect();
    parts.join(" || ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with_switch() -> EngineEnv {
        let mut env = EngineEnv::new();
        env.add_switch(
            "BigSwitch",
            SwitchConfig {
                link: "one".to_string(),
                updates: vec![SwitchUpdate {
                    channel: "up1".to_string(),
                    slot: 0,
                    policy: "f1".to_string(),
                    append: false,
                }],
                requests: Vec::new(),
            },
        );
        env.define("CT1", "up1 ! \"f1\" ; CT1").unwrap();
        env
    }

    fn expand(env: &EngineEnv, expr: &str) -> Vec<Successor> {
        let elements = parser::parse_parallel(expr).unwrap();
        successors(&elements, env).unwrap()
    }

    #[test]
    fn switch_offers_a_policy_step_and_the_matched_update() {
        let env = env_with_switch();
        let succs = expand(&env, "sw(BigSwitch, [\"f0\"], none) || CT1");
        assert_eq!(succs.len(), 2);

        assert_eq!(succs[0].kind, TransitionKind::PktProc);
        assert_eq!(
            succs[0].label,
            "proc('((f0) . (one)) . ((f0) . (one))*',0)"
        );
        assert_eq!(succs[0].expr, "sw(BigSwitch, [\"f0\"], none) || CT1");

        assert_eq!(succs[1].kind, TransitionKind::Rcfg);
        assert_eq!(succs[1].label, "rcfg(up1, 'f1', 1, 0)");
        assert_eq!(succs[1].expr, "sw(BigSwitch, [\"f1\"], none) || CT1");
    }

    #[test]
    fn sends_without_matching_receives_are_silent() {
        let mut env = env_with_switch();
        env.define("CT2", "nochan ! \"f9\" ; CT2").unwrap();
        let succs = expand(&env, "sw(BigSwitch, [\"f0\"], none) || CT2");
        assert_eq!(succs.len(), 1);
        assert_eq!(succs[0].kind, TransitionKind::PktProc);
    }

    #[test]
    fn requested_updates_round_trip_through_wait_state() {
        let mut env = EngineEnv::new();
        env.add_switch(
            "BigSwitch",
            SwitchConfig {
                link: "one".to_string(),
                updates: Vec::new(),
                requests: vec![SwitchRequest {
                    request_channel: "req".to_string(),
                    request_policy: "f0".to_string(),
                    response_channel: "resp".to_string(),
                    response_policy: "f2".to_string(),
                    slot: 0,
                }],
            },
        );
        env.define("CT1", "req ? \"f0\" ; (resp ! \"f2\" ; CT1)")
            .unwrap();

        let succs = expand(&env, "sw(BigSwitch, [\"f0\"], none) || CT1");
        let request = succs
            .iter()
            .find(|s| s.kind == TransitionKind::Rcfg)
            .unwrap();
        assert_eq!(request.label, "rcfg(req, 'f0', 0, 1)");
        assert_eq!(
            request.expr,
            "sw(BigSwitch, [\"f0\"], wait(0)) || resp ! \"f2\" ; CT1"
        );

        let succs = expand(&env, &request.expr);
        let response = succs
            .iter()
            .find(|s| s.kind == TransitionKind::Rcfg)
            .unwrap();
        assert_eq!(response.label, "rcfg(resp, 'f2', 1, 0)");
        assert_eq!(response.expr, "sw(BigSwitch, [\"f0 + f2\"], none) || CT1");
    }

    #[test]
    fn append_updates_extend_the_flow_table() {
        let mut env = EngineEnv::new();
        env.add_switch(
            "BigSwitch",
            SwitchConfig {
                link: "one".to_string(),
                updates: vec![SwitchUpdate {
                    channel: "up1".to_string(),
                    slot: 0,
                    policy: "f1".to_string(),
                    append: true,
                }],
                requests: Vec::new(),
            },
        );
        env.define("CT1", "up1 ! \"f1\" ; bot").unwrap();
        let succs = expand(&env, "sw(BigSwitch, [\"f0\"], none) || CT1");
        let rcfg = succs.iter().find(|s| s.kind == TransitionKind::Rcfg).unwrap();
        assert_eq!(rcfg.expr, "sw(BigSwitch, [\"f0 + f1\"], none) || bot");
    }

    #[test]
    fn unguarded_recursion_is_detected() {
        let mut env = EngineEnv::new();
        env.define("X", "X o+ bot").unwrap();
        let elements = parser::parse_parallel("X").unwrap();
        assert!(matches!(
            successors(&elements, &env),
            Err(EngineError::UnguardedRecursion(_))
        ));
    }

    #[test]
    fn undefined_variables_are_errors() {
        let env = EngineEnv::new();
        let elements = parser::parse_parallel("Nope").unwrap();
        assert!(matches!(
            successors(&elements, &env),
            Err(EngineError::UndefinedVariable(_))
        ));
    }
}
