//! Race handlers.
//!
//! Candidates arrive as a pair of trace positions with incomparable
//! clocks. Dispatch is keyed by the ordered pair of transition
//! variants at those positions; the handlers registered for a key are
//! tried in declaration order until one declares the pair applicable.
//! Each handler validates structural prerequisites, reconstructs the
//! hypothetical network policies, and asks the oracle whether the
//! safety property tells the two orderings apart.

use std::collections::HashMap;

use dynet_common::symbols::{build_network_policy, ZERO};
use dynet_common::RaceKind;
use dynet_model::{ElementKind, ElementMetadata};
use dynet_oracle::PolicyOracle;
use dynet_trace::{TraceNode, Transition, TransitionKind};
use itertools::Itertools;
use tracing::debug;

use crate::race::{Race, RacingNode};
use crate::reconstruct::{
    element_is_active_in_between, element_is_rcfg_target_in_between, reconstruct_element_fts,
};
use crate::AnalyzerError;

/// A handler's verdict: whether the pair matched its prerequisites,
/// and if so whether it is a harmful race.
struct Outcome {
    applies: bool,
    race: Option<Race>,
}

impl Outcome {
    const NOT_APPLICABLE: Self = Self {
        applies: false,
        race: None,
    };

    fn applicable(race: Option<Race>) -> Self {
        Self {
            applies: true,
            race,
        }
    }
}

/// View of a reconfiguration transition at a trace position.
struct RcfgView<'t> {
    policy: &'t str,
    src: usize,
    dst: usize,
    channel: &'t str,
}

fn rcfg_at<'t>(trace: &'t [TraceNode], pos: usize) -> Option<RcfgView<'t>> {
    match &trace.get(pos)?.transition {
        Transition::Rcfg {
            policy,
            src_pos,
            dst_pos,
            channel,
        } => Some(RcfgView {
            policy,
            src: *src_pos,
            dst: *dst_pos,
            channel,
        }),
        _ => None,
    }
}

fn proc_at(trace: &[TraceNode], pos: usize) -> Option<(&str, usize)> {
    match &trace.get(pos)?.transition {
        Transition::PktProc { policy, sw_pos } => Some((policy, *sw_pos)),
        _ => None,
    }
}

type Handler<'a> =
    fn(&mut TransitionsChecker<'a>, &[TraceNode], usize, usize) -> crate::Result<Outcome>;

/// Classifies candidate transition pairs into race kinds.
pub struct TransitionsChecker<'a> {
    oracle: &'a dyn PolicyOracle,
    metadata: &'a [ElementMetadata],
    properties: &'a HashMap<RaceKind, String>,
    skipped_kinds: Vec<RaceKind>,
    skipped: HashMap<RaceKind, u64>,
    unexpected: HashMap<(TransitionKind, TransitionKind), u64>,
}

impl<'a> TransitionsChecker<'a> {
    pub fn new(
        oracle: &'a dyn PolicyOracle,
        metadata: &'a [ElementMetadata],
        properties: &'a HashMap<RaceKind, String>,
    ) -> Self {
        Self {
            oracle,
            metadata,
            properties,
            skipped_kinds: Vec::new(),
            skipped: HashMap::new(),
            unexpected: HashMap::new(),
        }
    }

    /// Additionally skip (but count) the given race kinds. `SW-SW` is
    /// skipped regardless.
    pub fn with_skipped(mut self, kinds: Vec<RaceKind>) -> Self {
        self.skipped_kinds = kinds;
        self
    }

    /// Classifies the candidate pair at the (position-ordered) trace
    /// positions `p1 < p2`. Returns the race if a handler found the
    /// pair applicable and harmful.
    pub fn check(
        &mut self,
        trace: &[TraceNode],
        p1: usize,
        p2: usize,
    ) -> crate::Result<Option<Race>> {
        let kinds = (
            trace[p1].transition.kind(),
            trace[p2].transition.kind(),
        );
        let handlers: Vec<Handler<'a>> = match kinds {
            (TransitionKind::PktProc, TransitionKind::PktProc) => vec![Self::check_sw_sw],
            (TransitionKind::Rcfg, TransitionKind::PktProc) => vec![Self::check_ct_sw],
            (TransitionKind::PktProc, TransitionKind::Rcfg) => vec![Self::check_sw_ct],
            (TransitionKind::Rcfg, TransitionKind::Rcfg) => {
                vec![Self::check_ct_sw_ct, Self::check_ct_ct_sw]
            }
            other => {
                debug!(?other, "race between unexpected transition kinds");
                *self.unexpected.entry(other).or_insert(0) += 1;
                return Ok(None);
            }
        };
        for handler in handlers {
            let outcome = handler(self, trace, p1, p2)?;
            if outcome.applies {
                return Ok(outcome.race);
            }
        }
        Ok(None)
    }

    /// Skipped-race counts as `<kind>: <n> times` lines, one per kind.
    pub fn skipped_summary(&self, prefix: &str) -> String {
        self.skipped
            .iter()
            .sorted_by_key(|(kind, _)| kind.as_str())
            .map(|(kind, count)| format!("{prefix}{kind}: {count} times"))
            .join("\n")
    }

    /// Counts of candidate pairs with no registered handler.
    pub fn unexpected_pairs(&self) -> &HashMap<(TransitionKind, TransitionKind), u64> {
        &self.unexpected
    }

    pub fn skipped_count(&self, kind: RaceKind) -> u64 {
        self.skipped.get(&kind).copied().unwrap_or(0)
    }

    fn element(&self, element: usize, pos: usize) -> crate::Result<&ElementMetadata> {
        self.metadata
            .get(element)
            .ok_or(AnalyzerError::ElementOutOfBounds {
                pos,
                element,
                elements: self.metadata.len(),
            })
    }

    fn count_if_skipped(&mut self, kind: RaceKind) -> bool {
        if kind == RaceKind::SwSw || self.skipped_kinds.contains(&kind) {
            *self.skipped.entry(kind).or_insert(0) += 1;
            return true;
        }
        false
    }

    fn template(&self, kind: RaceKind) -> crate::Result<&String> {
        self.properties
            .get(&kind)
            .ok_or(AnalyzerError::MissingProperty(kind))
    }

    /// Elements belonging to the component `parent_id`.
    fn component_elements(&self, parent_id: usize) -> impl Iterator<Item = usize> + '_ {
        self.metadata
            .iter()
            .enumerate()
            .filter(move |(_, md)| md.parent_id == parent_id)
            .map(|(i, _)| i)
    }

    fn component_active_in_between(
        &self,
        trace: &[TraceNode],
        p1: usize,
        p2: usize,
        parent_id: usize,
    ) -> crate::Result<bool> {
        for element in self.component_elements(parent_id) {
            if element_is_active_in_between(trace, p1, p2, element)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn component_rcfg_target_in_between(
        &self,
        trace: &[TraceNode],
        p1: usize,
        p2: usize,
        parent_id: usize,
    ) -> crate::Result<bool> {
        for element in self.component_elements(parent_id) {
            if element_is_rcfg_target_in_between(trace, p1, p2, element)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The network policy of the switch owning `target` if `policy`
    /// were installed over `channel` on top of the flow tables
    /// reconstructed at position `end`.
    fn reconstruct_with(
        &self,
        trace: &[TraceNode],
        end: usize,
        target: usize,
        channel: &str,
        policy: &str,
    ) -> crate::Result<String> {
        let mut fts = reconstruct_element_fts(trace, self.metadata, end, target)?;
        if fts.is_empty() {
            return Ok(ZERO.to_string());
        }
        let md = self.element(target, end)?;
        let slot = md
            .find_switch_index(channel)
            .ok_or_else(|| AnalyzerError::UnknownChannel(channel.to_string()))?;
        fts[slot] = policy.to_string();
        Ok(build_network_policy(&fts, &md.link))
    }

    /// Switch-switch candidates are counted and never classified.
    fn check_sw_sw(
        &mut self,
        _trace: &[TraceNode],
        _p1: usize,
        _p2: usize,
    ) -> crate::Result<Outcome> {
        *self.skipped.entry(RaceKind::SwSw).or_insert(0) += 1;
        Ok(Outcome::applicable(None))
    }

    fn check_ct_sw(
        &mut self,
        trace: &[TraceNode],
        p1: usize,
        p2: usize,
    ) -> crate::Result<Outcome> {
        self.ct_sw_core(trace, p1, p2)
    }

    /// The converse ordering of [`Self::check_ct_sw`]; racing nodes
    /// are reported in position order either way.
    fn check_sw_ct(
        &mut self,
        trace: &[TraceNode],
        p1: usize,
        p2: usize,
    ) -> crate::Result<Outcome> {
        self.ct_sw_core(trace, p2, p1)
    }

    /// A controller's reconfiguration races with a packet-processing
    /// step of the switch it targets.
    fn ct_sw_core(
        &mut self,
        trace: &[TraceNode],
        rcfg_pos: usize,
        proc_pos: usize,
    ) -> crate::Result<Outcome> {
        let Some(rcfg) = rcfg_at(trace, rcfg_pos) else {
            return Ok(Outcome::NOT_APPLICABLE);
        };
        let Some((proc_policy, sw_pos)) = proc_at(trace, proc_pos) else {
            return Ok(Outcome::NOT_APPLICABLE);
        };

        let target_parent = self.element(rcfg.dst, rcfg_pos)?.parent_id;
        let switch_parent = self.element(sw_pos, proc_pos)?.parent_id;
        if target_parent != switch_parent
            || self.element(rcfg.src, rcfg_pos)?.kind == ElementKind::Sw
        {
            return Ok(Outcome::NOT_APPLICABLE);
        }
        if self.component_active_in_between(trace, rcfg_pos, proc_pos, switch_parent)? {
            return Ok(Outcome::NOT_APPLICABLE);
        }
        if self.count_if_skipped(RaceKind::CtSw) {
            return Ok(Outcome::applicable(None));
        }

        let end = rcfg_pos.min(proc_pos);
        let reconstructed =
            self.reconstruct_with(trace, end, rcfg.dst, rcfg.channel, rcfg.policy)?;
        let template = self.template(RaceKind::CtSw)?;
        let after_rcfg = self.oracle.property_holds(template, &reconstructed)?;
        let current = self.oracle.property_holds(template, proc_policy)?;

        let race = (after_rcfg != current).then(|| {
            race_sorted(
                RaceKind::CtSw,
                vec![
                    RacingNode {
                        node_pos: rcfg_pos,
                        element_pos: rcfg.src,
                        net_policy: reconstructed.clone(),
                    },
                    RacingNode {
                        node_pos: proc_pos,
                        element_pos: sw_pos,
                        net_policy: proc_policy.to_string(),
                    },
                ],
            )
        });
        Ok(Outcome::applicable(race))
    }

    /// Two controllers reconfigure the same switch concurrently.
    fn check_ct_sw_ct(
        &mut self,
        trace: &[TraceNode],
        p1: usize,
        p2: usize,
    ) -> crate::Result<Outcome> {
        let (Some(r1), Some(r2)) = (rcfg_at(trace, p1), rcfg_at(trace, p2)) else {
            return Ok(Outcome::NOT_APPLICABLE);
        };

        let dst1 = self.element(r1.dst, p1)?;
        let dst2 = self.element(r2.dst, p2)?;
        let same_switch = dst1.parent_id == dst2.parent_id
            && dst1.kind == ElementKind::Sw
            && dst2.kind == ElementKind::Sw;
        let switch_parent = dst1.parent_id;
        if !same_switch
            || self.element(r1.src, p1)?.kind == ElementKind::Sw
            || self.element(r2.src, p2)?.kind == ElementKind::Sw
        {
            return Ok(Outcome::NOT_APPLICABLE);
        }
        if element_is_active_in_between(trace, p1, p2, r1.src)?
            || self.component_rcfg_target_in_between(trace, p1, p2, switch_parent)?
        {
            return Ok(Outcome::NOT_APPLICABLE);
        }
        if self.count_if_skipped(RaceKind::CtSwCt) {
            return Ok(Outcome::applicable(None));
        }

        let end = p1.min(p2);
        let net1 = self.reconstruct_with(trace, end, r1.dst, r1.channel, r1.policy)?;
        let net2 = self.reconstruct_with(trace, end, r2.dst, r2.channel, r2.policy)?;
        let template = self.template(RaceKind::CtSwCt)?;
        let holds1 = self.oracle.property_holds(template, &net1)?;
        let holds2 = self.oracle.property_holds(template, &net2)?;

        let race = (holds1 != holds2).then(|| {
            race_sorted(
                RaceKind::CtSwCt,
                vec![
                    RacingNode {
                        node_pos: p1,
                        element_pos: r1.src,
                        net_policy: net1.clone(),
                    },
                    RacingNode {
                        node_pos: p2,
                        element_pos: r2.src,
                        net_policy: net2.clone(),
                    },
                ],
            )
        });
        Ok(Outcome::applicable(race))
    }

    /// A controller updates another controller whose own
    /// reconfiguration of a switch is still in flight.
    fn check_ct_ct_sw(
        &mut self,
        trace: &[TraceNode],
        p1: usize,
        p2: usize,
    ) -> crate::Result<Outcome> {
        let (Some(r1), Some(r2)) = (rcfg_at(trace, p1), rcfg_at(trace, p2)) else {
            return Ok(Outcome::NOT_APPLICABLE);
        };

        let fits = |checker: &Self, ct: &RcfgView<'_>, sw: &RcfgView<'_>| -> crate::Result<bool> {
            Ok(checker.element(ct.src, p1)?.kind == ElementKind::Ct
                && checker.element(ct.dst, p1)?.kind == ElementKind::Ct
                && checker.element(sw.src, p2)?.kind == ElementKind::Ct
                && checker.element(sw.dst, p2)?.kind == ElementKind::Sw
                && checker.element(ct.dst, p1)?.parent_id
                    == checker.element(sw.src, p2)?.parent_id)
        };

        // Either transition may be the controller-to-controller one.
        let (ct_pos, sw_pos) = if fits(self, &r1, &r2)? {
            (p1, p2)
        } else if fits(self, &r2, &r1)? {
            (p2, p1)
        } else {
            return Ok(Outcome::NOT_APPLICABLE);
        };
        let (ct, sw) = match (rcfg_at(trace, ct_pos), rcfg_at(trace, sw_pos)) {
            (Some(ct), Some(sw)) => (ct, sw),
            _ => return Ok(Outcome::NOT_APPLICABLE),
        };

        let earlier = rcfg_at(trace, p1.min(p2)).map(|r| r.src);
        let switch_parent = self.element(sw.dst, sw_pos)?.parent_id;
        if let Some(earlier_src) = earlier {
            if element_is_active_in_between(trace, p1, p2, earlier_src)? {
                return Ok(Outcome::NOT_APPLICABLE);
            }
        }
        if self.component_rcfg_target_in_between(trace, p1, p2, switch_parent)? {
            return Ok(Outcome::NOT_APPLICABLE);
        }
        if self.count_if_skipped(RaceKind::CtCtSw) {
            return Ok(Outcome::applicable(None));
        }

        let end = p1.min(p2);
        // What the switch's controller installs if it fires before the
        // update, vs. after the update reaches it.
        let installed = self.reconstruct_with(trace, end, sw.dst, sw.channel, sw.policy)?;
        let updated = self.reconstruct_with(trace, end, sw.dst, sw.channel, ct.policy)?;
        let template = self.template(RaceKind::CtCtSw)?;
        let holds_installed = self.oracle.property_holds(template, &installed)?;
        let holds_updated = self.oracle.property_holds(template, &updated)?;

        let race = (holds_installed != holds_updated).then(|| {
            race_sorted(
                RaceKind::CtCtSw,
                vec![
                    RacingNode {
                        node_pos: ct_pos,
                        element_pos: ct.src,
                        net_policy: updated.clone(),
                    },
                    RacingNode {
                        node_pos: sw_pos,
                        element_pos: sw.src,
                        net_policy: installed.clone(),
                    },
                ],
            )
        });
        Ok(Outcome::applicable(race))
    }
}

/// A race with its racing nodes in trace-position order, regardless of
/// the order the handler discovered them in.
fn race_sorted(kind: RaceKind, mut racing: Vec<RacingNode>) -> Race {
    racing.sort_by_key(|r| r.node_pos);
    Race { kind, racing }
}
