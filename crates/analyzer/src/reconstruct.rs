//! Replaying reconfigurations to reconstruct flow tables, and the
//! between-interval activity checks the race handlers rely on.

use dynet_model::ElementMetadata;
use dynet_trace::{TraceNode, Transition};

use crate::AnalyzerError;

/// The flow tables of the switch owning element `target` after
/// replaying every reconfiguration that targets it at positions
/// `< end`.
///
/// Each applied update replaces the slot matched by its channel;
/// append-marked updates are not distinguished here, so an appended
/// policy overwrites the slot like any other.
pub fn reconstruct_element_fts(
    trace: &[TraceNode],
    metadata: &[ElementMetadata],
    end: usize,
    target: usize,
) -> crate::Result<Vec<String>> {
    let target_md = metadata
        .get(target)
        .ok_or(AnalyzerError::ElementOutOfBounds {
            pos: end,
            element: target,
            elements: metadata.len(),
        })?;
    let mut fts = target_md.initial_fts.clone();
    for node in &trace[..end.min(trace.len())] {
        let Transition::Rcfg {
            policy,
            dst_pos,
            channel,
            ..
        } = &node.transition
        else {
            continue;
        };
        let Some(dst_md) = metadata.get(*dst_pos) else {
            continue;
        };
        if dst_md.parent_id != target_md.parent_id {
            continue;
        }
        let slot = target_md
            .find_switch_index(channel)
            .ok_or_else(|| AnalyzerError::UnknownChannel(channel.clone()))?;
        fts[slot] = policy.clone();
    }
    Ok(fts)
}

/// True if any strict-interior transition of `(p1, p2)` is fired by
/// `element` or targets it with a reconfiguration.
pub fn element_is_active_in_between(
    trace: &[TraceNode],
    p1: usize,
    p2: usize,
    element: usize,
) -> crate::Result<bool> {
    scan_between(trace, p1, p2, |transition| {
        transition.source() == Some(element) || transition.targets_element(element)
    })
}

/// True if any strict-interior transition of `(p1, p2)` is a
/// reconfiguration whose destination is `element`.
pub fn element_is_rcfg_target_in_between(
    trace: &[TraceNode],
    p1: usize,
    p2: usize,
    element: usize,
) -> crate::Result<bool> {
    scan_between(trace, p1, p2, |transition| {
        transition.targets_element(element)
    })
}

fn scan_between(
    trace: &[TraceNode],
    p1: usize,
    p2: usize,
    pred: impl Fn(&Transition) -> bool,
) -> crate::Result<bool> {
    if p1 >= trace.len() || p2 >= trace.len() {
        return Err(AnalyzerError::PositionOutOfBounds(p1, p2));
    }
    let (lo, hi) = if p1 <= p2 { (p1, p2) } else { (p2, p1) };
    Ok(trace[lo + 1..hi]
        .iter()
        .any(|node| pred(&node.transition)))
}
