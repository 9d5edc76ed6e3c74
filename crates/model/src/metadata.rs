//! Per-element metadata derived once from the input model and never
//! mutated afterwards.

use std::fmt;

/// What an element of the parallel composition is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// A forwarding element with packet-policy tables.
    Sw,
    /// A reconfiguration agent.
    Ct,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sw => write!(f, "SW"),
            Self::Ct => write!(f, "CT"),
        }
    }
}

/// Immutable description of one element of the composition.
///
/// For switch elements, `channels[i]` lists every channel over which
/// inner switch `i` is reconfigured and `initial_fts[i]` is its initial
/// flow table; `link` is the policy composed with the flow tables to
/// form the aggregated network policy. Controller elements carry empty
/// lists.
#[derive(Debug, Clone)]
pub struct ElementMetadata {
    /// Id of the parent component. The two clock positions of a race
    /// candidate target the same switch iff their parent ids match.
    pub parent_id: usize,
    pub kind: ElementKind,
    pub name: Option<String>,
    pub channels: Vec<Vec<String>>,
    pub initial_fts: Vec<String>,
    pub link: String,
}

impl ElementMetadata {
    pub fn controller(parent_id: usize, name: impl Into<String>) -> Self {
        Self {
            parent_id,
            kind: ElementKind::Ct,
            name: Some(name.into()),
            channels: Vec::new(),
            initial_fts: Vec::new(),
            link: String::new(),
        }
    }

    /// The inner-switch slot reconfigured over `channel`, if any.
    pub fn find_switch_index(&self, channel: &str) -> Option<usize> {
        self.channels
            .iter()
            .position(|chs| chs.iter().any(|ch| ch == channel))
    }

    /// The element's display label: its name if it has one, otherwise
    /// its kind.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.kind.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_the_slot_owning_a_channel() {
        let md = ElementMetadata {
            parent_id: 0,
            kind: ElementKind::Sw,
            name: Some("SW".to_string()),
            channels: vec![
                vec!["up1".to_string()],
                vec!["req2".to_string(), "resp2".to_string()],
            ],
            initial_fts: vec!["f0".to_string(), "f1".to_string()],
            link: "one".to_string(),
        };
        assert_eq!(md.find_switch_index("up1"), Some(0));
        assert_eq!(md.find_switch_index("resp2"), Some(1));
        assert_eq!(md.find_switch_index("nope"), None);
    }

    #[test]
    fn controllers_have_no_slots() {
        let md = ElementMetadata::controller(2, "CT1");
        assert_eq!(md.find_switch_index("up1"), None);
        assert_eq!(md.label(), "CT1");
    }
}
