//! Lowering of a validated [`Network`] into the pieces the rest of the
//! pipeline consumes: one element per component of the parallel
//! composition, its metadata, and the process terms the rewriting
//! engine unfolds.
//!
//! The network's switches are merged into a single big-switch element
//! (element 0) whose inner-switch slots are the declared switches in
//! declaration order; each controller becomes one further element. The
//! big switch is a stateful term carrying its flow tables, so the
//! engine's expansion-cache keys distinguish reconfigured states.

use std::sync::Arc;

use dynet_common::symbols::{ONE, ZERO};
use dynet_common::{StatsEntry, StatsSource};
use dynet_trace::PolicyRestorer;

use crate::interner::PolicyInterner;
use crate::json::{ModelError, Network};
use crate::metadata::{ElementKind, ElementMetadata};

/// Name under which the merged switch process is registered with the
/// engine.
pub const BIG_SWITCH_NAME: &str = "BigSwitch";

/// Names with a fixed meaning in the engine's expression language.
const RESERVED_NAMES: &[&str] = &["bot", "sw", "none", "wait", "repl", "app", BIG_SWITCH_NAME];

/// A direct flow-table update of one inner-switch slot.
#[derive(Debug, Clone)]
pub struct UpdateSpec {
    pub channel: String,
    pub slot: usize,
    pub policy: String,
    pub append: bool,
}

/// A request/response exchange initiated by the big switch on behalf
/// of one inner-switch slot.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub request_channel: String,
    pub request_policy: String,
    pub response_channel: String,
    pub response_policy: String,
    pub slot: usize,
}

/// The merged switch process: static behavior plus initial state.
/// Policies are interned.
#[derive(Debug, Clone)]
pub struct SwitchSpec {
    pub name: String,
    pub link: String,
    pub initial_fts: Vec<String>,
    pub updates: Vec<UpdateSpec>,
    pub requests: Vec<RequestSpec>,
}

/// A loaded and lowered network model.
#[derive(Debug)]
pub struct NetworkModel {
    /// Per-element metadata, restored policies.
    pub metadata: Vec<ElementMetadata>,
    /// Engine term of each element, interned policies.
    pub element_terms: Vec<String>,
    /// Recursion definitions to register with the engine, interned
    /// policies.
    pub definitions: Vec<(String, String)>,
    /// The big-switch process description, interned policies.
    pub switch: SwitchSpec,
    interner: Arc<PolicyInterner>,
}

impl NetworkModel {
    /// Parses, validates, interns and lowers a network from its JSON
    /// text.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let mut network = Network::from_json(json)?;
        check_reserved_names(&network)?;
        let interner = PolicyInterner::intern_network(&mut network);
        Ok(Self::lower(&network, interner))
    }

    fn lower(network: &Network, interner: PolicyInterner) -> Self {
        let link = network.links.clone().unwrap_or_else(|| ONE.to_string());

        let mut initial_fts = Vec::new();
        let mut channels = Vec::new();
        let mut updates = Vec::new();
        let mut requests = Vec::new();
        for (slot, sw) in network.switches.values().enumerate() {
            initial_fts.push(sw.initial_flow_table.clone().unwrap_or_else(|| ZERO.to_string()));

            let mut slot_channels = Vec::new();
            for du in &sw.direct_updates {
                slot_channels.push(du.channel.clone());
                updates.push(UpdateSpec {
                    channel: du.channel.clone(),
                    slot,
                    policy: du.policy.clone(),
                    append: du.append,
                });
            }
            for ru in &sw.requested_updates {
                slot_channels.push(ru.request_channel.clone());
                slot_channels.push(ru.response_channel.clone());
                requests.push(RequestSpec {
                    request_channel: ru.request_channel.clone(),
                    request_policy: ru.request_policy.clone(),
                    response_channel: ru.response_channel.clone(),
                    response_policy: ru.response_policy.clone(),
                    slot,
                });
            }
            channels.push(slot_channels);
        }

        let switch = SwitchSpec {
            name: BIG_SWITCH_NAME.to_string(),
            link: link.clone(),
            initial_fts: initial_fts.clone(),
            updates,
            requests,
        };

        let mut metadata = vec![ElementMetadata {
            parent_id: 0,
            kind: ElementKind::Sw,
            name: Some("SW".to_string()),
            channels,
            initial_fts: initial_fts.iter().map(|ft| interner.restore_placeholders(ft)).collect(),
            link: interner.restore_placeholders(&link),
        }];
        let mut element_terms = vec![switch_term(&switch)];
        for (i, name) in network.controllers.iter().enumerate() {
            metadata.push(ElementMetadata::controller(1 + i, name.clone()));
            element_terms.push(name.clone());
        }
        let definitions = network
            .recursive_variables
            .iter()
            .map(|(name, expr)| (name.clone(), expr.clone()))
            .collect();

        Self {
            metadata,
            element_terms,
            definitions,
            switch,
            interner: Arc::new(interner),
        }
    }

    /// The parallel composition the generator starts from.
    pub fn start_expression(&self) -> String {
        self.element_terms.join(" || ")
    }

    pub fn element_count(&self) -> usize {
        self.metadata.len()
    }

    /// The placeholder table, for installing on the trace tree.
    pub fn restorer(&self) -> Arc<dyn PolicyRestorer> {
        self.interner.clone()
    }
}

impl StatsSource for NetworkModel {
    fn stats(&self) -> Vec<StatsEntry> {
        vec![
            StatsEntry::new("modelSwitches", "Network switches", self.switch.initial_fts.len()),
            StatsEntry::new("modelControllers", "Controllers", self.element_count() - 1),
        ]
    }
}

/// The engine term of the big-switch element in its initial state.
fn switch_term(switch: &SwitchSpec) -> String {
    let fts: Vec<String> = switch.initial_fts.iter().map(|ft| format!("\"{ft}\"")).collect();
    format!("sw({}, [{}], none)", switch.name, fts.join(", "))
}

fn check_reserved_names(network: &Network) -> Result<(), ModelError> {
    let reserved = |name: &String| RESERVED_NAMES.contains(&name.as_str());
    if let Some(name) = network.recursive_variables.keys().find(|n| reserved(n)) {
        return Err(ModelError::ReservedName(name.clone()));
    }
    if let Some(name) = network.switches.keys().find(|n| reserved(n)) {
        return Err(ModelError::ReservedName(name.clone()));
    }
    let channel = network
        .switches
        .values()
        .flat_map(|sw| {
            sw.direct_updates
                .iter()
                .map(|du| &du.channel)
                .chain(sw.requested_updates.iter().flat_map(|ru| {
                    [&ru.request_channel, &ru.response_channel]
                }))
        })
        .chain(network.other_channels.iter())
        .find(|ch| reserved(ch));
    match channel {
        Some(name) => Err(ModelError::ReservedName(name.clone())),
        None => Ok(()),
    }
}
