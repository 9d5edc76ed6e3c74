//! The JSON input format describing a dynamic network and its
//! validation rules.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating a network model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("invalid model JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("a network must contain at least 1 switch and 1 controller")]
    MissingElements,

    #[error("'{0}' is not a valid name (letters, digits and inner dashes only)")]
    InvalidName(String),

    #[error("empty policy in {0}")]
    EmptyPolicy(String),

    #[error("policy in {0} must not contain quote characters")]
    QuotedPolicy(String),

    #[error(
        "channel '{channel}' cannot be re-used for switch '{switch}'; a channel \
         receiving updates for a switch cannot be re-used for any other switch"
    )]
    ReusedChannel { channel: String, switch: String },

    #[error("name '{0}' collides with a reserved process name")]
    ReservedName(String),

    #[error("recursive variable '{0}' used as controller is not defined")]
    UndeclaredController(String),

    #[error("safety properties cannot be specified for race kind {0}")]
    PropertyKindNotAllowed(dynet_common::RaceKind),

    #[error("the safety property for {0} does not mention the network-policy placeholder")]
    PropertyWithoutPlaceholder(dynet_common::RaceKind),
}

/// A direct flow-table update a switch accepts over a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DirectUpdate {
    pub channel: String,
    pub policy: String,
    /// When set the policy is appended to the flow table instead of
    /// replacing it.
    #[serde(default)]
    pub append: bool,
}

/// A request/response update exchange a switch initiates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestedUpdate {
    pub request_channel: String,
    pub request_policy: String,
    pub response_channel: String,
    pub response_policy: String,
}

/// One switch of the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Switch {
    #[serde(default)]
    pub initial_flow_table: Option<String>,
    #[serde(default)]
    pub direct_updates: Vec<DirectUpdate>,
    #[serde(default)]
    pub requested_updates: Vec<RequestedUpdate>,
}

/// A dynamic network: switches keyed by name (declaration order fixes
/// the inner-switch slots), a link policy, recursive process
/// definitions, and the subset of them acting as controller elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Network {
    pub switches: IndexMap<String, Switch>,
    #[serde(default)]
    pub links: Option<String>,
    /// Process definitions by name. Definitions not listed under
    /// `Controllers` are auxiliary continuations other processes can
    /// step into.
    pub recursive_variables: IndexMap<String, String>,
    /// Names of the definitions that run as elements, in element
    /// order.
    pub controllers: Vec<String>,
    #[serde(default)]
    pub other_channels: Vec<String>,
}

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z](-?[A-Za-z0-9])*$").unwrap());

impl Network {
    /// Parses and validates a network from its JSON text.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let network: Self = serde_json::from_str(json)?;
        network.validate()?;
        Ok(network)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.switches.is_empty() || self.controllers.is_empty() {
            return Err(ModelError::MissingElements);
        }
        self.validate_names()?;
        self.validate_controllers_declared()?;
        self.validate_policies()?;
        self.validate_channel_uniqueness()
    }

    fn validate_names(&self) -> Result<(), ModelError> {
        let names = self
            .switches
            .keys()
            .chain(self.recursive_variables.keys())
            .chain(self.other_channels.iter())
            .chain(self.channels_of_switches());
        for name in names {
            if !NAME_RE.is_match(name) {
                return Err(ModelError::InvalidName(name.clone()));
            }
        }
        Ok(())
    }

    fn validate_controllers_declared(&self) -> Result<(), ModelError> {
        for name in &self.controllers {
            if !self.recursive_variables.contains_key(name) {
                return Err(ModelError::UndeclaredController(name.clone()));
            }
        }
        Ok(())
    }

    fn validate_policies(&self) -> Result<(), ModelError> {
        let mut policies: Vec<(String, &str)> = Vec::new();
        if let Some(links) = &self.links {
            policies.push(("Links".to_string(), links));
        }
        for (name, sw) in &self.switches {
            if let Some(ft) = &sw.initial_flow_table {
                policies.push((format!("switch '{name}' initial flow table"), ft));
            }
            for du in &sw.direct_updates {
                policies.push((format!("switch '{name}' direct update"), &du.policy));
            }
            for ru in &sw.requested_updates {
                policies.push((format!("switch '{name}' requested update"), &ru.request_policy));
                policies.push((format!("switch '{name}' requested update"), &ru.response_policy));
            }
        }
        for (place, policy) in policies {
            if policy.is_empty() {
                return Err(ModelError::EmptyPolicy(place));
            }
            if policy.contains('\'') || policy.contains('"') {
                return Err(ModelError::QuotedPolicy(place));
            }
        }
        for (name, expr) in &self.recursive_variables {
            if expr.is_empty() {
                return Err(ModelError::EmptyPolicy(format!("definition of '{name}'")));
            }
        }
        Ok(())
    }

    /// A channel receiving updates for one switch must not be re-used
    /// by any other switch; request channels are equally reserved.
    fn validate_channel_uniqueness(&self) -> Result<(), ModelError> {
        let mut seen: IndexMap<&str, &str> = IndexMap::new();
        for (name, sw) in &self.switches {
            let mut own: Vec<&str> = Vec::new();
            for du in &sw.direct_updates {
                own.push(&du.channel);
            }
            for ru in &sw.requested_updates {
                own.push(&ru.request_channel);
                own.push(&ru.response_channel);
            }
            for channel in own {
                if let Some(other) = seen.get(channel) {
                    if *other != name.as_str() {
                        return Err(ModelError::ReusedChannel {
                            channel: channel.to_string(),
                            switch: name.clone(),
                        });
                    }
                    continue;
                }
                seen.insert(channel, name);
            }
        }
        Ok(())
    }

    fn channels_of_switches(&self) -> impl Iterator<Item = &String> {
        self.switches.values().flat_map(|sw| {
            sw.direct_updates
                .iter()
                .map(|du| &du.channel)
                .chain(sw.requested_updates.iter().flat_map(|ru| {
                    [&ru.request_channel, &ru.response_channel]
                }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> &'static str {
        r#"{
            "Switches": {
                "S1": {
                    "InitialFlowTable": "pt = 1 . pt <- 2",
                    "DirectUpdates": [{"Channel": "up1", "Policy": "pt = 1 . pt <- 3"}],
                    "RequestedUpdates": []
                }
            },
            "Links": "one",
            "RecursiveVariables": {"CT1": "up1 ! \"pt = 1 . pt <- 3\" ; CT1"},
            "Controllers": ["CT1"]
        }"#
    }

    #[test]
    fn loads_a_minimal_network() {
        let net = Network::from_json(minimal()).unwrap();
        assert_eq!(net.switches.len(), 1);
        assert_eq!(net.controllers, vec!["CT1".to_string()]);
        assert_eq!(net.links.as_deref(), Some("one"));
    }

    #[test]
    fn rejects_missing_controllers() {
        let json = r#"{"Switches": {"S1": {}}, "RecursiveVariables": {}, "Controllers": []}"#;
        assert!(matches!(
            Network::from_json(json),
            Err(ModelError::MissingElements)
        ));
    }

    #[test]
    fn rejects_undeclared_controllers() {
        let json = r#"{
            "Switches": {"S1": {}},
            "RecursiveVariables": {"CT1": "bot"},
            "Controllers": ["CT2"]
        }"#;
        assert!(matches!(
            Network::from_json(json),
            Err(ModelError::UndeclaredController(_))
        ));
    }

    #[test]
    fn rejects_reused_channels_across_switches() {
        let json = r#"{
            "Switches": {
                "S1": {"DirectUpdates": [{"Channel": "up", "Policy": "p"}], "RequestedUpdates": []},
                "S2": {"DirectUpdates": [{"Channel": "up", "Policy": "q"}], "RequestedUpdates": []}
            },
            "RecursiveVariables": {"CT1": "bot"},
            "Controllers": ["CT1"]
        }"#;
        assert!(matches!(
            Network::from_json(json),
            Err(ModelError::ReusedChannel { .. })
        ));
    }

    #[test]
    fn allows_a_switch_to_reuse_its_own_channel() {
        let json = r#"{
            "Switches": {
                "S1": {"DirectUpdates": [
                    {"Channel": "up", "Policy": "p"},
                    {"Channel": "up", "Policy": "q"}
                ], "RequestedUpdates": []}
            },
            "RecursiveVariables": {"CT1": "bot"},
            "Controllers": ["CT1"]
        }"#;
        assert!(Network::from_json(json).is_ok());
    }

    #[test]
    fn rejects_bad_names() {
        let json = r#"{
            "Switches": {"S 1": {}},
            "RecursiveVariables": {"CT1": "bot"},
            "Controllers": ["CT1"]
        }"#;
        assert!(matches!(
            Network::from_json(json),
            Err(ModelError::InvalidName(_))
        ));
    }
}
