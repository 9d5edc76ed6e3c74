//! User-supplied safety properties.
//!
//! A property is an expression over the policy algebra containing the
//! `#NP` placeholder, plus the polarity the formula must have. Per race
//! kind, the property becomes an oracle template `<expr> != zero` (for
//! `MustBe: true`) or `<expr> == zero`; the analyzer substitutes the
//! reconstructed network policy for the placeholder through the
//! oracle's `property_holds` operation.

use std::collections::HashMap;

use dynet_common::symbols::{EQUIV, NOT_EQUIV, ZERO};
use dynet_common::RaceKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::json::ModelError;

pub use dynet_common::symbols::POLICY_PLACEHOLDER as PROPERTY_PLACEHOLDER;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SafetyProperty {
    pub expression: String,
    pub must_be: bool,
}

/// The per-race-kind safety properties of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SafetyProperties {
    pub properties: IndexMap<RaceKind, SafetyProperty>,
}

impl SafetyProperties {
    /// Parses and validates properties from their JSON text.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let props: Self = serde_json::from_str(json)?;
        props.validate()?;
        Ok(props)
    }

    fn validate(&self) -> Result<(), ModelError> {
        for (kind, prop) in &self.properties {
            if *kind == RaceKind::SwSw {
                return Err(ModelError::PropertyKindNotAllowed(*kind));
            }
            if prop.expression.is_empty() {
                return Err(ModelError::EmptyPolicy(format!("property for {kind}")));
            }
            if !prop.expression.contains(PROPERTY_PLACEHOLDER) {
                return Err(ModelError::PropertyWithoutPlaceholder(*kind));
            }
        }
        Ok(())
    }

    /// The oracle templates, one per configured race kind.
    pub fn templates(&self) -> HashMap<RaceKind, String> {
        self.properties
            .iter()
            .map(|(kind, prop)| {
                let op = if prop.must_be { NOT_EQUIV } else { EQUIV };
                (*kind, format!("{} {op} {ZERO}", prop.expression))
            })
            .collect()
    }
}

impl Default for SafetyProperties {
    /// The default property for every classifiable race kind: the
    /// network policy must keep forwarding some packet.
    fn default() -> Self {
        let mut properties = IndexMap::new();
        for kind in [RaceKind::CtSw, RaceKind::CtSwCt, RaceKind::CtCtSw] {
            properties.insert(
                kind,
                SafetyProperty {
                    expression: PROPERTY_PLACEHOLDER.to_string(),
                    must_be: true,
                },
            );
        }
        Self { properties }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_covers_the_classifiable_kinds() {
        let templates = SafetyProperties::default().templates();
        assert_eq!(templates.len(), 3);
        assert_eq!(templates[&RaceKind::CtSw], "#NP != zero");
    }

    #[test]
    fn negative_polarity_flips_the_template() {
        let props = SafetyProperties::from_json(
            r#"{"Properties": {"CT->SW": {"Expression": "(pt = 9) . #NP", "MustBe": false}}}"#,
        )
        .unwrap();
        assert_eq!(props.templates()[&RaceKind::CtSw], "(pt = 9) . #NP == zero");
    }

    #[test]
    fn rejects_sw_sw_properties() {
        let res = SafetyProperties::from_json(
            r##"{"Properties": {"SW-SW": {"Expression": "#NP", "MustBe": true}}}"##,
        );
        assert!(matches!(res, Err(ModelError::PropertyKindNotAllowed(_))));
    }

    #[test]
    fn rejects_properties_without_the_placeholder() {
        let res = SafetyProperties::from_json(
            r#"{"Properties": {"CT->SW": {"Expression": "pt = 1", "MustBe": true}}}"#,
        );
        assert!(matches!(
            res,
            Err(ModelError::PropertyWithoutPlaceholder(RaceKind::CtSw))
        ));
    }
}
