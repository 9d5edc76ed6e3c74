//! Network-model loading: the JSON input format, its validation rules,
//! policy interning, safety properties, and the lowering of a network
//! into element metadata plus the process terms the rewriting engine
//! unfolds.

pub mod interner;
pub mod json;
pub mod lowering;
pub mod metadata;
pub mod property;

pub use interner::PolicyInterner;
pub use json::{DirectUpdate, ModelError, Network, RequestedUpdate, Switch};
pub use lowering::{NetworkModel, SwitchSpec, UpdateSpec, RequestSpec};
pub use metadata::{ElementKind, ElementMetadata};
pub use property::{SafetyProperties, SafetyProperty, PROPERTY_PLACEHOLDER};
