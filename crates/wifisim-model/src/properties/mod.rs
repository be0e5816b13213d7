//! # wifisim Properties System
//!
//! Registry of every tunable a scenario file can set.
//!
//! ## Module Organization
//!
//! - [`types`] - Property definitions, scopes and value kinds
//! - [`definitions`] - All property constant definitions (easy to review in one place)
//! - [`registry`] - Property lookup and resolved/unresolved property sets
//!
//! ## Property Namespaces
//!
//! Properties are organized into namespaces using `/` as a separator:
//! - `phy/ed_threshold_dbm` - PHY energy detection threshold
//! - `traffic/interval_s` - Gap between frames sent by a traffic agent
//! - `simulation/seed` - Scenario seed
//!
//! A namespace maps onto one typed configuration struct; a resolved
//! namespace is handed to serde as a YAML mapping ([`ResolvedProperties::section`]).
//!
//! ## Property Resolution
//!
//! Properties are resolved in the following order (later overrides earlier):
//! 1. Built-in code defaults
//! 2. Defaults from YAML files (in order loaded)
//! 3. Explicit values on nodes (in order loaded)
//!
//! ## Example YAML
//!
//! ```yaml
//! defaults:
//!   phy:
//!     frequency_mhz: 5000
//!     channel_number: 36
//!
//! nodes:
//!   - name: ap
//!     phy:
//!       tx_power_start_dbm: 20.0
//! ```

pub mod definitions;
pub mod registry;
pub mod types;

pub use types::{
    NodeScope, PropertyDef, PropertyDefault, PropertyScope, ScopeMarker, SimulationScope, ValueKind,
};

pub use definitions::*;

pub use registry::{
    default_value, get_property_def, is_known_property, known_namespaces, properties_by_namespace,
    properties_by_scope, PropertySetError, ResolvedProperties, UnresolvedProperties, ALL_PROPERTIES,
};
