//! Property registry, lookup functions, and property set types.
//!
//! This module provides:
//! - [`ALL_PROPERTIES`] - Array of all registered property definitions
//! - Lookup functions for finding properties by name
//! - [`ResolvedProperties`] - A complete set of property values with defaults
//! - [`UnresolvedProperties`] - A partial set of properties from YAML parsing

use super::definitions::*;
use super::types::{PropertyDef, PropertyScope, ScopeMarker};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

// ============================================================================
// All Properties Array (for runtime lookup)
// ============================================================================

/// All registered property definitions (for runtime lookup).
pub const ALL_PROPERTIES: &[&PropertyDef] = &[
    // PHY
    &PHY_ED_THRESHOLD_DBM,
    &PHY_CCA_THRESHOLD_DBM,
    &PHY_TX_GAIN_DB,
    &PHY_RX_GAIN_DB,
    &PHY_TX_POWER_START_DBM,
    &PHY_TX_POWER_END_DBM,
    &PHY_TX_POWER_LEVELS,
    &PHY_NOISE_FIGURE_DB,
    &PHY_CHANNEL_SWITCH_DELAY_US,
    &PHY_FREQUENCY_MHZ,
    &PHY_CHANNEL_WIDTH_MHZ,
    &PHY_CHANNEL_NUMBER,
    &PHY_ACTIVE_CHANNELS,
    &PHY_PRIMARY_CHANNEL,
    &PHY_USE_NEW_MODEL,
    &PHY_CHECK_ADDRESS_AT_PHY,
    &PHY_USE_LUT_FOR_PER,
    &PHY_CODING,
    &PHY_TX_ANTENNAS,
    &PHY_RX_ANTENNAS,
    &PHY_SHORT_GUARD_INTERVAL,
    &PHY_LDPC,
    &PHY_STBC,
    &PHY_GREENFIELD,
    &PHY_CHANNEL_BONDING,
    &PHY_LUT_DIR,
    // Traffic
    &TRAFFIC_ENABLED,
    &TRAFFIC_STARTUP_S,
    &TRAFFIC_STARTUP_JITTER_S,
    &TRAFFIC_INTERVAL_S,
    &TRAFFIC_INTERVAL_JITTER_S,
    &TRAFFIC_MESSAGE_COUNT,
    &TRAFFIC_SHUTDOWN_S,
    &TRAFFIC_FRAME_SIZE,
    &TRAFFIC_DESTINATION,
    &TRAFFIC_MODE,
    &TRAFFIC_TX_POWER_LEVEL,
    &TRAFFIC_PREAMBLE,
    &TRAFFIC_AMPDU_SIZE,
    &TRAFFIC_DURATION_FIELD_US,
    &TRAFFIC_CHANNEL_SWITCH,
    // Simulation
    &SIMULATION_SEED,
    &SIMULATION_DURATION_S,
];

// ============================================================================
// Lookup Functions
// ============================================================================

/// Check if a property name is registered (including aliases).
pub fn is_known_property(name: &str) -> bool {
    ALL_PROPERTIES.iter().any(|p| p.matches(name))
}

/// Get a property definition by name (including aliases).
pub fn get_property_def(name: &str) -> Option<&'static PropertyDef> {
    ALL_PROPERTIES.iter().find(|p| p.matches(name)).copied()
}

/// Get all known namespaces.
pub fn known_namespaces() -> Vec<&'static str> {
    let mut namespaces: Vec<&'static str> = ALL_PROPERTIES.iter().filter_map(|p| p.namespace()).collect();
    namespaces.sort();
    namespaces.dedup();
    namespaces
}

/// Get all properties for a given scope.
pub fn properties_by_scope(scope: PropertyScope) -> impl Iterator<Item = &'static PropertyDef> {
    ALL_PROPERTIES.iter().filter(move |p| p.scope == scope).copied()
}

/// Get all properties in a given namespace.
pub fn properties_by_namespace(namespace: &str) -> impl Iterator<Item = &'static PropertyDef> + '_ {
    ALL_PROPERTIES
        .iter()
        .filter(move |p| p.namespace() == Some(namespace))
        .copied()
}

/// Get the default value for a property by name.
pub fn default_value(name: &str) -> Option<Value> {
    get_property_def(name).map(|p| p.default_value())
}

// ============================================================================
// Property Set Errors
// ============================================================================

/// Errors that can occur when manipulating a property set.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertySetError {
    /// Unknown property name.
    UnknownProperty(String),
    /// Property used in wrong scope.
    InvalidPropertyScope(String, PropertyScope),
    /// Type mismatch between expected and actual value.
    TypeMismatch {
        /// Property name.
        property: String,
        /// Expected type.
        expected: String,
        /// Actual type.
        actual: String,
    },
}

impl fmt::Display for PropertySetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertySetError::UnknownProperty(name) => write!(f, "Unknown property: {}", name),
            PropertySetError::InvalidPropertyScope(name, scope) => {
                write!(f, "Invalid scope for property {}: expected {}", name, scope)
            }
            PropertySetError::TypeMismatch {
                property,
                expected,
                actual,
            } => write!(
                f,
                "Type mismatch for property '{}': expected {}, got {}",
                property, expected, actual
            ),
        }
    }
}

impl std::error::Error for PropertySetError {}

/// Describe the type of a YAML value for error messages.
fn describe_value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "map",
        Value::Tagged(_) => "tagged value",
    }
}

/// Look up `name` and check it may hold `value` in scope `S`.
fn validate<S: ScopeMarker>(name: &str, value: &Value) -> Result<&'static PropertyDef, PropertySetError> {
    let def = get_property_def(name).ok_or_else(|| PropertySetError::UnknownProperty(name.to_string()))?;
    if def.scope != S::SCOPE {
        return Err(PropertySetError::InvalidPropertyScope(name.to_string(), def.scope));
    }
    if !def.accepts(value) {
        return Err(PropertySetError::TypeMismatch {
            property: def.name.to_string(),
            expected: if def.nullable {
                format!("{} or null", def.kind)
            } else {
                def.kind.to_string()
            },
            actual: describe_value_type(value).to_string(),
        });
    }
    Ok(def)
}

// ============================================================================
// Resolved Property Set
// ============================================================================

/// A set of resolved property values for one node or for the simulation.
///
/// The generic parameter `S` specifies the scope of properties that can
/// be stored.
#[derive(Debug, Clone)]
pub struct ResolvedProperties<S: ScopeMarker> {
    values: HashMap<&'static PropertyDef, Value>,
    _scope: PhantomData<S>,
}

impl<S: ScopeMarker> ResolvedProperties<S> {
    /// Create a new property set with all defaults.
    pub fn new() -> Self {
        let values = ALL_PROPERTIES
            .iter()
            .filter(|p| p.scope == S::SCOPE)
            .map(|p| (*p, p.default_value()))
            .collect();
        Self {
            values,
            _scope: PhantomData,
        }
    }

    /// Get the scope of this property set.
    pub fn scope(&self) -> PropertyScope {
        S::SCOPE
    }

    /// Set a property by name, checking scope and type.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), PropertySetError> {
        let def = validate::<S>(name, &value)?;
        self.values.insert(def, value);
        Ok(())
    }

    /// Current value of a property.
    pub fn get(&self, prop: &PropertyDef) -> Value {
        self.values.get(prop).cloned().unwrap_or_else(|| prop.default_value())
    }

    /// Apply unresolved properties to this resolved set.
    pub fn apply_unresolved(&mut self, unresolved: &UnresolvedProperties<S>) {
        for (prop, value) in &unresolved.values {
            self.values.insert(*prop, value.clone());
        }
    }

    /// All values of a namespace as a mapping keyed by bare key, ready to be
    /// deserialized into the namespace's struct.
    pub fn section(&self, namespace: &str) -> Mapping {
        let mut mapping = Mapping::new();
        for prop in properties_by_namespace(namespace) {
            mapping.insert(Value::String(prop.key().to_string()), self.get(prop));
        }
        mapping
    }
}

impl<S: ScopeMarker> Default for ResolvedProperties<S> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Unresolved Property Set
// ============================================================================

/// A set of unresolved (partial) property values parsed from YAML.
///
/// Unlike `ResolvedProperties`, this only contains properties that were
/// explicitly specified - it does not include defaults.
#[derive(Debug, Clone, Default)]
pub struct UnresolvedProperties<S: ScopeMarker> {
    values: HashMap<&'static PropertyDef, Value>,
    _scope: PhantomData<S>,
}

impl<S: ScopeMarker> UnresolvedProperties<S> {
    /// Create a new empty unresolved property set.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            _scope: PhantomData,
        }
    }

    /// Insert a property by full name or alias, checking scope and type.
    pub fn insert(&mut self, name: &str, value: Value) -> Result<(), PropertySetError> {
        let def = validate::<S>(name, &value)?;
        self.values.insert(def, value);
        Ok(())
    }

    /// Value given for a property, if any.
    pub fn get_raw(&self, prop: &PropertyDef) -> Option<&Value> {
        self.values.get(prop)
    }

    /// Check if a property was specified.
    pub fn contains(&self, prop: &PropertyDef) -> bool {
        self.values.contains_key(prop)
    }

    /// Number of properties specified.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was specified.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merge another unresolved property set into this one (other takes precedence).
    pub fn merge(&mut self, other: &UnresolvedProperties<S>) {
        for (k, v) in &other.values {
            self.values.insert(*k, v.clone());
        }
    }
}

// ============================================================================
// YAML Deserialization
// ============================================================================

impl<'de, S: ScopeMarker> Deserialize<'de> for UnresolvedProperties<S> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(UnresolvedPropertiesVisitor(PhantomData))
    }
}

struct UnresolvedPropertiesVisitor<S>(PhantomData<S>);

impl<'de, S: ScopeMarker> Visitor<'de> for UnresolvedPropertiesVisitor<S> {
    type Value = UnresolvedProperties<S>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match S::FLAT_NAMESPACE {
            Some(ns) => write!(formatter, "a map of {} properties", ns),
            None => formatter.write_str("a map of namespaces to property maps"),
        }
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(UnresolvedProperties::new())
    }

    fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let mut props = UnresolvedProperties::new();
        while let Some(key) = map.next_key::<String>()? {
            let value: Value = map.next_value()?;
            match S::FLAT_NAMESPACE {
                Some(ns) => {
                    props.insert(&format!("{}/{}", ns, key), value).map_err(de::Error::custom)?;
                }
                None => process_namespace(&mut props, &key, value).map_err(de::Error::custom)?,
            }
        }
        Ok(props)
    }
}

/// Insert every `key: value` of a namespace map.
fn process_namespace<S: ScopeMarker>(
    props: &mut UnresolvedProperties<S>,
    namespace: &str,
    value: Value,
) -> Result<(), PropertySetError> {
    let Value::Mapping(entries) = value else {
        return Err(PropertySetError::UnknownProperty(namespace.to_string()));
    };
    for (key, value) in entries {
        let key = match key {
            Value::String(s) => s,
            other => format!("{:?}", other),
        };
        props.insert(&format!("{}/{}", namespace, key), value)?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::super::types::{NodeScope, SimulationScope, ValueKind};
    use super::*;
    use wifisim_agents::TrafficConfig;
    use wifisim_phy::PhyConfig;

    #[test]
    fn test_names_unique_and_namespaced() {
        let mut names: Vec<_> = ALL_PROPERTIES.iter().map(|p| p.name).collect();
        assert!(names.iter().all(|n| n.contains('/')), "every property has a namespace");
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_PROPERTIES.len());
        assert_eq!(known_namespaces(), vec!["phy", "simulation", "traffic"]);
    }

    #[test]
    fn test_phy_defaults_match_config() {
        let props: ResolvedProperties<NodeScope> = ResolvedProperties::new();
        let section = Value::Mapping(props.section("phy"));
        let parsed: PhyConfig = serde_yaml::from_value(section).unwrap();
        assert_eq!(parsed, PhyConfig::default());

        let Value::Mapping(serialized) = serde_yaml::to_value(PhyConfig::default()).unwrap() else {
            panic!("PhyConfig serializes to a map");
        };
        assert_eq!(serialized.len(), properties_by_namespace("phy").count(), "every PhyConfig field is registered");
        for (key, value) in serialized {
            let name = format!("phy/{}", key.as_str().unwrap());
            assert_eq!(default_value(&name), Some(value), "default of {}", name);
        }
    }

    #[test]
    fn test_traffic_defaults_match_config() {
        let Value::Mapping(serialized) = serde_yaml::to_value(TrafficConfig::default()).unwrap() else {
            panic!("TrafficConfig serializes to a map");
        };
        assert_eq!(serialized.len(), properties_by_namespace("traffic").count());
        for (key, value) in serialized {
            let name = format!("traffic/{}", key.as_str().unwrap());
            assert_eq!(default_value(&name), Some(value), "default of {}", name);
        }
    }

    #[test]
    fn test_property_lookup() {
        assert!(is_known_property("phy/ed_threshold_dbm"));
        assert!(is_known_property("phy/tx_power_dbm"), "aliases are known");
        assert!(!is_known_property("phy/spreading_factor"));
        assert_eq!(get_property_def("phy/tx_power_dbm").map(|p| p.name), Some("phy/tx_power_start_dbm"));
        assert_eq!(PHY_FREQUENCY_MHZ.key(), "frequency_mhz");
        assert_eq!(PHY_FREQUENCY_MHZ.unit, Some("MHz"));
        assert_eq!(properties_by_scope(PropertyScope::Simulation).count(), 2);
    }

    #[test]
    fn test_unresolved_properties_deserialize() {
        let yaml = r#"
            phy:
                frequency_mhz: 5000
                tx_power_dbm: 20
            traffic:
                enabled: true
        "#;
        let props: UnresolvedProperties<NodeScope> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(props.len(), 3);
        assert!(props.contains(&PHY_FREQUENCY_MHZ));
        assert_eq!(props.get_raw(&PHY_TX_POWER_START_DBM), Some(&Value::from(20)));

        let mut resolved: ResolvedProperties<NodeScope> = ResolvedProperties::new();
        resolved.apply_unresolved(&props);
        let phy: PhyConfig = serde_yaml::from_value(Value::Mapping(resolved.section("phy"))).unwrap();
        assert_eq!(phy.frequency_mhz, 5000);
        assert_eq!(phy.tx_power_start_dbm, 20.0, "integers are accepted for floats");
    }

    #[test]
    fn test_flat_simulation_section() {
        let props: UnresolvedProperties<SimulationScope> = serde_yaml::from_str("seed: 42\nduration_s: 2.5").unwrap();
        let mut resolved: ResolvedProperties<SimulationScope> = ResolvedProperties::new();
        resolved.apply_unresolved(&props);
        assert_eq!(resolved.get(&SIMULATION_SEED), Value::from(42));
        assert_eq!(resolved.get(&SIMULATION_DURATION_S), Value::from(2.5));
    }

    #[test]
    fn test_rejects_unknown_and_mistyped() {
        let unknown = serde_yaml::from_str::<UnresolvedProperties<NodeScope>>("phy:\n  bogus: 1\n");
        assert!(unknown.unwrap_err().to_string().contains("Unknown property: phy/bogus"));

        let mut props: UnresolvedProperties<NodeScope> = UnresolvedProperties::new();
        assert_eq!(
            props.insert("phy/use_new_model", Value::from("yes")),
            Err(PropertySetError::TypeMismatch {
                property: "phy/use_new_model".into(),
                expected: ValueKind::Bool.to_string(),
                actual: "string".into(),
            })
        );
        assert!(matches!(
            props.insert("simulation/seed", Value::from(1)),
            Err(PropertySetError::InvalidPropertyScope(_, PropertyScope::Simulation))
        ));
        assert!(props.insert("traffic/message_count", Value::Null).is_ok(), "nullable properties take null");
        assert!(props.insert("phy/frequency_mhz", Value::from(2412.5)).is_err(), "integers reject fractions");
    }
}
