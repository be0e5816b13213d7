//! Property definitions, scopes and value kinds.

use serde_yaml::Value;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Where a property may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyScope {
    /// Per node (`defaults` section and node entries).
    Node,
    /// Scenario wide (`simulation` section).
    Simulation,
}

impl fmt::Display for PropertyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyScope::Node => write!(f, "node"),
            PropertyScope::Simulation => write!(f, "simulation"),
        }
    }
}

/// Type-level marker for a property scope.
pub trait ScopeMarker: Clone + fmt::Debug + Default + 'static {
    /// The scope.
    const SCOPE: PropertyScope;
    /// When set, YAML keys are bare names inside this namespace instead of
    /// namespace maps.
    const FLAT_NAMESPACE: Option<&'static str>;
}

/// Node scope marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeScope;

impl ScopeMarker for NodeScope {
    const SCOPE: PropertyScope = PropertyScope::Node;
    const FLAT_NAMESPACE: Option<&'static str> = None;
}

/// Simulation scope marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationScope;

impl ScopeMarker for SimulationScope {
    const SCOPE: PropertyScope = PropertyScope::Simulation;
    const FLAT_NAMESPACE: Option<&'static str> = Some("simulation");
}

/// Shape of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// `true` / `false`.
    Bool,
    /// Whole number.
    Integer,
    /// Number; integers are accepted.
    Float,
    /// Text.
    String,
    /// Nested mapping, validated by the consuming struct.
    Map,
}

impl ValueKind {
    /// Whether a YAML value has this shape.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueKind::Bool, Value::Bool(_)) => true,
            (ValueKind::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (ValueKind::Float, Value::Number(_)) => true,
            (ValueKind::String, Value::String(_)) => true,
            (ValueKind::Map, Value::Mapping(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Bool => "bool",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Map => "map",
        };
        f.write_str(s)
    }
}

/// Built-in default of a property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyDefault {
    /// No value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Integer(i64),
    /// Float.
    Float(f64),
    /// String.
    String(&'static str),
}

impl PropertyDefault {
    /// The default as a YAML value.
    pub fn to_value(&self) -> Value {
        match self {
            PropertyDefault::Null => Value::Null,
            PropertyDefault::Bool(b) => Value::Bool(*b),
            PropertyDefault::Integer(i) => Value::Number((*i).into()),
            PropertyDefault::Float(v) => Value::Number((*v).into()),
            PropertyDefault::String(s) => Value::String((*s).to_string()),
        }
    }
}

impl fmt::Display for PropertyDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyDefault::Null => write!(f, "null"),
            PropertyDefault::Bool(b) => write!(f, "{}", b),
            PropertyDefault::Integer(i) => write!(f, "{}", i),
            PropertyDefault::Float(v) => write!(f, "{}", v),
            PropertyDefault::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// Static description of one property.
#[derive(Debug)]
pub struct PropertyDef {
    /// Full name, `namespace/key`.
    pub name: &'static str,
    /// User-facing description.
    pub description: &'static str,
    /// Built-in default.
    pub default: PropertyDefault,
    /// Expected value shape.
    pub kind: ValueKind,
    /// Whether `null` is accepted.
    pub nullable: bool,
    /// Scope.
    pub scope: PropertyScope,
    /// Unit, if any.
    pub unit: Option<&'static str>,
    /// Alternative full names.
    pub aliases: &'static [&'static str],
}

impl PropertyDef {
    /// Define a property.
    pub const fn new(
        name: &'static str,
        description: &'static str,
        default: PropertyDefault,
        kind: ValueKind,
        scope: PropertyScope,
    ) -> Self {
        PropertyDef {
            name,
            description,
            default,
            kind,
            nullable: matches!(default, PropertyDefault::Null),
            scope,
            unit: None,
            aliases: &[],
        }
    }

    /// Attach a unit.
    pub const fn with_unit(self, unit: &'static str) -> Self {
        PropertyDef { unit: Some(unit), ..self }
    }

    /// Attach aliases.
    pub const fn with_aliases(self, aliases: &'static [&'static str]) -> Self {
        PropertyDef { aliases, ..self }
    }

    /// Namespace part of the name.
    pub fn namespace(&self) -> Option<&'static str> {
        self.name.split_once('/').map(|(ns, _)| ns)
    }

    /// Key within the namespace.
    pub fn key(&self) -> &'static str {
        self.name.split_once('/').map_or(self.name, |(_, key)| key)
    }

    /// Whether `name` is this property's name or one of its aliases.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|alias| *alias == name)
    }

    /// Default as a YAML value.
    pub fn default_value(&self) -> Value {
        self.default.to_value()
    }

    /// Whether a value is acceptable.
    pub fn accepts(&self, value: &Value) -> bool {
        (self.nullable && value.is_null()) || self.kind.matches(value)
    }
}

// Definitions are unique by name, so identity follows the name.
impl PartialEq for PropertyDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for PropertyDef {}

impl Hash for PropertyDef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
