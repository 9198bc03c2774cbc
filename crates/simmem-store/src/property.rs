//! Property records and their value payloads.
//!
//! A [`Property`] is an immutable, keyed, step-stamped value. Two properties
//! with equal key, timestamp and value are interchangeable as *content* but
//! remain distinct *instances*: each construction draws a fresh
//! [`PropertyId`], and storage removes by that identity when asked to
//! remove an exact instance.

use serde::{Deserialize, Serialize};

/// Discrete simulation time unit.
pub type Step = i64;

/// Identity of a single property instance.
///
/// Cloning a [`Property`] keeps its id; building a new one (including via
/// [`Property::refreshed`]) always yields a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId(uuid::Uuid);

impl PropertyId {
    /// Generate a new random PropertyId
    pub fn new() -> Self {
        PropertyId(uuid::Uuid::new_v4())
    }
}

impl Default for PropertyId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PropertyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared kind used for type-filtered lookups.
///
/// `Any` is satisfied by every value and `Number` by both integers and
/// floats; every other kind only by its own variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Any,
    Bool,
    Integer,
    Float,
    Number,
    Text,
    List,
    Json,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Bool => write!(f, "bool"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Number => write!(f, "number"),
            Self::Text => write!(f, "text"),
            Self::List => write!(f, "list"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Payload of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Json(serde_json::Value),
}

impl Value {
    /// The concrete kind of this value (never `Any` or `Number`).
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Integer(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::List(_) => ValueKind::List,
            Value::Json(_) => ValueKind::Json,
        }
    }

    /// Whether this value is an instance of `kind`.
    pub fn satisfies(&self, kind: ValueKind) -> bool {
        match kind {
            ValueKind::Any => true,
            ValueKind::Number => matches!(self, Value::Integer(_) | Value::Float(_)),
            other => self.kind() == other,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of integers and floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

/// An immutable, keyed, step-stamped value record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    id: PropertyId,
    key: String,
    timestamp: Step,
    value: Value,
}

impl Property {
    /// Create a new property instance.
    ///
    /// Negative timestamps are accepted here and rejected when stored.
    pub fn new(key: impl Into<String>, timestamp: Step, value: impl Into<Value>) -> Self {
        Self {
            id: PropertyId::new(),
            key: key.into(),
            timestamp,
            value: value.into(),
        }
    }

    pub fn id(&self) -> PropertyId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn timestamp(&self) -> Step {
        self.timestamp
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// A new instance with the same key, stamped at `step`, holding
    /// `value` if given and the current value otherwise.
    pub fn refreshed(&self, step: Step, value: Option<Value>) -> Property {
        Property {
            id: PropertyId::new(),
            key: self.key.clone(),
            timestamp: step,
            value: value.unwrap_or_else(|| self.value.clone()),
        }
    }

    /// Whether `other` is this exact instance.
    pub fn is_same_instance(&self, other: &Property) -> bool {
        self.id == other.id
    }

    /// Equality of key, timestamp and value, ignoring identity.
    pub fn same_content(&self, other: &Property) -> bool {
        self.key == other.key && self.timestamp == other.timestamp && self.value == other.value
    }
}

impl std::fmt::Display for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}={}", self.key, self.timestamp, self.value)
    }
}
