//! Property datatypes and values.
//!
//! A property declares a [`Datatype`] once; every value written to it is
//! checked with [`Datatype::accepts`]. Values are scalar; structure is
//! expressed by nesting child properties.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// Declared type of a property's value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Datatype {
    /// No value; a pure container for child properties.
    Void,
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    /// A string that must never be echoed back to clients verbatim.
    Password,
}

impl Datatype {
    /// Parse a datatype tag.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to the tag stored under `:datatype`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Datatype::Void => "void",
            Datatype::Bool => "bool",
            Datatype::Int32 => "int32",
            Datatype::Int64 => "int64",
            Datatype::Float32 => "float32",
            Datatype::Float64 => "float64",
            Datatype::String => "string",
            Datatype::Password => "password",
        }
    }

    /// Check whether `value` may be stored in a property of this type.
    ///
    /// `Null` is accepted by every datatype: it is the state of a property
    /// that was declared but never set.
    pub fn accepts(&self, value: &PropValue) -> bool {
        match (self, value) {
            (_, PropValue::Null) => true,
            (Datatype::Bool, PropValue::Bool(_)) => true,
            (Datatype::Int32, PropValue::Int(i)) => i32::try_from(*i).is_ok(),
            (Datatype::Int64, PropValue::Int(_)) => true,
            (Datatype::Float32 | Datatype::Float64, PropValue::Int(_)) => true,
            (Datatype::Float32, PropValue::Float(f)) => f.is_finite() && f.abs() <= f32::MAX as f64,
            (Datatype::Float64, PropValue::Float(f)) => f.is_finite(),
            (Datatype::String | Datatype::Password, PropValue::String(_)) => true,
            _ => false,
        }
    }

    /// True for datatypes whose values should be masked in listings.
    pub fn is_secret(&self) -> bool {
        matches!(self, Datatype::Password)
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar property or attribute value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl PropValue {
    /// Convert from JSON. Arrays and objects have no scalar form.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match value {
            Value::Null => Some(PropValue::Null),
            Value::Bool(b) => Some(PropValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(PropValue::Int(i)),
                None => n.as_f64().map(PropValue::Float),
            },
            Value::String(s) => Some(PropValue::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Convert to JSON. Returns `None` for non-finite floats, which JSON
    /// cannot represent.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        use serde_json::Value;
        match self {
            PropValue::Null => Some(Value::Null),
            PropValue::Bool(b) => Some(Value::Bool(*b)),
            PropValue::Int(i) => Some(Value::from(*i)),
            PropValue::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number),
            PropValue::String(s) => Some(Value::String(s.clone())),
        }
    }

    /// Short name of the value's kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropValue::Null => "null",
            PropValue::Bool(_) => "bool",
            PropValue::Int(_) => "int",
            PropValue::Float(_) => "float",
            PropValue::String(_) => "string",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as `f64` (integers widen).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropValue::Int(i) => Some(*i as f64),
            PropValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Null => f.write_str("null"),
            PropValue::Bool(b) => write!(f, "{b}"),
            PropValue::Int(i) => write!(f, "{i}"),
            PropValue::Float(x) => write!(f, "{x}"),
            PropValue::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Bool(b)
    }
}

impl From<i32> for PropValue {
    fn from(i: i32) -> Self {
        PropValue::Int(i as i64)
    }
}

impl From<i64> for PropValue {
    fn from(i: i64) -> Self {
        PropValue::Int(i)
    }
}

impl From<f32> for PropValue {
    fn from(f: f32) -> Self {
        PropValue::Float(f as f64)
    }
}

impl From<f64> for PropValue {
    fn from(f: f64) -> Self {
        PropValue::Float(f)
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::String(s.to_string())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::String(s)
    }
}

// ============================================================================
// Tests
// ============================================================================
