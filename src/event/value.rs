//! Scalar property values carried by trace events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Comparison applied between an expected and an observed property value.
///
/// Used by conditions and correlation bindings that need something other
/// than structural equality (case-insensitive text, tolerant floats).
pub type ValueComparer = Arc<dyn Fn(&PropertyValue, &PropertyValue) -> bool + Send + Sync>;

/// A single scalar value attached to an event under a property name.
///
/// Only scalars are representable; nested structures are flattened by the
/// record types before they reach pattern evaluation. Comparisons are
/// structural: `Int(2)` and `Float(2.0)` are distinct values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PropertyValue {
    /// Convert a JSON value into a property value.
    ///
    /// Arrays and objects have no scalar representation and yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }
}

/// The textual form used when a condition matches a value against a regex,
/// and in log output. `Null` renders as the empty string.
impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(
            PropertyValue::from_json(&json!(null)),
            Some(PropertyValue::Null)
        );
        assert_eq!(
            PropertyValue::from_json(&json!(true)),
            Some(PropertyValue::Bool(true))
        );
        assert_eq!(
            PropertyValue::from_json(&json!(42)),
            Some(PropertyValue::Int(42))
        );
        assert_eq!(
            PropertyValue::from_json(&json!(2.5)),
            Some(PropertyValue::Float(2.5))
        );
        assert_eq!(
            PropertyValue::from_json(&json!("hello")),
            Some(PropertyValue::Text("hello".to_string()))
        );
    }

    #[test]
    fn test_from_json_composites_rejected() {
        assert_eq!(PropertyValue::from_json(&json!([1, 2])), None);
        assert_eq!(PropertyValue::from_json(&json!({"a": 1})), None);
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(PropertyValue::Null.to_string(), "");
        assert_eq!(PropertyValue::Bool(true).to_string(), "true");
        assert_eq!(PropertyValue::Int(-7).to_string(), "-7");
        assert_eq!(PropertyValue::Text("order-1".into()).to_string(), "order-1");
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(PropertyValue::Int(2), PropertyValue::Int(2));
        assert_ne!(PropertyValue::Int(2), PropertyValue::Float(2.0));
        assert_ne!(PropertyValue::Text("2".into()), PropertyValue::Int(2));
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(PropertyValue::from(5i32), PropertyValue::Int(5));
        assert_eq!(PropertyValue::from(5u32), PropertyValue::Int(5));
        assert_eq!(PropertyValue::from("x"), PropertyValue::Text("x".into()));
        assert_eq!(PropertyValue::from(1.5), PropertyValue::Float(1.5));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(PropertyValue::Text("a".into()).as_text(), Some("a"));
        assert_eq!(PropertyValue::Int(3).as_text(), None);
        assert_eq!(PropertyValue::Int(3).as_int(), Some(3));
        assert_eq!(PropertyValue::Bool(false).as_bool(), Some(false));
        assert!(PropertyValue::Null.is_null());
        assert_eq!(PropertyValue::Float(0.5).type_name(), "float");
    }

    #[test]
    fn test_untagged_serde() {
        let value: PropertyValue = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(value, PropertyValue::Int(42));

        let value: PropertyValue = serde_json::from_value(json!("text")).unwrap();
        assert_eq!(value, PropertyValue::Text("text".to_string()));

        assert_eq!(serde_json::to_value(PropertyValue::Int(7)).unwrap(), json!(7));
    }
}
