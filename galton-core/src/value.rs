//! Runtime values exchanged with plugins
//!
//! Values can be numbers, text, booleans, objects, lists, null, or errors.
//! Errors propagate as values so a plugin call never panics.

use crate::{Column, GaltonError, Table};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;

/// Runtime value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
    Object(HashMap<String, Value>),
    List(Vec<Value>),
    Null,
    Error(GaltonError),
}

impl Value {
    // ========== Safe Accessors (never panic) ==========

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&GaltonError> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    // ========== Object Field Access ==========

    /// Get field from object. Returns Error value if not found or not an object.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(map) => map
                .get(key)
                .cloned()
                .unwrap_or_else(|| Value::Error(GaltonError::undefined_field(key))),
            Value::Error(e) => Value::Error(e.clone()),
            _ => Value::Error(GaltonError::type_error("Object", self.type_name())),
        }
    }

    /// Type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::Text(_) => "Text",
            Value::Bool(_) => "Bool",
            Value::Object(_) => "Object",
            Value::List(_) => "List",
            Value::Null => "Null",
            Value::Error(_) => "Error",
        }
    }

    // ========== JSON Interchange ==========

    pub fn from_json(json: &JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            JsonValue::String(s) => Value::Text(s.clone()),
            JsonValue::Array(arr) => Value::List(arr.iter().map(Value::from_json).collect()),
            JsonValue::Object(obj) => Value::Object(
                obj.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect(),
            ),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            // NaN and infinities have no JSON form
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Text(s) => JsonValue::String(s.clone()),
            Value::List(l) => JsonValue::Array(l.iter().map(Value::to_json).collect()),
            Value::Object(o) => JsonValue::Object(
                o.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Error(e) => json!({"_error": {"code": e.code, "message": e.message}}),
        }
    }

    /// Build an object value from key/value pairs
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Wrap a list of numbers
    pub fn numbers(values: &[f64]) -> Value {
        Value::List(values.iter().copied().map(Value::Number).collect())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Object(obj) => {
                if let Some(Value::Text(method)) = obj.get("method") {
                    write!(f, "[{}]", method)
                } else {
                    write!(f, "[Object]")
                }
            }
            Value::List(items) => {
                // Small lists show values, large lists their length
                if items.len() <= 5 {
                    let contents: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                    write!(f, "[{}]", contents.join(", "))
                } else {
                    write!(f, "[{}]", items.len())
                }
            }
            Value::Null => write!(f, "null"),
            Value::Error(e) => write!(f, "#ERROR: {}", e.code),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
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

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<GaltonError> for Value {
    fn from(e: GaltonError) -> Self {
        Value::Error(e)
    }
}

/// Tables arrive either as `{"columns": {name: [...]}}` or as a bare
/// `{name: [...]}` object. A column whose cells are all numbers or null is
/// numeric; anything else is categorical.
impl TryFrom<&Value> for Table {
    type Error = GaltonError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let obj = value
            .as_object()
            .ok_or_else(|| GaltonError::type_error("Table", value.type_name()))?;
        let columns = match obj.get("columns") {
            Some(Value::Object(cols)) => cols,
            _ => obj,
        };

        // HashMap order is arbitrary; sort for a stable column order
        let mut names: Vec<&String> = columns.keys().collect();
        names.sort();

        let mut table = Table::new();
        for name in names {
            let cells = columns[name]
                .as_list()
                .ok_or_else(|| GaltonError::type_error("List", columns[name].type_name()).in_column(name.as_str()))?;
            table.push(name.clone(), column_from_cells(cells))?;
        }
        Ok(table)
    }
}

fn column_from_cells(cells: &[Value]) -> Column {
    let numeric = cells.iter().all(|c| matches!(c, Value::Number(_) | Value::Null));
    if numeric {
        Column::Numeric(cells.iter().map(|c| c.as_number().unwrap_or(f64::NAN)).collect())
    } else {
        Column::Categorical(
            cells
                .iter()
                .map(|c| match c {
                    Value::Null => None,
                    Value::Text(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip_of_nested_object() {
        let json = json!({"a": [1.5, null, "x"], "b": true});
        let v = Value::from_json(&json);
        assert_eq!(v.get("b").as_bool(), Some(true));
        assert_eq!(v.to_json(), json);
    }

    #[test]
    fn test_nan_serializes_as_null() {
        assert_eq!(Value::Number(f64::NAN).to_json(), JsonValue::Null);
    }

    #[test]
    fn test_get_missing_field_is_error() {
        let v = Value::object([("x", Value::from(1.0))]);
        assert!(v.get("y").is_error());
        assert!(Value::Null.get("y").is_error());
    }

    #[test]
    fn test_table_from_value() {
        let v = Value::from_json(&json!({
            "columns": {
                "RT": [300.0, null, 320.0],
                "Group": ["a", "b", null]
            }
        }));
        let table = Table::try_from(&v).unwrap();
        assert_eq!(table.n_rows(), 3);
        let rt = table.numeric("RT").unwrap();
        assert!(rt[1].is_nan());
        assert_eq!(table.distinct("Group").unwrap().len(), 2);
    }

    #[test]
    fn test_table_from_bare_object() {
        let v = Value::from_json(&json!({"x": [1, 2], "g": ["a", "b"]}));
        let table = Table::try_from(&v).unwrap();
        assert!(table.has_column("x"));
        assert!(table.has_column("g"));
    }

    #[test]
    fn test_table_from_non_object() {
        let err = Table::try_from(&Value::Number(1.0)).unwrap_err();
        assert_eq!(err.code, crate::codes::TYPE_ERROR);
    }
}
