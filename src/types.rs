//! Core value types for nodeflow-rs
//!
//! This module contains the value type system shared by the parser, the
//! node instances and the execution engine.
//!
//! # Main Types
//!
//! - [`ValueType`] - The primitive type domain of sockets (number, string, ...)
//! - [`Value`] - A dynamic value flowing along a connection
//! - [`Outputs`] / [`ValueMap`] - Name-keyed value maps
//!
//! # Compatibility
//!
//! Two socket types may be connected when either side is [`ValueType::Any`]
//! or both types are identical.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// JSON key used to tag date values so they survive a round trip.
pub const DATE_TAG: &str = "$date";

/// JSON key used to tag numbers JSON cannot represent (`NaN`, `inf`, `-inf`).
pub const NUMBER_TAG: &str = "$number";

/// Date format used for tagged dates and script literals.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Name-sorted mapping of socket names to values.
pub type ValueMap = BTreeMap<String, Value>;

/// Outputs produced by one node run, keyed by output socket name.
pub type Outputs = ValueMap;

/// Represents the type carried by a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Floating point number
    Number,
    /// UTF-8 text
    String,
    /// Boolean flag
    Boolean,
    /// Calendar date without a time zone
    Date,
    /// Accepts and produces anything
    #[default]
    Any,
}

impl ValueType {
    /// Canonical default value for this type
    pub fn default_value(&self) -> Value {
        match self {
            ValueType::Number => Value::Number(0.0),
            ValueType::String => Value::String(String::new()),
            ValueType::Boolean => Value::Boolean(false),
            ValueType::Date => Value::Date(chrono::Local::now().date_naive()),
            ValueType::Any => Value::Null,
        }
    }

    /// Whether a connection between sockets of these two types is allowed
    pub fn is_compatible_with(&self, other: ValueType) -> bool {
        *self == ValueType::Any || other == ValueType::Any || *self == other
    }

    /// Infer a type from an annotation keyword.
    ///
    /// Only the last path segment counts (`chrono::NaiveDate` -> `naivedate`),
    /// compared case-insensitively.
    pub fn from_annotation(annotation: &str) -> ValueType {
        let keyword = annotation
            .rsplit(|c| c == '.' || c == ':')
            .next()
            .unwrap_or(annotation)
            .trim()
            .to_ascii_lowercase();

        match keyword.as_str() {
            "number" | "int" | "float" => ValueType::Number,
            "string" | "str" => ValueType::String,
            "boolean" | "bool" => ValueType::Boolean,
            "date" | "datetime" => ValueType::Date,
            _ => ValueType::Any,
        }
    }

    /// Display name of this type
    pub fn display_name(&self) -> &'static str {
        match self {
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Boolean => "boolean",
            ValueType::Date => "date",
            ValueType::Any => "any",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Convenience wrapper for [`ValueType::default_value`]
pub fn default_value(value_type: ValueType) -> Value {
    value_type.default_value()
}

/// Convenience wrapper for [`ValueType::is_compatible_with`]
pub fn is_compatible(a: ValueType, b: ValueType) -> bool {
    a.is_compatible_with(b)
}

/// A dynamic value produced or consumed by a node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(into = "serde_json::Value", from = "serde_json::Value")]
pub enum Value {
    /// Absence of a value (`()` in scripts)
    #[default]
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Date(NaiveDate),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// The narrowest [`ValueType`] describing this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Boolean(_) => ValueType::Boolean,
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Date(_) => ValueType::Date,
            Value::Null | Value::List(_) | Value::Map(_) => ValueType::Any,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render this value as a Rhai literal expression.
    ///
    /// Dates and non-finite numbers have no literal syntax and are rendered
    /// as calls to `parse_date` / `parse_float`.
    pub fn to_rhai_literal(&self) -> String {
        match self {
            Value::Null => "()".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => {
                if !n.is_finite() {
                    format!("parse_float(\"{}\")", n)
                } else if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{:.1}", n)
                } else {
                    format!("{:?}", n)
                }
            }
            Value::String(s) => quote_rhai_string(s),
            Value::Date(d) => format!("parse_date(\"{}\")", d.format(DATE_FORMAT)),
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(Value::to_rhai_literal).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Map(map) => {
                let entries: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", quote_rhai_string(k), v.to_rhai_literal()))
                    .collect();
                format!("#{{{}}}", entries.join(", "))
            }
        }
    }
}

fn quote_rhai_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "()"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::List(_) | Value::Map(_) => {
                write!(f, "{}", serde_json::Value::from(self.clone()))
            }
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(b),
            Value::Number(n) => match serde_json::Number::from_f64(n) {
                Some(number) => serde_json::Value::Number(number),
                None => tagged(NUMBER_TAG, n.to_string()),
            },
            Value::String(s) => serde_json::Value::String(s),
            Value::Date(d) => tagged(DATE_TAG, d.format(DATE_FORMAT).to_string()),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

fn tagged(tag: &str, text: String) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert(tag.to_string(), serde_json::Value::String(text));
    serde_json::Value::Object(map)
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(serde_json::Value::String(text)) = map.get(DATE_TAG) {
                        if let Ok(date) = NaiveDate::parse_from_str(text, DATE_FORMAT) {
                            return Value::Date(date);
                        }
                    }
                    if let Some(serde_json::Value::String(text)) = map.get(NUMBER_TAG) {
                        if let Ok(n) = text.parse::<f64>() {
                            return Value::Number(n);
                        }
                    }
                }
                Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(ValueType::Number.default_value(), Value::Number(0.0));
        assert_eq!(ValueType::String.default_value(), Value::String(String::new()));
        assert_eq!(ValueType::Boolean.default_value(), Value::Boolean(false));
        assert_eq!(ValueType::Any.default_value(), Value::Null);
        assert!(matches!(ValueType::Date.default_value(), Value::Date(_)));
    }

    #[test]
    fn test_compatibility() {
        assert!(is_compatible(ValueType::Any, ValueType::Date));
        assert!(is_compatible(ValueType::String, ValueType::Any));
        assert!(is_compatible(ValueType::Number, ValueType::Number));
        assert!(!is_compatible(ValueType::Number, ValueType::String));
        assert!(!is_compatible(ValueType::Boolean, ValueType::Date));
    }

    #[test]
    fn test_from_annotation() {
        assert_eq!(ValueType::from_annotation("float"), ValueType::Number);
        assert_eq!(ValueType::from_annotation("Int"), ValueType::Number);
        assert_eq!(ValueType::from_annotation("str"), ValueType::String);
        assert_eq!(ValueType::from_annotation("bool"), ValueType::Boolean);
        assert_eq!(ValueType::from_annotation("datetime.date"), ValueType::Date);
        assert_eq!(ValueType::from_annotation("chrono::DateTime"), ValueType::Date);
        assert_eq!(ValueType::from_annotation("object"), ValueType::Any);
    }

    #[test]
    fn test_value_json_round_trip() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let mut map = BTreeMap::new();
        map.insert("when".to_string(), Value::Date(date));
        map.insert("label".to_string(), Value::from("x"));
        let value = Value::List(vec![Value::Number(1.5), Value::Map(map), Value::Null]);

        let json = serde_json::to_string(&value).unwrap();
        assert!(json.contains("\"$date\":\"2024-02-29\""));
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_non_finite_numbers_are_tagged() {
        let json = serde_json::to_string(&Value::Number(f64::NAN)).unwrap();
        assert_eq!(json, r#"{"$number":"NaN"}"#);
        assert_ne!(json, serde_json::to_string(&Value::Null).unwrap());

        for n in [f64::INFINITY, f64::NEG_INFINITY] {
            let json = serde_json::to_string(&Value::Number(n)).unwrap();
            let parsed: Value = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, Value::Number(n));
        }
        let parsed: Value = serde_json::from_str(r#"{"$number":"NaN"}"#).unwrap();
        assert!(parsed.as_number().is_some_and(f64::is_nan));
    }

    #[test]
    fn test_rhai_literals() {
        assert_eq!(Value::Number(3.0).to_rhai_literal(), "3.0");
        assert_eq!(Value::Number(0.25).to_rhai_literal(), "0.25");
        assert_eq!(Value::from("a\"b").to_rhai_literal(), "\"a\\\"b\"");
        assert_eq!(Value::Null.to_rhai_literal(), "()");
        let date = NaiveDate::from_ymd_opt(2023, 1, 5).unwrap();
        assert_eq!(
            Value::Date(date).to_rhai_literal(),
            "parse_date(\"2023-01-05\")"
        );
    }
}
