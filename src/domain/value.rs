//! Canonical value shapes and the finite-number coercion policy.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// A category name paired with its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledValue {
    pub label: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl LabeledValue {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Placeholder label for the `index`-th (0-based) entry.
    pub fn synthesized_label(index: usize) -> String {
        format!("Value {}", index + 1)
    }

    /// True when `value` is an object with a string `label` and a numeric
    /// `value`.
    pub fn is_labeled_json(value: &Value) -> bool {
        match value {
            Value::Object(obj) => {
                matches!(obj.get("label"), Some(Value::String(_)))
                    && matches!(obj.get("value"), Some(Value::Number(_)))
            }
            _ => false,
        }
    }

    /// Reads one labeled entry without failing: a missing or blank label
    /// becomes `Value {n}`, an uncoercible value becomes 0.
    pub fn from_json_lenient(value: &Value, index: usize) -> Self {
        let obj = value.as_object();
        let label = obj
            .and_then(|o| o.get("label"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Self::synthesized_label(index));
        let value_num = obj
            .and_then(|o| o.get("value"))
            .and_then(coerce_finite)
            .unwrap_or(0.0);
        let color = obj
            .and_then(|o| o.get("color"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            label,
            value: value_num,
            color,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("label".into(), json!(self.label));
        obj.insert("value".into(), json!(self.value));
        if let Some(color) = &self.color {
            obj.insert("color".into(), json!(color));
        }
        Value::Object(obj)
    }
}

/// The stored value of a KPI for one date.
///
/// Serialized untagged: `5`, `[1, 2]` or `[{"label": "A", "value": 1}]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CanonicalValue {
    Scalar(f64),
    Series(Vec<f64>),
    Labeled(Vec<LabeledValue>),
}

impl CanonicalValue {
    /// The value shown as "the" number for this date: the scalar itself or
    /// the first entry of an array.
    pub fn first(&self) -> Option<f64> {
        match self {
            CanonicalValue::Scalar(v) => Some(*v),
            CanonicalValue::Series(values) => values.first().copied(),
            CanonicalValue::Labeled(entries) => entries.first().map(|e| e.value),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CanonicalValue::Scalar(_) => 1,
            CanonicalValue::Series(values) => values.len(),
            CanonicalValue::Labeled(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Coerces a loosely-typed value to a finite number.
///
/// Numbers pass through, strings are trimmed and parsed, booleans map to
/// 1/0. Empty strings, `null`, arrays, objects, NaN and infinities are
/// rejected.
pub fn coerce_finite(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_finite(s),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }?;
    n.is_finite().then_some(n)
}

pub fn parse_finite(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}
