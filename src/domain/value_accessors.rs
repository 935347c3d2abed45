//! Read-side projections over a stored value map (`valueJson`).
//!
//! Keys are string indexes (`"0"`, `"1"`, ...) or category labels. Key
//! `"0"` is the primary value when present.

use crate::domain::value::coerce_finite;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

const PRIMARY_KEY: &str = "0";

/// One chart-ready data point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartDatum {
    pub label: String,
    pub value: f64,
}

/// Lifts a numeric summary map into the generic stored form.
pub fn value_map_from_numbers(values: &IndexMap<String, f64>) -> Map<String, Value> {
    values
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(*v)))
        .collect()
}

fn primary_or_first(map: &Map<String, Value>) -> Option<&Value> {
    map.get(PRIMARY_KEY).or_else(|| map.values().next())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        // f64 Display drops the trailing ".0" that serde_json keeps.
        Value::Number(n) if n.is_f64() => n.as_f64().map(|f| f.to_string()).unwrap_or_default(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `"0"` if present, the only value if there is exactly one, otherwise a
/// count summary such as `"3 values"`.
pub fn get_display_value(map: &Map<String, Value>) -> String {
    if let Some(primary) = map.get(PRIMARY_KEY) {
        return value_text(primary);
    }
    match map.values().next() {
        Some(only) if map.len() == 1 => value_text(only),
        _ => format!("{} values", map.len()),
    }
}

pub fn get_numeric_value(map: &Map<String, Value>) -> f64 {
    primary_or_first(map).and_then(coerce_finite).unwrap_or(0.0)
}

pub fn get_text_value(map: &Map<String, Value>) -> String {
    primary_or_first(map).map(value_text).unwrap_or_default()
}

pub fn value_to_chart_data(map: &Map<String, Value>) -> Vec<ChartDatum> {
    map.iter()
        .map(|(label, value)| ChartDatum {
            label: label.clone(),
            value: coerce_finite(value).unwrap_or(0.0),
        })
        .collect()
}
