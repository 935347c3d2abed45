//! Coerces loosely-typed KPI values into the canonical shape of their
//! chart-type class.
//!
//! All shape sniffing of incoming values happens here. Every failure
//! resolves to a default (`0`, `[0]`, `[0, 0]`), never an error.

use crate::domain::chart_type::ChartTypeClass;
use crate::domain::value::{CanonicalValue, LabeledValue, coerce_finite, parse_finite};
use serde_json::{Map, Value};
use tracing::trace;

const PRIMARY_KEYS: &[&str] = &["a", "primary", "0"];
const SECONDARY_KEYS: &[&str] = &["b", "secondary", "1"];

/// Normalizes `raw` for the given chart-type tag.
pub fn normalize_value_for_chart_type(chart_type: Option<&str>, raw: &Value) -> CanonicalValue {
    normalize_value_for_class(ChartTypeClass::classify(chart_type), raw)
}

pub fn normalize_value_for_class(class: ChartTypeClass, raw: &Value) -> CanonicalValue {
    match class {
        ChartTypeClass::MultiAxisLine => {
            let (primary, secondary) = normalize_dual_axis(raw);
            CanonicalValue::Series(vec![primary, secondary])
        }
        ChartTypeClass::Multi => normalize_multi(raw),
        ChartTypeClass::Single => CanonicalValue::Scalar(normalize_single(raw)),
    }
}

fn normalize_single(raw: &Value) -> f64 {
    let candidate = match raw {
        Value::Array(items) => items.first().and_then(coerce_finite),
        other => coerce_finite(other),
    };
    candidate.unwrap_or_else(|| {
        trace!(raw = %raw, "single value not numeric, defaulting to 0");
        0.0
    })
}

fn normalize_dual_axis(raw: &Value) -> (f64, f64) {
    match raw {
        Value::Array(items) => (
            items.first().and_then(coerce_finite).unwrap_or(0.0),
            items.get(1).and_then(coerce_finite).unwrap_or(0.0),
        ),
        Value::Object(obj) => (
            pick_axis(obj, PRIMARY_KEYS, 0),
            pick_axis(obj, SECONDARY_KEYS, 1),
        ),
        other => (coerce_finite(other).unwrap_or(0.0), 0.0),
    }
}

/// First present, non-null candidate among the named keys, then the
/// positional fallback among the object's values.
fn pick_axis(obj: &Map<String, Value>, keys: &[&str], position: usize) -> f64 {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .chain(obj.values().nth(position))
        .find(|v| !v.is_null())
        .and_then(coerce_finite)
        .unwrap_or(0.0)
}

fn normalize_multi(raw: &Value) -> CanonicalValue {
    match raw {
        Value::Array(items) if items.first().is_some_and(LabeledValue::is_labeled_json) => {
            CanonicalValue::Labeled(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| LabeledValue::from_json_lenient(item, i))
                    .collect(),
            )
        }
        Value::Array(items) => non_empty_series(items.iter().filter_map(coerce_finite).collect()),
        Value::Object(obj) => non_empty_series(obj.values().filter_map(coerce_finite).collect()),
        Value::String(s) => non_empty_series(parse_delimited_numbers(s)),
        other => CanonicalValue::Series(vec![coerce_finite(other).unwrap_or(0.0)]),
    }
}

fn non_empty_series(values: Vec<f64>) -> CanonicalValue {
    if values.is_empty() {
        CanonicalValue::Series(vec![0.0])
    } else {
        CanonicalValue::Series(values)
    }
}

/// Splits on whitespace, `,`, `;` and `|`. A `label:value` token
/// contributes the part after the first colon. If the whole string is
/// itself a number it is appended after the token values.
pub fn parse_delimited_numbers(raw: &str) -> Vec<f64> {
    let mut values: Vec<f64> = raw
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '|'))
        .filter(|token| !token.is_empty())
        .filter_map(|token| {
            let candidate = match token.split_once(':') {
                Some((_, after)) => after,
                None => token,
            };
            parse_finite(candidate)
        })
        .collect();

    if let Some(whole) = parse_finite(raw) {
        values.push(whole);
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scalar(v: f64) -> CanonicalValue {
        CanonicalValue::Scalar(v)
    }

    fn series(v: &[f64]) -> CanonicalValue {
        CanonicalValue::Series(v.to_vec())
    }

    #[test]
    fn single_takes_first_array_element() {
        assert_eq!(normalize_value_for_chart_type(Some("line"), &json!([7, 9])), scalar(7.0));
        assert_eq!(normalize_value_for_chart_type(None, &json!(["3.5", 1])), scalar(3.5));
        assert_eq!(normalize_value_for_chart_type(None, &json!([])), scalar(0.0));
        assert_eq!(normalize_value_for_chart_type(None, &json!(["x", 4])), scalar(0.0));
    }

    #[test]
    fn single_coerces_scalars() {
        assert_eq!(normalize_value_for_chart_type(Some("area"), &json!("oops")), scalar(0.0));
        assert_eq!(normalize_value_for_chart_type(Some("area"), &json!("42")), scalar(42.0));
        assert_eq!(normalize_value_for_chart_type(Some("area"), &Value::Null), scalar(0.0));
        assert_eq!(normalize_value_for_chart_type(None, &json!({"a": 1})), scalar(0.0));
    }

    #[test]
    fn dual_axis_from_scalar() {
        assert_eq!(
            normalize_value_for_chart_type(Some("multiAxisLine"), &json!(5)),
            series(&[5.0, 0.0])
        );
        assert_eq!(
            normalize_value_for_chart_type(Some("multiAxisLine"), &json!("nope")),
            series(&[0.0, 0.0])
        );
    }

    #[test]
    fn dual_axis_from_array_is_positional() {
        let chart = Some("multiAxisLine");
        assert_eq!(normalize_value_for_chart_type(chart, &json!([1, 2, 3])), series(&[1.0, 2.0]));
        assert_eq!(normalize_value_for_chart_type(chart, &json!([4])), series(&[4.0, 0.0]));
        assert_eq!(normalize_value_for_chart_type(chart, &json!(["x", 6])), series(&[0.0, 6.0]));
    }

    #[test]
    fn dual_axis_from_object_keys() {
        let chart = Some("multiAxisLine");
        assert_eq!(
            normalize_value_for_chart_type(chart, &json!({"primary": 3})),
            series(&[3.0, 0.0])
        );
        assert_eq!(
            normalize_value_for_chart_type(chart, &json!({"a": 1, "b": 2})),
            series(&[1.0, 2.0])
        );
        assert_eq!(
            normalize_value_for_chart_type(chart, &json!({"secondary": "8", "primary": 9})),
            series(&[9.0, 8.0])
        );
        assert_eq!(
            normalize_value_for_chart_type(chart, &json!({"0": 4, "1": 5})),
            series(&[4.0, 5.0])
        );
    }

    #[test]
    fn dual_axis_object_falls_back_to_value_order() {
        assert_eq!(
            normalize_value_for_chart_type(Some("multiAxisLine"), &json!({"x": 10, "y": 20})),
            series(&[10.0, 20.0])
        );
    }

    #[test]
    fn multi_keeps_labeled_values_verbatim() {
        let raw = json!([
            {"label": "North", "value": 10, "color": "#111"},
            {"label": "South", "value": 20}
        ]);
        assert_eq!(
            normalize_value_for_chart_type(Some("pie"), &raw),
            CanonicalValue::Labeled(vec![
                LabeledValue::new("North", 10.0).with_color("#111"),
                LabeledValue::new("South", 20.0),
            ])
        );
    }

    #[test]
    fn multi_array_drops_non_numeric() {
        assert_eq!(
            normalize_value_for_chart_type(Some("bar"), &json!([1, "2", "x", null, 4])),
            series(&[1.0, 2.0, 4.0])
        );
        assert_eq!(normalize_value_for_chart_type(Some("bar"), &json!(["x"])), series(&[0.0]));
        assert_eq!(normalize_value_for_chart_type(Some("bar"), &json!([])), series(&[0.0]));
    }

    #[test]
    fn multi_object_uses_values_in_order() {
        assert_eq!(
            normalize_value_for_chart_type(
                Some("radar"),
                &json!({"speed": 3, "power": "4", "x": "?"})
            ),
            series(&[3.0, 4.0])
        );
        assert_eq!(normalize_value_for_chart_type(Some("radar"), &json!({})), series(&[0.0]));
    }

    #[test]
    fn multi_string_tokens() {
        assert_eq!(
            normalize_value_for_chart_type(Some("pie"), &json!("North:10, South:20")),
            series(&[10.0, 20.0])
        );
        assert_eq!(
            normalize_value_for_chart_type(Some("donut"), &json!("1;2|3 four 5")),
            series(&[1.0, 2.0, 3.0, 5.0])
        );
        assert_eq!(normalize_value_for_chart_type(Some("donut"), &json!("none")), series(&[0.0]));
        assert_eq!(normalize_value_for_chart_type(Some("donut"), &json!("")), series(&[0.0]));
    }

    #[test]
    fn multi_string_whole_number_is_appended() {
        assert_eq!(
            normalize_value_for_chart_type(Some("column"), &json!("7")),
            series(&[7.0, 7.0])
        );
    }

    #[test]
    fn multi_scalar_is_wrapped() {
        assert_eq!(normalize_value_for_chart_type(Some("radialBar"), &json!(6)), series(&[6.0]));
        assert_eq!(normalize_value_for_chart_type(Some("radialBar"), &Value::Null), series(&[0.0]));
        assert_eq!(normalize_value_for_chart_type(Some("radialBar"), &json!(true)), series(&[1.0]));
    }

    #[test]
    fn labeled_detection_only_checks_first_element() {
        let raw = json!([{"label": "A", "value": 1}, 5]);
        assert_eq!(
            normalize_value_for_chart_type(Some("pie"), &raw),
            CanonicalValue::Labeled(vec![
                LabeledValue::new("A", 1.0),
                LabeledValue::new("Value 2", 0.0),
            ])
        );

        let raw = json!([5, {"label": "A", "value": 1}]);
        assert_eq!(normalize_value_for_chart_type(Some("pie"), &raw), series(&[5.0]));
    }

    #[test]
    fn label_colon_takes_text_after_first_colon() {
        assert_eq!(parse_delimited_numbers("a:1:2"), Vec::<f64>::new());
        assert_eq!(parse_delimited_numbers("a: 3"), vec![3.0]);
    }
}
