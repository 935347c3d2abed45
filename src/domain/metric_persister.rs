//! Turns one update batch for a KPI into the rows to persist and the
//! denormalized summary fields derived from them.
//!
//! Within a batch at most one row survives per date (last point wins).
//! Multi-value chart types collapse the whole batch into a single row
//! holding the full category set. Nothing here performs I/O.

use crate::domain::chart_type::ChartTypeClass;
use crate::domain::date_normalizer::{self, DateInput, normalize_date_only_at, today_utc};
use crate::domain::value::{CanonicalValue, LabeledValue, coerce_finite};
use crate::domain::value_normalizer::normalize_value_for_class;
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// One point as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMetricPoint {
    #[serde(default, deserialize_with = "date_normalizer::deserialize_lenient")]
    pub date: Option<DateInput>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub value_array: Option<Value>,
    #[serde(default)]
    pub labeled_values: Option<Value>,
    #[serde(default, deserialize_with = "deserialize_color")]
    pub color: Option<String>,
}

impl IncomingMetricPoint {
    pub fn new(date: impl Into<DateInput>) -> Self {
        Self {
            date: Some(date.into()),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_value_array(mut self, values: impl Into<Value>) -> Self {
        self.value_array = Some(values.into());
        self
    }

    pub fn with_labeled_values(mut self, entries: &[LabeledValue]) -> Self {
        let entries = entries.iter().map(LabeledValue::to_json).collect();
        self.labeled_values = Some(Value::Array(entries));
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    fn carried_labeled_values(&self) -> Option<&Vec<Value>> {
        self.labeled_values
            .as_ref()
            .and_then(Value::as_array)
            .filter(|entries| !entries.is_empty())
    }

    /// First finite number among `valueArray[0]`, `value[0]` and `value`.
    fn first_number(&self) -> Option<f64> {
        let first_of = |v: Option<&Value>| {
            v.and_then(Value::as_array)
                .and_then(|items| items.first())
                .and_then(coerce_finite)
        };
        first_of(self.value_array.as_ref())
            .or_else(|| first_of(self.value.as_ref()))
            .or_else(|| self.value.as_ref().and_then(coerce_finite))
    }

    fn raw_value(&self) -> &Value {
        self.labeled_values
            .as_ref()
            .or(self.value_array.as_ref())
            .or(self.value.as_ref())
            .unwrap_or(&Value::Null)
    }
}

fn deserialize_color<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

/// A row keyed by `(kpi_id, date)`, ready for the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedMetricRow {
    pub kpi_id: String,
    pub date: NaiveDate,
    pub value: CanonicalValue,
    pub color: Option<String>,
}

/// The rows of one batch plus the summary of its latest date.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedMetrics {
    pub points: Vec<PersistedMetricRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_json: Option<IndexMap<String, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_date: Option<NaiveDate>,
}

impl PersistedMetrics {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Builds the rows for one update. `None` means "leave history alone" and
/// returns an empty result without running the pipeline.
pub fn build_persisted_metrics(
    kpi_id: &str,
    chart_type: Option<&str>,
    incoming: Option<&[IncomingMetricPoint]>,
) -> PersistedMetrics {
    build_persisted_metrics_at(kpi_id, chart_type, incoming, today_utc())
}

/// Same as [`build_persisted_metrics`] with an explicit fallback day for
/// points without a usable date.
pub fn build_persisted_metrics_at(
    kpi_id: &str,
    chart_type: Option<&str>,
    incoming: Option<&[IncomingMetricPoint]>,
    today: NaiveDate,
) -> PersistedMetrics {
    let Some(incoming) = incoming else {
        return PersistedMetrics::default();
    };

    let class = ChartTypeClass::classify(chart_type);
    let rows: Vec<PersistedMetricRow> = if class.is_multi() {
        collapse_multi(kpi_id, incoming, today).into_iter().collect()
    } else {
        incoming
            .iter()
            .map(|point| PersistedMetricRow {
                kpi_id: kpi_id.to_string(),
                date: normalize_date_only_at(point.date.as_ref(), today),
                value: normalize_value_for_class(class, point.raw_value()),
                color: point.color.clone(),
            })
            .collect()
    };

    let deduped = dedupe_by_date(rows);
    debug!(
        kpi_id,
        chart_class = %class,
        incoming = incoming.len(),
        rows = deduped.len(),
        "built persisted metrics"
    );

    let Some(latest) = deduped.values().max_by_key(|row| row.date) else {
        return PersistedMetrics::default();
    };
    let (latest_value, value_json) = summarize_value(&latest.value);
    let latest_date = latest.date;

    PersistedMetrics {
        points: deduped.into_values().collect(),
        latest_value,
        value_json: Some(value_json),
        latest_date: Some(latest_date),
    }
}

/// Keys rows by date in first-seen order; a later row for the same date
/// replaces the earlier one.
pub fn dedupe_by_date(rows: Vec<PersistedMetricRow>) -> IndexMap<NaiveDate, PersistedMetricRow> {
    let mut by_date = IndexMap::with_capacity(rows.len());
    for row in rows {
        by_date.insert(row.date, row);
    }
    by_date
}

/// `latestValue` and the label/index keyed map for one canonical value.
pub fn summarize_value(value: &CanonicalValue) -> (Option<f64>, IndexMap<String, f64>) {
    let mut map = IndexMap::new();
    match value {
        CanonicalValue::Labeled(entries) => {
            for entry in entries {
                map.insert(entry.label.clone(), entry.value);
            }
        }
        CanonicalValue::Series(values) => {
            for (i, v) in values.iter().enumerate() {
                map.insert(i.to_string(), *v);
            }
        }
        CanonicalValue::Scalar(v) => {
            map.insert("0".to_string(), *v);
        }
    }
    (value.first(), map)
}

fn collapse_multi(
    kpi_id: &str,
    incoming: &[IncomingMetricPoint],
    today: NaiveDate,
) -> Option<PersistedMetricRow> {
    let first = incoming.first()?;
    let labeled = representative_labels(incoming);
    let color = labeled.first().and_then(|entry| entry.color.clone());
    let raw = Value::Array(labeled.iter().map(LabeledValue::to_json).collect());

    Some(PersistedMetricRow {
        kpi_id: kpi_id.to_string(),
        date: normalize_date_only_at(first.date.as_ref(), today),
        value: normalize_value_for_class(ChartTypeClass::Multi, &raw),
        color,
    })
}

/// The first point's own labeled list if any point carries one, otherwise
/// one synthesized entry per point labeled by its raw date.
fn representative_labels(incoming: &[IncomingMetricPoint]) -> Vec<LabeledValue> {
    if let Some(entries) = incoming.iter().find_map(IncomingMetricPoint::carried_labeled_values) {
        return entries
            .iter()
            .enumerate()
            .map(|(i, entry)| LabeledValue::from_json_lenient(entry, i))
            .collect();
    }

    incoming
        .iter()
        .enumerate()
        .map(|(i, point)| LabeledValue {
            label: point
                .date
                .as_ref()
                .and_then(DateInput::label)
                .unwrap_or_else(|| LabeledValue::synthesized_label(i)),
            value: point.first_number().unwrap_or(0.0),
            color: point.color.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn build(chart: Option<&str>, incoming: &[IncomingMetricPoint]) -> PersistedMetrics {
        build_persisted_metrics_at("k1", chart, Some(incoming), day(2030, 1, 1))
    }

    #[test]
    fn null_batch_is_a_no_op() {
        let result = build_persisted_metrics("k1", None, None);
        assert!(result.points.is_empty());
        assert_eq!(result.latest_value, None);
        assert_eq!(result.value_json, None);
        assert_eq!(result.latest_date, None);
    }

    #[test]
    fn empty_batch_yields_no_points() {
        let result = build_persisted_metrics("k1", None, Some(&[]));
        assert_eq!(result, PersistedMetrics::default());

        let result = build_persisted_metrics("k1", Some("pie"), Some(&[]));
        assert_eq!(result, PersistedMetrics::default());
    }

    #[test]
    fn last_point_wins_for_duplicate_dates() {
        let result = build(
            Some("line"),
            &[
                IncomingMetricPoint::new("2024-01-01").with_value(5),
                IncomingMetricPoint::new("2024-01-01").with_value(9),
            ],
        );
        assert_eq!(result.points.len(), 1);
        assert_eq!(result.points[0].date, day(2024, 1, 1));
        assert_eq!(result.points[0].value, CanonicalValue::Scalar(9.0));
        assert_eq!(result.latest_value, Some(9.0));
    }

    #[test]
    fn dedupe_keeps_first_seen_position() {
        let result = build(
            None,
            &[
                IncomingMetricPoint::new("2024-01-02").with_value(1),
                IncomingMetricPoint::new("2024-01-01").with_value(2),
                IncomingMetricPoint::new("2024-01-02T18:00:00Z").with_value(3),
            ],
        );
        let dates: Vec<_> = result.points.iter().map(|p| (p.date, p.value.clone())).collect();
        assert_eq!(
            dates,
            vec![
                (day(2024, 1, 2), CanonicalValue::Scalar(3.0)),
                (day(2024, 1, 1), CanonicalValue::Scalar(2.0)),
            ]
        );
        assert_eq!(result.latest_date, Some(day(2024, 1, 2)));
        assert_eq!(result.latest_value, Some(3.0));
    }

    #[test]
    fn multi_collapses_to_labeled_point() {
        let result = build(
            Some("pie"),
            &[
                IncomingMetricPoint::new("2024-01-01").with_labeled_values(&[
                    LabeledValue::new("A", 1.0),
                    LabeledValue::new("B", 2.0),
                ]),
                IncomingMetricPoint::new("2024-01-02").with_value(99),
            ],
        );
        assert_eq!(result.points.len(), 1);
        let row = &result.points[0];
        assert_eq!(row.date, day(2024, 1, 1));
        assert_eq!(
            row.value,
            CanonicalValue::Labeled(vec![LabeledValue::new("A", 1.0), LabeledValue::new("B", 2.0)])
        );
        let value_json = result.value_json.unwrap();
        assert_eq!(value_json.get("A"), Some(&1.0));
        assert_eq!(value_json.get("B"), Some(&2.0));
        assert_eq!(value_json.len(), 2);
        assert_eq!(result.latest_value, Some(1.0));
    }

    #[test]
    fn multi_uses_first_point_that_carries_labels() {
        let result = build(
            Some("bar"),
            &[
                IncomingMetricPoint::new("2024-03-01").with_value(5),
                IncomingMetricPoint::new("2024-03-02")
                    .with_labeled_values(&[LabeledValue::new("X", 4.0).with_color("#abc")]),
                IncomingMetricPoint::new("2024-03-03")
                    .with_labeled_values(&[LabeledValue::new("Y", 8.0)]),
            ],
        );
        assert_eq!(result.points.len(), 1);
        assert_eq!(result.points[0].date, day(2024, 3, 1));
        assert_eq!(result.points[0].color.as_deref(), Some("#abc"));
        assert_eq!(
            result.points[0].value,
            CanonicalValue::Labeled(vec![LabeledValue::new("X", 4.0).with_color("#abc")])
        );
    }

    #[test]
    fn multi_without_labels_synthesizes_from_points() {
        let incoming = vec![
            IncomingMetricPoint::new("North").with_value(json!([3, 4])),
            IncomingMetricPoint::new("South").with_value_array(json!(["6"])).with_color("#0f0"),
            IncomingMetricPoint::default().with_value("2.5"),
            IncomingMetricPoint::new("").with_value("junk"),
        ];
        let result = build(Some("radar"), &incoming);
        assert_eq!(result.points.len(), 1);
        // "North" is not a date, so the row lands on the fallback day.
        assert_eq!(result.points[0].date, day(2030, 1, 1));
        assert_eq!(result.points[0].color, None);
        assert_eq!(
            result.points[0].value,
            CanonicalValue::Labeled(vec![
                LabeledValue::new("North", 3.0),
                LabeledValue::new("South", 6.0).with_color("#0f0"),
                LabeledValue::new("Value 3", 2.5),
                LabeledValue::new("Value 4", 0.0),
            ])
        );
    }

    #[test]
    fn duplicate_labels_overwrite_in_value_json() {
        let result = build(
            Some("pie"),
            &[IncomingMetricPoint::new("2024-01-01").with_labeled_values(&[
                LabeledValue::new("A", 1.0),
                LabeledValue::new("A", 5.0),
            ])],
        );
        let value_json = result.value_json.unwrap();
        assert_eq!(value_json.len(), 1);
        assert_eq!(value_json.get("A"), Some(&5.0));
        assert_eq!(result.latest_value, Some(1.0));
    }

    #[test]
    fn series_summary_is_index_keyed() {
        let (latest, map) = summarize_value(&CanonicalValue::Series(vec![1.0, 2.0, 3.0]));
        assert_eq!(latest, Some(1.0));
        let pairs: Vec<_> = map.into_iter().collect();
        assert_eq!(
            pairs,
            vec![("0".to_string(), 1.0), ("1".to_string(), 2.0), ("2".to_string(), 3.0)]
        );
    }

    #[test]
    fn dual_axis_points_map_independently() {
        let result = build(
            Some("multiAxisLine"),
            &[
                IncomingMetricPoint::new("2024-01-01")
                    .with_value(json!({"primary": 3, "secondary": 4})),
                IncomingMetricPoint::new("2024-01-02").with_value_array(json!([5, 6])),
            ],
        );
        assert_eq!(result.points.len(), 2);
        assert_eq!(result.latest_date, Some(day(2024, 1, 2)));
        assert_eq!(result.latest_value, Some(5.0));
        let value_json = result.value_json.unwrap();
        assert_eq!(value_json.get("1"), Some(&6.0));
    }

    #[test]
    fn independent_precedence_prefers_labeled_then_array_then_value() {
        let point = IncomingMetricPoint::new("2024-01-01")
            .with_value(1)
            .with_value_array(json!([2, 3]));
        let result = build(Some("line"), &[point]);
        assert_eq!(result.points[0].value, CanonicalValue::Scalar(2.0));
    }

    #[test]
    fn colors_carry_through_single_points() {
        let result = build(
            None,
            &[IncomingMetricPoint::new("2024-01-01").with_value(1).with_color("red")],
        );
        assert_eq!(result.points[0].color.as_deref(), Some("red"));
        assert_eq!(result.points[0].kpi_id, "k1");
    }

    #[test]
    fn deserializes_loose_json_points() {
        let incoming: Vec<IncomingMetricPoint> = serde_json::from_value(json!([
            {"date": "2024-01-01", "value": "12"},
            {"date": 1704153600000u64, "valueArray": [1, 2]},
            {"date": true, "value": 3, "color": 7},
            {"labeledValues": null, "value": null}
        ]))
        .unwrap();
        assert_eq!(incoming.len(), 4);
        assert_eq!(incoming[0].date, Some(DateInput::Text("2024-01-01".into())));
        assert_eq!(incoming[1].date, Some(DateInput::EpochMillis(1_704_153_600_000.0)));
        assert_eq!(incoming[2].date, None);
        assert_eq!(incoming[2].color, None);
        assert_eq!(incoming[3].labeled_values, None);
        assert_eq!(incoming[3].value, None);

        let result = build(None, &incoming);
        let dates: Vec<_> = result.points.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![day(2024, 1, 1), day(2024, 1, 2), day(2030, 1, 1)]);
        assert_eq!(result.latest_date, Some(day(2030, 1, 1)));
        assert_eq!(result.latest_value, Some(0.0));
    }

    #[test]
    fn serializes_summary_in_camel_case() {
        let result = build(None, &[IncomingMetricPoint::new("2024-01-01").with_value(4)]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["latestValue"], json!(4.0));
        assert_eq!(json["latestDate"], json!("2024-01-01"));
        assert_eq!(json["valueJson"], json!({"0": 4.0}));
        assert_eq!(json["points"][0]["kpiId"], json!("k1"));
    }
}
