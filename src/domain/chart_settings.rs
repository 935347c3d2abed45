//! Display/export settings for a KPI chart.
//!
//! Each field resolves independently: explicit column value, then the
//! embedded `settings_json` blob, then the component default. Columns come
//! from the legacy schema where flags are stored as INTEGER 0/1.

use crate::domain::value::coerce_finite;
use crate::ports::config_port::ConfigPort;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

const DEFAULTS_SECTION: &str = "chart_defaults";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeriesType {
    #[default]
    Line,
    Column,
    Area,
}

impl SeriesType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "line" => Some(SeriesType::Line),
            "column" | "bar" => Some(SeriesType::Column),
            "area" => Some(SeriesType::Area),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SeriesType::Line => "line",
            SeriesType::Column => "column",
            SeriesType::Area => "area",
        }
    }
}

/// Fully resolved settings consumed by renderers and exporters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSettings {
    pub stroke_width: f64,
    pub stroke_color: Option<String>,
    pub stroke_opacity: f64,
    pub fill_opacity: f64,
    pub show_legend: bool,
    pub show_grid_lines: bool,
    pub show_data_labels: bool,
    pub primary_label: Option<String>,
    pub secondary_label: Option<String>,
    pub primary_series_type: SeriesType,
    pub secondary_series_type: SeriesType,
    pub subtitle_styling: bool,
    pub sync_axes: bool,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            stroke_width: 2.0,
            stroke_color: None,
            stroke_opacity: 1.0,
            fill_opacity: 0.4,
            show_legend: true,
            show_grid_lines: true,
            show_data_labels: false,
            primary_label: None,
            secondary_label: None,
            primary_series_type: SeriesType::Line,
            secondary_series_type: SeriesType::Line,
            subtitle_styling: false,
            sync_axes: false,
        }
    }
}

impl ChartSettings {
    /// Component defaults with `[chart_defaults]` overrides applied.
    pub fn defaults_from_config(config: &dyn ConfigPort) -> Self {
        let base = Self::default();
        let series = |key: &str, fallback: SeriesType| {
            config
                .get_string(DEFAULTS_SECTION, key)
                .and_then(|s| SeriesType::parse(&s))
                .unwrap_or(fallback)
        };
        Self {
            stroke_width: config.get_double(DEFAULTS_SECTION, "stroke_width", base.stroke_width),
            stroke_color: config
                .get_string(DEFAULTS_SECTION, "stroke_color")
                .filter(|s| !s.trim().is_empty()),
            stroke_opacity: config.get_double(
                DEFAULTS_SECTION,
                "stroke_opacity",
                base.stroke_opacity,
            ),
            fill_opacity: config.get_double(DEFAULTS_SECTION, "fill_opacity", base.fill_opacity),
            show_legend: config.get_bool(DEFAULTS_SECTION, "show_legend", base.show_legend),
            show_grid_lines: config.get_bool(
                DEFAULTS_SECTION,
                "show_grid_lines",
                base.show_grid_lines,
            ),
            show_data_labels: config.get_bool(
                DEFAULTS_SECTION,
                "show_data_labels",
                base.show_data_labels,
            ),
            primary_label: None,
            secondary_label: None,
            primary_series_type: series("primary_series_type", base.primary_series_type),
            secondary_series_type: series("secondary_series_type", base.secondary_series_type),
            subtitle_styling: config.get_bool(
                DEFAULTS_SECTION,
                "subtitle_styling",
                base.subtitle_styling,
            ),
            sync_axes: config.get_bool(DEFAULTS_SECTION, "sync_axes", base.sync_axes),
        }
    }
}

/// Settings columns as stored on a KPI row. Flags are 0/1 integers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSettingsColumns {
    pub stroke_width: Option<f64>,
    pub stroke_color: Option<String>,
    pub stroke_opacity: Option<f64>,
    pub fill_opacity: Option<f64>,
    pub show_legend: Option<i64>,
    pub show_grid_lines: Option<i64>,
    pub show_data_labels: Option<i64>,
    pub primary_label: Option<String>,
    pub secondary_label: Option<String>,
    pub primary_series_type: Option<String>,
    pub secondary_series_type: Option<String>,
    pub subtitle_styling: Option<i64>,
    pub sync_axes: Option<i64>,
}

/// 0/1 column to boolean; any non-zero value is true.
pub fn flag_from_column(column: Option<i64>) -> Option<bool> {
    column.map(|v| v != 0)
}

fn text_from_column(column: &Option<String>) -> Option<String> {
    column.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Merges columns, the settings blob, and defaults into one record.
/// A blob that is not a JSON object is ignored.
pub fn resolve_chart_settings(
    columns: &ChartSettingsColumns,
    settings_json: Option<&str>,
    defaults: &ChartSettings,
) -> ChartSettings {
    let blob = parse_settings_blob(settings_json);
    let blob = BlobView(&blob);

    ChartSettings {
        stroke_width: columns
            .stroke_width
            .filter(|v| v.is_finite())
            .or_else(|| blob.number("strokeWidth"))
            .unwrap_or(defaults.stroke_width),
        stroke_color: text_from_column(&columns.stroke_color)
            .or_else(|| blob.text("strokeColor"))
            .or_else(|| defaults.stroke_color.clone()),
        stroke_opacity: columns
            .stroke_opacity
            .filter(|v| v.is_finite())
            .or_else(|| blob.number("strokeOpacity"))
            .unwrap_or(defaults.stroke_opacity),
        fill_opacity: columns
            .fill_opacity
            .filter(|v| v.is_finite())
            .or_else(|| blob.number("fillOpacity"))
            .unwrap_or(defaults.fill_opacity),
        show_legend: flag_from_column(columns.show_legend)
            .or_else(|| blob.flag("showLegend"))
            .unwrap_or(defaults.show_legend),
        show_grid_lines: flag_from_column(columns.show_grid_lines)
            .or_else(|| blob.flag("showGridLines"))
            .or_else(|| blob.flag("showGridlines"))
            .unwrap_or(defaults.show_grid_lines),
        show_data_labels: flag_from_column(columns.show_data_labels)
            .or_else(|| blob.flag("showDataLabels"))
            .unwrap_or(defaults.show_data_labels),
        primary_label: text_from_column(&columns.primary_label)
            .or_else(|| blob.text("primaryLabel"))
            .or_else(|| defaults.primary_label.clone()),
        secondary_label: text_from_column(&columns.secondary_label)
            .or_else(|| blob.text("secondaryLabel"))
            .or_else(|| defaults.secondary_label.clone()),
        primary_series_type: columns
            .primary_series_type
            .as_deref()
            .and_then(SeriesType::parse)
            .or_else(|| blob.series("primarySeriesType"))
            .unwrap_or(defaults.primary_series_type),
        secondary_series_type: columns
            .secondary_series_type
            .as_deref()
            .and_then(SeriesType::parse)
            .or_else(|| blob.series("secondarySeriesType"))
            .unwrap_or(defaults.secondary_series_type),
        subtitle_styling: flag_from_column(columns.subtitle_styling)
            .or_else(|| blob.flag("subtitleStyling"))
            .unwrap_or(defaults.subtitle_styling),
        sync_axes: flag_from_column(columns.sync_axes)
            .or_else(|| blob.flag("syncAxes"))
            .unwrap_or(defaults.sync_axes),
    }
}

fn parse_settings_blob(settings_json: Option<&str>) -> Map<String, Value> {
    let Some(raw) = settings_json.map(str::trim).filter(|s| !s.is_empty()) else {
        return Map::new();
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(kind = json_kind(&other), "settings blob is not an object, ignoring");
            Map::new()
        }
        Err(err) => {
            warn!(error = %err, "settings blob is not valid JSON, ignoring");
            Map::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

struct BlobView<'a>(&'a Map<String, Value>);

impl BlobView<'_> {
    fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(coerce_finite)
    }

    fn text(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn flag(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|v| v != 0.0),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    fn series(&self, key: &str) -> Option<SeriesType> {
        self.0.get(key).and_then(Value::as_str).and_then(SeriesType::parse)
    }
}
