//! Chart-type classification.
//!
//! The chart-type tag alone decides which canonical value shape a KPI
//! stores. Unknown and absent tags fall back to [`ChartTypeClass::Single`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tags whose canonical value is a category set.
pub const MULTI_VALUE_CHART_TYPES: &[&str] =
    &["radar", "bar", "column", "pie", "donut", "radialBar"];

/// The dual-axis line tag.
pub const MULTI_AXIS_LINE: &str = "multiAxisLine";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartTypeClass {
    /// One scalar per date (numbers, text, line/area/scatter/heatmap series).
    #[default]
    Single,
    /// A numeric array or labeled-value array per date.
    Multi,
    /// Exactly `[primary, secondary]` per date.
    MultiAxisLine,
}

impl ChartTypeClass {
    pub fn classify(chart_type: Option<&str>) -> Self {
        match chart_type.map(str::trim) {
            Some(MULTI_AXIS_LINE) => ChartTypeClass::MultiAxisLine,
            Some(tag) if MULTI_VALUE_CHART_TYPES.contains(&tag) => ChartTypeClass::Multi,
            _ => ChartTypeClass::Single,
        }
    }

    pub fn is_multi(self) -> bool {
        self == ChartTypeClass::Multi
    }
}

impl fmt::Display for ChartTypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChartTypeClass::Single => "single",
            ChartTypeClass::Multi => "multi",
            ChartTypeClass::MultiAxisLine => "multiAxisLine",
        };
        f.write_str(name)
    }
}

/// Resolves the tag a KPI is rendered with: `chartType` first, then the
/// older `visualizationType`. Blank tags count as absent.
pub fn effective_chart_type<'a>(
    chart_type: Option<&'a str>,
    visualization_type: Option<&'a str>,
) -> Option<&'a str> {
    chart_type
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| visualization_type.map(str::trim).filter(|t| !t.is_empty()))
}
