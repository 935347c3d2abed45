//! KPI records as the storage collaborator holds them.

use crate::domain::chart_settings::{ChartSettings, ChartSettingsColumns, resolve_chart_settings};
use crate::domain::chart_type::{ChartTypeClass, effective_chart_type};
use crate::domain::metric_persister::PersistedMetrics;
use crate::domain::value_accessors::value_map_from_numbers;
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Denormalized summary of the most recent value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSummary {
    pub latest_value: Option<f64>,
    pub value_json: IndexMap<String, f64>,
    pub latest_date: NaiveDate,
}

impl KpiSummary {
    /// `None` when the batch produced no rows.
    pub fn from_metrics(metrics: &PersistedMetrics) -> Option<Self> {
        Some(Self {
            latest_value: metrics.latest_value,
            value_json: metrics.value_json.clone()?,
            latest_date: metrics.latest_date?,
        })
    }

    pub fn value_map(&self) -> Map<String, Value> {
        value_map_from_numbers(&self.value_json)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiRecord {
    pub id: String,
    pub name: String,
    pub chart_type: Option<String>,
    pub visualization_type: Option<String>,
    #[serde(default)]
    pub settings: ChartSettingsColumns,
    pub settings_json: Option<String>,
    pub summary: Option<KpiSummary>,
}

impl KpiRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            chart_type: None,
            visualization_type: None,
            settings: ChartSettingsColumns::default(),
            settings_json: None,
            summary: None,
        }
    }

    pub fn with_chart_type(mut self, chart_type: impl Into<String>) -> Self {
        self.chart_type = Some(chart_type.into());
        self
    }

    pub fn with_visualization_type(mut self, visualization_type: impl Into<String>) -> Self {
        self.visualization_type = Some(visualization_type.into());
        self
    }

    pub fn effective_chart_type(&self) -> Option<&str> {
        effective_chart_type(self.chart_type.as_deref(), self.visualization_type.as_deref())
    }

    pub fn chart_class(&self) -> ChartTypeClass {
        ChartTypeClass::classify(self.effective_chart_type())
    }

    pub fn resolved_settings(&self, defaults: &ChartSettings) -> ChartSettings {
        resolve_chart_settings(&self.settings, self.settings_json.as_deref(), defaults)
    }
}
