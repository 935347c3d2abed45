//! Storage port for KPI records and their metric history.

use crate::domain::error::KpiError;
use crate::domain::kpi::{KpiRecord, KpiSummary};
use crate::domain::metric_persister::PersistedMetricRow;

/// Storage collaborator for the persistence pipeline.
///
/// `upsert_metrics` and `update_summary` are not ordered across calls: the
/// one-row-per-`(kpi_id, date)` guarantee only holds if writers for the same
/// KPI are serialized, e.g. through
/// [`KpiWriteLocks`](crate::update_service::KpiWriteLocks).
pub trait MetricStorePort: Send + Sync {
    fn fetch_kpi(&self, kpi_id: &str) -> Result<Option<KpiRecord>, KpiError>;

    fn list_kpis(&self) -> Result<Vec<KpiRecord>, KpiError>;

    /// Inserts or replaces the KPI definition. Stored summary fields are
    /// written from `record.summary`.
    fn save_kpi(&self, record: &KpiRecord) -> Result<(), KpiError>;

    /// Insert-or-replace keyed by `(kpi_id, date)`.
    fn upsert_metrics(&self, kpi_id: &str, rows: &[PersistedMetricRow]) -> Result<(), KpiError>;

    fn update_summary(&self, kpi_id: &str, summary: &KpiSummary) -> Result<(), KpiError>;

    /// Writes one batch's rows and, when given, the new summary as a unit.
    ///
    /// Adapters that can commit both together override this. The fallback
    /// writes rows first, so a failed summary leaves the rows in place.
    fn write_batch(
        &self,
        kpi_id: &str,
        rows: &[PersistedMetricRow],
        summary: Option<&KpiSummary>,
    ) -> Result<(), KpiError> {
        self.upsert_metrics(kpi_id, rows)?;
        match summary {
            Some(summary) => self.update_summary(kpi_id, summary),
            None => Ok(()),
        }
    }

    /// All rows for the KPI in ascending date order.
    fn fetch_history(&self, kpi_id: &str) -> Result<Vec<PersistedMetricRow>, KpiError>;
}
