//! In-process storage adapter.

use crate::domain::error::KpiError;
use crate::domain::kpi::{KpiRecord, KpiSummary};
use crate::domain::metric_persister::PersistedMetricRow;
use crate::ports::metric_store_port::MetricStorePort;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    kpis: BTreeMap<String, KpiRecord>,
    metrics: HashMap<String, BTreeMap<NaiveDate, PersistedMetricRow>>,
}

/// Map-backed store. Rows are keyed by `(kpi_id, date)` like the SQL schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, KpiError> {
        self.tables.read().map_err(|e| KpiError::Database {
            reason: format!("memory store lock poisoned: {e}"),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, KpiError> {
        self.tables.write().map_err(|e| KpiError::Database {
            reason: format!("memory store lock poisoned: {e}"),
        })
    }
}

impl MetricStorePort for MemoryStore {
    fn fetch_kpi(&self, kpi_id: &str) -> Result<Option<KpiRecord>, KpiError> {
        Ok(self.read()?.kpis.get(kpi_id).cloned())
    }

    fn list_kpis(&self) -> Result<Vec<KpiRecord>, KpiError> {
        Ok(self.read()?.kpis.values().cloned().collect())
    }

    fn save_kpi(&self, record: &KpiRecord) -> Result<(), KpiError> {
        self.write()?.kpis.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn upsert_metrics(&self, kpi_id: &str, rows: &[PersistedMetricRow]) -> Result<(), KpiError> {
        let mut tables = self.write()?;
        let history = tables.metrics.entry(kpi_id.to_string()).or_default();
        for row in rows {
            history.insert(row.date, row.clone());
        }
        Ok(())
    }

    fn update_summary(&self, kpi_id: &str, summary: &KpiSummary) -> Result<(), KpiError> {
        let mut tables = self.write()?;
        let record = tables
            .kpis
            .get_mut(kpi_id)
            .ok_or_else(|| KpiError::KpiNotFound { id: kpi_id.into() })?;
        record.summary = Some(summary.clone());
        Ok(())
    }

    fn write_batch(
        &self,
        kpi_id: &str,
        rows: &[PersistedMetricRow],
        summary: Option<&KpiSummary>,
    ) -> Result<(), KpiError> {
        let mut tables = self.write()?;
        if summary.is_some() && !tables.kpis.contains_key(kpi_id) {
            return Err(KpiError::KpiNotFound { id: kpi_id.into() });
        }

        let history = tables.metrics.entry(kpi_id.to_string()).or_default();
        for row in rows {
            history.insert(row.date, row.clone());
        }
        if let (Some(summary), Some(record)) = (summary, tables.kpis.get_mut(kpi_id)) {
            record.summary = Some(summary.clone());
        }
        Ok(())
    }

    fn fetch_history(&self, kpi_id: &str) -> Result<Vec<PersistedMetricRow>, KpiError> {
        Ok(self
            .read()?
            .metrics
            .get(kpi_id)
            .map(|history| history.values().cloned().collect())
            .unwrap_or_default())
    }
}
