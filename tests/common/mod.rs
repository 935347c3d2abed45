#![allow(dead_code)]

use chrono::NaiveDate;
use kpiboard::domain::error::KpiError;
use kpiboard::domain::kpi::{KpiRecord, KpiSummary};
use kpiboard::domain::metric_persister::PersistedMetricRow;
use kpiboard::ports::metric_store_port::MetricStorePort;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Store double that records every write and can be told to fail.
#[derive(Default)]
pub struct MockMetricStore {
    pub kpis: Mutex<HashMap<String, KpiRecord>>,
    pub rows: Mutex<HashMap<String, BTreeMap<NaiveDate, PersistedMetricRow>>>,
    pub writes: Mutex<Vec<String>>,
    pub fail_upserts: bool,
    pub fail_summaries: bool,
}

impl MockMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kpi(self, record: KpiRecord) -> Self {
        self.kpis.lock().unwrap().insert(record.id.clone(), record);
        self
    }

    pub fn failing_upserts(mut self) -> Self {
        self.fail_upserts = true;
        self
    }

    pub fn failing_summaries(mut self) -> Self {
        self.fail_summaries = true;
        self
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

impl MetricStorePort for MockMetricStore {
    fn fetch_kpi(&self, kpi_id: &str) -> Result<Option<KpiRecord>, KpiError> {
        Ok(self.kpis.lock().unwrap().get(kpi_id).cloned())
    }

    fn list_kpis(&self) -> Result<Vec<KpiRecord>, KpiError> {
        Ok(self.kpis.lock().unwrap().values().cloned().collect())
    }

    fn save_kpi(&self, record: &KpiRecord) -> Result<(), KpiError> {
        self.writes.lock().unwrap().push(format!("save_kpi:{}", record.id));
        self.kpis
            .lock()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn upsert_metrics(&self, kpi_id: &str, rows: &[PersistedMetricRow]) -> Result<(), KpiError> {
        if self.fail_upserts {
            return Err(KpiError::DatabaseQuery {
                reason: "disk full".into(),
            });
        }
        self.writes
            .lock()
            .unwrap()
            .push(format!("upsert:{}:{}", kpi_id, rows.len()));
        let mut all = self.rows.lock().unwrap();
        let history = all.entry(kpi_id.to_string()).or_default();
        for row in rows {
            history.insert(row.date, row.clone());
        }
        Ok(())
    }

    fn update_summary(&self, kpi_id: &str, summary: &KpiSummary) -> Result<(), KpiError> {
        if self.fail_summaries {
            return Err(KpiError::DatabaseQuery {
                reason: "summary column locked".into(),
            });
        }
        self.writes.lock().unwrap().push(format!("summary:{}", kpi_id));
        let mut kpis = self.kpis.lock().unwrap();
        let record = kpis
            .get_mut(kpi_id)
            .ok_or_else(|| KpiError::KpiNotFound { id: kpi_id.into() })?;
        record.summary = Some(summary.clone());
        Ok(())
    }

    fn fetch_history(&self, kpi_id: &str) -> Result<Vec<PersistedMetricRow>, KpiError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(kpi_id)
            .map(|h| h.values().cloned().collect())
            .unwrap_or_default())
    }
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn fallback_day() -> NaiveDate {
    day(2030, 1, 1)
}
