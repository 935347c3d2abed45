//! Applies an update batch to a KPI through the storage port.
//!
//! The normalization core is lock-free; this is where writes for one KPI
//! are serialized so the `(kpi_id, date)` uniqueness holds across
//! concurrent callers.

use crate::domain::error::KpiError;
use crate::domain::kpi::KpiSummary;
use crate::domain::metric_persister::{
    IncomingMetricPoint, PersistedMetrics, build_persisted_metrics_at,
};
use crate::domain::date_normalizer::today_utc;
use crate::ports::metric_store_port::MetricStorePort;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Lock table keyed by KPI id. Holding a KPI's guard makes the caller the
/// only writer for that KPI; different KPIs never contend.
#[derive(Default)]
pub struct KpiWriteLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Exclusive write section for one KPI.
pub struct KpiWriteGuard {
    lock: Arc<Mutex<()>>,
}

impl KpiWriteGuard {
    pub fn hold(&self) -> Result<MutexGuard<'_, ()>, KpiError> {
        self.lock.lock().map_err(|e| KpiError::Database {
            reason: format!("kpi write lock poisoned: {e}"),
        })
    }
}

impl KpiWriteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_kpi(&self, kpi_id: &str) -> Result<KpiWriteGuard, KpiError> {
        let mut locks = self.locks.lock().map_err(|e| KpiError::Database {
            reason: format!("kpi lock table poisoned: {e}"),
        })?;
        let lock = locks
            .entry(kpi_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Ok(KpiWriteGuard { lock })
    }
}

/// Normalizes `incoming` for the KPI and writes the result.
///
/// `None` leaves history and summary untouched. A batch that yields no rows
/// writes nothing either. Rows from a batch older than the stored summary
/// are written without replacing that summary.
pub fn apply_metric_update(
    store: &dyn MetricStorePort,
    locks: &KpiWriteLocks,
    kpi_id: &str,
    incoming: Option<&[IncomingMetricPoint]>,
) -> Result<PersistedMetrics, KpiError> {
    apply_metric_update_at(store, locks, kpi_id, incoming, today_utc())
}

pub fn apply_metric_update_at(
    store: &dyn MetricStorePort,
    locks: &KpiWriteLocks,
    kpi_id: &str,
    incoming: Option<&[IncomingMetricPoint]>,
    today: NaiveDate,
) -> Result<PersistedMetrics, KpiError> {
    let kpi = store
        .fetch_kpi(kpi_id)?
        .ok_or_else(|| KpiError::KpiNotFound { id: kpi_id.into() })?;

    if incoming.is_none() {
        debug!(kpi_id, "no history change requested");
        return Ok(PersistedMetrics::default());
    }

    let metrics = build_persisted_metrics_at(kpi_id, kpi.effective_chart_type(), incoming, today);
    let Some(summary) = KpiSummary::from_metrics(&metrics) else {
        warn!(kpi_id, "update produced no rows, keeping existing history");
        return Ok(metrics);
    };

    let guard = locks.for_kpi(kpi_id)?;
    let _held = guard.hold()?;
    let stored = store.fetch_kpi(kpi_id)?.and_then(|k| k.summary);
    let advances = summary_advances(stored.as_ref(), &summary);
    if !advances {
        debug!(
            kpi_id,
            batch_latest = %summary.latest_date,
            "batch is older than the stored summary, keeping it"
        );
    }
    store.write_batch(kpi_id, &metrics.points, advances.then_some(&summary))?;

    debug!(
        kpi_id,
        rows = metrics.points.len(),
        latest_date = %summary.latest_date,
        summary_updated = advances,
        "applied metric update"
    );
    Ok(metrics)
}

/// The summary tracks the newest stored date; a batch for the same date
/// replaces it, an older one does not.
pub fn summary_advances(stored: Option<&KpiSummary>, incoming: &KpiSummary) -> bool {
    stored.is_none_or(|s| incoming.latest_date >= s.latest_date)
}
