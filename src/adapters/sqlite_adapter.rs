//! SQLite storage adapter.

use crate::domain::chart_settings::ChartSettingsColumns;
use crate::domain::date_normalizer::{DATE_KEY_FORMAT, date_key};
use crate::domain::error::KpiError;
use crate::domain::kpi::{KpiRecord, KpiSummary};
use crate::domain::metric_persister::PersistedMetricRow;
use crate::domain::value::CanonicalValue;
use crate::ports::config_port::ConfigPort;
use crate::ports::metric_store_port::MetricStorePort;
use chrono::NaiveDate;
use indexmap::IndexMap;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

const KPI_COLUMNS: &str = "id, name, chart_type, visualization_type,
    latest_value, value_json, latest_date, settings_json,
    stroke_width, stroke_color, stroke_opacity, fill_opacity,
    show_legend, show_grid_lines, show_data_labels,
    primary_label, secondary_label, primary_series_type, secondary_series_type,
    subtitle_styling, sync_axes";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_err(e: r2d2::Error) -> KpiError {
    KpiError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> KpiError {
    KpiError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn conversion_failure(
    column: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e))
}

fn parse_date_column(column: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_KEY_FORMAT).map_err(|e| conversion_failure(column, e))
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, KpiError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| KpiError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4);
        let pool_size = u32::try_from(pool_size)
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| KpiError::ConfigInvalid {
                section: "sqlite".into(),
                key: "pool_size".into(),
                reason: format!("must be between 1 and {}, got {pool_size}", u32::MAX),
            })?;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        debug!(path = %db_path, pool_size, "opened sqlite store");
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, KpiError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(pool_err)?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, KpiError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), KpiError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kpis (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                chart_type TEXT,
                visualization_type TEXT,
                latest_value REAL,
                value_json TEXT,
                latest_date TEXT,
                settings_json TEXT,
                stroke_width REAL,
                stroke_color TEXT,
                stroke_opacity REAL,
                fill_opacity REAL,
                show_legend INTEGER,
                show_grid_lines INTEGER,
                show_data_labels INTEGER,
                primary_label TEXT,
                secondary_label TEXT,
                primary_series_type TEXT,
                secondary_series_type TEXT,
                subtitle_styling INTEGER,
                sync_axes INTEGER
            );
            CREATE TABLE IF NOT EXISTS kpi_metrics (
                kpi_id TEXT NOT NULL,
                date TEXT NOT NULL,
                value TEXT NOT NULL,
                color TEXT,
                PRIMARY KEY (kpi_id, date)
            );
            CREATE INDEX IF NOT EXISTS idx_kpi_metrics_date ON kpi_metrics(date);",
        )
        .map_err(query_err)?;

        Ok(())
    }

    fn kpi_from_row(row: &Row<'_>) -> rusqlite::Result<KpiRecord> {
        let latest_value: Option<f64> = row.get(4)?;
        let value_json: Option<String> = row.get(5)?;
        let latest_date: Option<String> = row.get(6)?;

        let summary = match latest_date {
            Some(raw) => {
                let latest_date = parse_date_column(6, &raw)?;
                let value_json: IndexMap<String, f64> = match value_json {
                    Some(text) => {
                        serde_json::from_str(&text).map_err(|e| conversion_failure(5, e))?
                    }
                    None => IndexMap::new(),
                };
                Some(KpiSummary {
                    latest_value,
                    value_json,
                    latest_date,
                })
            }
            None => None,
        };

        Ok(KpiRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            chart_type: row.get(2)?,
            visualization_type: row.get(3)?,
            settings_json: row.get(7)?,
            settings: ChartSettingsColumns {
                stroke_width: row.get(8)?,
                stroke_color: row.get(9)?,
                stroke_opacity: row.get(10)?,
                fill_opacity: row.get(11)?,
                show_legend: row.get(12)?,
                show_grid_lines: row.get(13)?,
                show_data_labels: row.get(14)?,
                primary_label: row.get(15)?,
                secondary_label: row.get(16)?,
                primary_series_type: row.get(17)?,
                secondary_series_type: row.get(18)?,
                subtitle_styling: row.get(19)?,
                sync_axes: row.get(20)?,
            },
            summary,
        })
    }

    fn metric_from_row(row: &Row<'_>) -> rusqlite::Result<PersistedMetricRow> {
        let date_str: String = row.get(1)?;
        let value_str: String = row.get(2)?;
        let value: CanonicalValue =
            serde_json::from_str(&value_str).map_err(|e| conversion_failure(2, e))?;
        Ok(PersistedMetricRow {
            kpi_id: row.get(0)?,
            date: parse_date_column(1, &date_str)?,
            value,
            color: row.get(3)?,
        })
    }
}

type SummaryColumns = (Option<f64>, Option<String>, Option<String>);

fn summary_columns(summary: Option<&KpiSummary>) -> Result<SummaryColumns, KpiError> {
    match summary {
        Some(s) => {
            let value_json =
                serde_json::to_string(&s.value_json).map_err(|e| KpiError::DatabaseQuery {
                    reason: format!("failed to encode value_json: {e}"),
                })?;
            Ok((s.latest_value, Some(value_json), Some(date_key(s.latest_date))))
        }
        None => Ok((None, None, None)),
    }
}

fn insert_rows(
    conn: &Connection,
    kpi_id: &str,
    rows: &[PersistedMetricRow],
) -> Result<(), KpiError> {
    for row in rows {
        let value = serde_json::to_string(&row.value).map_err(|e| KpiError::DatabaseQuery {
            reason: format!("failed to encode metric value: {e}"),
        })?;
        conn.execute(
            "INSERT OR REPLACE INTO kpi_metrics (kpi_id, date, value, color)
             VALUES (?1, ?2, ?3, ?4)",
            params![kpi_id, date_key(row.date), value, row.color],
        )
        .map_err(query_err)?;
    }
    Ok(())
}

fn write_summary(conn: &Connection, kpi_id: &str, summary: &KpiSummary) -> Result<(), KpiError> {
    let (latest_value, value_json, latest_date) = summary_columns(Some(summary))?;
    let updated = conn
        .execute(
            "UPDATE kpis SET latest_value = ?2, value_json = ?3, latest_date = ?4 WHERE id = ?1",
            params![kpi_id, latest_value, value_json, latest_date],
        )
        .map_err(query_err)?;

    if updated == 0 {
        return Err(KpiError::KpiNotFound { id: kpi_id.into() });
    }
    Ok(())
}

impl MetricStorePort for SqliteAdapter {
    fn fetch_kpi(&self, kpi_id: &str) -> Result<Option<KpiRecord>, KpiError> {
        let conn = self.conn()?;
        let query = format!("SELECT {KPI_COLUMNS} FROM kpis WHERE id = ?1");
        conn.query_row(&query, params![kpi_id], Self::kpi_from_row)
            .optional()
            .map_err(query_err)
    }

    fn list_kpis(&self) -> Result<Vec<KpiRecord>, KpiError> {
        let conn = self.conn()?;
        let query = format!("SELECT {KPI_COLUMNS} FROM kpis ORDER BY id");
        let mut stmt = conn.prepare(&query).map_err(query_err)?;
        let rows = stmt.query_map([], Self::kpi_from_row).map_err(query_err)?;

        let mut kpis = Vec::new();
        for row in rows {
            kpis.push(row.map_err(query_err)?);
        }
        Ok(kpis)
    }

    fn save_kpi(&self, record: &KpiRecord) -> Result<(), KpiError> {
        let conn = self.conn()?;
        let (latest_value, value_json, latest_date) = summary_columns(record.summary.as_ref())?;
        let s = &record.settings;

        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO kpis ({KPI_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                         ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)"
            ),
            params![
                record.id,
                record.name,
                record.chart_type,
                record.visualization_type,
                latest_value,
                value_json,
                latest_date,
                record.settings_json,
                s.stroke_width,
                s.stroke_color,
                s.stroke_opacity,
                s.fill_opacity,
                s.show_legend,
                s.show_grid_lines,
                s.show_data_labels,
                s.primary_label,
                s.secondary_label,
                s.primary_series_type,
                s.secondary_series_type,
                s.subtitle_styling,
                s.sync_axes
            ],
        )
        .map_err(query_err)?;

        Ok(())
    }

    fn upsert_metrics(&self, kpi_id: &str, rows: &[PersistedMetricRow]) -> Result<(), KpiError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        insert_rows(&tx, kpi_id, rows)?;
        tx.commit().map_err(query_err)?;
        debug!(kpi_id, rows = rows.len(), "upserted metric rows");
        Ok(())
    }

    fn update_summary(&self, kpi_id: &str, summary: &KpiSummary) -> Result<(), KpiError> {
        let conn = self.conn()?;
        write_summary(&conn, kpi_id, summary)
    }

    /// Rows and summary commit in one transaction; any failure rolls back both.
    fn write_batch(
        &self,
        kpi_id: &str,
        rows: &[PersistedMetricRow],
        summary: Option<&KpiSummary>,
    ) -> Result<(), KpiError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        insert_rows(&tx, kpi_id, rows)?;
        if let Some(summary) = summary {
            write_summary(&tx, kpi_id, summary)?;
        }
        tx.commit().map_err(query_err)?;
        debug!(
            kpi_id,
            rows = rows.len(),
            summary = summary.is_some(),
            "committed metric batch"
        );
        Ok(())
    }

    fn fetch_history(&self, kpi_id: &str) -> Result<Vec<PersistedMetricRow>, KpiError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT kpi_id, date, value, color FROM kpi_metrics
                 WHERE kpi_id = ?1 ORDER BY date ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![kpi_id], Self::metric_from_row)
            .map_err(query_err)?;

        let mut history = Vec::new();
        for row in rows {
            history.push(row.map_err(query_err)?);
        }
        Ok(history)
    }
}
