//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::chart_settings::ChartSettings;
use crate::domain::chart_type::ChartTypeClass;
use crate::domain::date_normalizer::date_key;
use crate::domain::error::KpiError;
use crate::domain::kpi::KpiRecord;
use crate::domain::metric_persister::IncomingMetricPoint;
use crate::domain::value_accessors::{get_display_value, value_to_chart_data};
use crate::domain::value_normalizer::normalize_value_for_chart_type;
use crate::ports::config_port::ConfigPort;
use crate::ports::metric_store_port::MetricStorePort;
use crate::telemetry;
use crate::update_service::{KpiWriteLocks, apply_metric_update};

#[derive(Parser, Debug)]
#[command(name = "kpiboard", about = "KPI metric normalization and storage")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database schema
    Init {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create or replace a KPI definition
    AddKpi {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        chart_type: Option<String>,
        #[arg(long)]
        visualization_type: Option<String>,
        #[arg(long)]
        settings_json: Option<String>,
    },
    /// List KPIs with their current display value
    List {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Apply an update payload (JSON array of points, or null) to a KPI
    Update {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        kpi: String,
        /// Payload file, or `-` for stdin
        #[arg(short, long)]
        payload: PathBuf,
    },
    /// Show a KPI's summary, history and resolved chart settings
    Show {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        kpi: String,
    },
    /// Print the canonical form of a value for a chart type
    Normalize {
        #[arg(long)]
        chart_type: Option<String>,
        /// JSON value; bare text is treated as a string
        #[arg(long)]
        value: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Init { config } => run_init(&config),
        Command::AddKpi {
            config,
            id,
            name,
            chart_type,
            visualization_type,
            settings_json,
        } => {
            let mut record = KpiRecord::new(id, name);
            record.chart_type = chart_type;
            record.visualization_type = visualization_type;
            record.settings_json = settings_json;
            run_add_kpi(&config, record)
        }
        Command::List { config } => run_list(&config),
        Command::Update {
            config,
            kpi,
            payload,
        } => run_update(&config, &kpi, &payload),
        Command::Show { config, kpi } => run_show(&config, &kpi),
        Command::Normalize { chart_type, value } => {
            telemetry::init_tracing(None);
            run_normalize(chart_type.as_deref(), &value)
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    let adapter = FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })?;
    telemetry::init_tracing(adapter.get_string("logging", "filter").as_deref());
    Ok(adapter)
}

#[cfg(feature = "sqlite")]
pub fn open_store(config: &dyn ConfigPort) -> Result<Box<dyn MetricStorePort>, KpiError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let adapter = SqliteAdapter::from_config(config)?;
    adapter.initialize_schema()?;
    Ok(Box::new(adapter))
}

#[cfg(not(feature = "sqlite"))]
pub fn open_store(_config: &dyn ConfigPort) -> Result<Box<dyn MetricStorePort>, KpiError> {
    Err(KpiError::Database {
        reason: "sqlite feature is required for persistent storage".into(),
    })
}

type LoadedStore = (FileConfigAdapter, Box<dyn MetricStorePort>);

fn load_store(config_path: &Path) -> Result<LoadedStore, ExitCode> {
    let config = load_config(config_path)?;
    let store = open_store(&config).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })?;
    Ok((config, store))
}

/// Parses an update payload. `null` means "leave history alone"; a single
/// object is treated as a one-point batch.
pub fn parse_payload(text: &str) -> Result<Option<Vec<IncomingMetricPoint>>, KpiError> {
    let raw: Value = serde_json::from_str(text).map_err(|e| KpiError::InvalidPayload {
        reason: e.to_string(),
    })?;

    let points = match raw {
        Value::Null => return Ok(None),
        Value::Array(_) => serde_json::from_value(raw),
        Value::Object(_) => serde_json::from_value(raw).map(|point| vec![point]),
        other => {
            return Err(KpiError::InvalidPayload {
                reason: format!("expected an array of points or null, got {other}"),
            });
        }
    };

    points.map(Some).map_err(|e| KpiError::InvalidPayload {
        reason: e.to_string(),
    })
}

fn read_payload(path: &Path) -> Result<String, KpiError> {
    if path == Path::new("-") {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

/// Reads a `--value` argument: JSON when it parses, otherwise the raw text.
pub fn parse_value_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn run_init(config_path: &Path) -> ExitCode {
    match load_store(config_path) {
        Ok(_) => {
            eprintln!("Schema ready");
            ExitCode::SUCCESS
        }
        Err(code) => code,
    }
}

fn run_add_kpi(config_path: &Path, record: KpiRecord) -> ExitCode {
    let (_config, store) = match load_store(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    // Re-saving a definition must not drop the stored summary.
    let mut record = record;
    match store.fetch_kpi(&record.id) {
        Ok(existing) => record.summary = existing.and_then(|k| k.summary),
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    }

    if let Err(e) = store.save_kpi(&record) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    eprintln!(
        "Saved KPI {} ({} chart)",
        record.id,
        record.chart_class()
    );
    ExitCode::SUCCESS
}

fn run_list(config_path: &Path) -> ExitCode {
    let (_config, store) = match load_store(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let kpis = match store.list_kpis() {
        Ok(k) => k,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    if kpis.is_empty() {
        eprintln!("No KPIs defined");
    }
    for kpi in &kpis {
        let display = kpi
            .summary
            .as_ref()
            .map(|s| get_display_value(&s.value_map()))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\t{}\t{}\t{}",
            kpi.id,
            kpi.name,
            kpi.effective_chart_type().unwrap_or("-"),
            display
        );
    }
    ExitCode::SUCCESS
}

fn run_update(config_path: &Path, kpi_id: &str, payload_path: &Path) -> ExitCode {
    let (_config, store) = match load_store(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let incoming = match read_payload(payload_path).and_then(|text| parse_payload(&text)) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let locks = KpiWriteLocks::new();
    let result = match apply_metric_update(store.as_ref(), &locks, kpi_id, incoming.as_deref()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    match incoming {
        None => eprintln!("No change requested for {}", kpi_id),
        Some(_) if result.is_empty() => {
            eprintln!("No usable points for {}; history unchanged", kpi_id)
        }
        Some(points) => eprintln!(
            "{}: {} point(s) in, {} row(s) written, latest {}",
            kpi_id,
            points.len(),
            result.points.len(),
            result.latest_date.map(date_key).unwrap_or_default()
        ),
    }
    ExitCode::SUCCESS
}

fn run_show(config_path: &Path, kpi_id: &str) -> ExitCode {
    let (config, store) = match load_store(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let kpi = match store.fetch_kpi(kpi_id) {
        Ok(Some(k)) => k,
        Ok(None) => {
            let err = KpiError::KpiNotFound { id: kpi_id.into() };
            eprintln!("error: {err}");
            return (&err).into();
        }
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let history = match store.fetch_history(kpi_id) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    println!("{} ({})", kpi.name, kpi.id);
    println!(
        "  chart: {} [{}]",
        kpi.effective_chart_type().unwrap_or("-"),
        kpi.chart_class()
    );

    match &kpi.summary {
        Some(summary) => {
            let map = summary.value_map();
            println!("  value: {}", get_display_value(&map));
            println!("  latest: {}", date_key(summary.latest_date));
            if kpi.chart_class() != ChartTypeClass::Single {
                for datum in value_to_chart_data(&map) {
                    println!("    {}: {}", datum.label, datum.value);
                }
            }
        }
        None => println!("  value: -"),
    }

    println!("  history:");
    for row in &history {
        let value = serde_json::to_string(&row.value).unwrap_or_default();
        match &row.color {
            Some(color) => println!("    {}  {}  {}", date_key(row.date), value, color),
            None => println!("    {}  {}", date_key(row.date), value),
        }
    }

    let settings = kpi.resolved_settings(&ChartSettings::defaults_from_config(&config));
    match serde_json::to_string_pretty(&settings) {
        Ok(json) => println!("  settings: {}", json),
        Err(e) => eprintln!("warning: could not render settings: {e}"),
    }
    ExitCode::SUCCESS
}

fn run_normalize(chart_type: Option<&str>, raw: &str) -> ExitCode {
    let value = parse_value_arg(raw);
    let canonical = normalize_value_for_chart_type(chart_type, &value);
    match serde_json::to_string(&canonical) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}
