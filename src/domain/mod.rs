//! Core domain types and logic: the value normalization and persistence
//! pipeline plus its read-side helpers. Pure and synchronous throughout.

pub mod chart_settings;
pub mod chart_type;
pub mod date_normalizer;
pub mod error;
pub mod kpi;
pub mod metric_persister;
pub mod value;
pub mod value_accessors;
pub mod value_normalizer;
