//! kpiboard — metric value normalization and persistence for a KPI dashboard.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod update_service;
pub mod telemetry;
pub mod cli;
