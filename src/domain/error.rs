//! Domain error types.
//!
//! Normalization never fails; these only surface at the I/O edges
//! (configuration, storage, payload files).

/// Top-level error type for kpiboard.
#[derive(Debug, thiserror::Error)]
pub enum KpiError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("kpi not found: {id}")]
    KpiNotFound { id: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&KpiError> for std::process::ExitCode {
    fn from(err: &KpiError) -> Self {
        let code: u8 = match err {
            KpiError::Io(_) => 1,
            KpiError::ConfigParse { .. }
            | KpiError::ConfigMissing { .. }
            | KpiError::ConfigInvalid { .. } => 2,
            KpiError::Database { .. } | KpiError::DatabaseQuery { .. } => 3,
            KpiError::InvalidPayload { .. } => 4,
            KpiError::KpiNotFound { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
