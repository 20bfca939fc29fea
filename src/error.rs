//! Error types for rusty-fxlens

use thiserror::Error;

/// Main error type for rusty-fxlens
#[derive(Error, Debug)]
pub enum FxLensError {
    #[error("Provider unavailable ({provider}): {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("Series not found: {series_id} (currency {currency})")]
    SeriesNotFound { currency: String, series_id: String },

    #[error("Insufficient data: need {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store write error for {currency}: {message}")]
    StoreWriteError { currency: String, message: String },

    #[error("Fatal cycle failure: no usable records ({failed} currencies failed)")]
    FatalCycleFailure { failed: usize },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl FxLensError {
    /// True for errors raised by an external provider call.
    ///
    /// The orchestrator downgrades these to null fields on the affected record.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            FxLensError::ProviderUnavailable { .. }
                | FxLensError::RateLimited { .. }
                | FxLensError::SeriesNotFound { .. }
                | FxLensError::ValidationError(_)
                | FxLensError::Timeout(_)
        )
    }

    /// Short, stable label used in logs and cycle reports
    pub fn kind(&self) -> &'static str {
        match self {
            FxLensError::ProviderUnavailable { .. } => "provider_unavailable",
            FxLensError::RateLimited { .. } => "rate_limited",
            FxLensError::SeriesNotFound { .. } => "series_not_found",
            FxLensError::InsufficientData { .. } => "insufficient_data",
            FxLensError::ValidationError(_) => "validation_error",
            FxLensError::StoreWriteError { .. } => "store_write_error",
            FxLensError::FatalCycleFailure { .. } => "fatal_cycle_failure",
            FxLensError::NotFound(_) => "not_found",
            FxLensError::Timeout(_) => "timeout",
            FxLensError::ConfigError(_) => "config_error",
            FxLensError::StorageError(_) => "storage_error",
            FxLensError::IoError(_) => "io_error",
            FxLensError::SerdeError(_) => "serde_error",
        }
    }
}

/// Result type alias for rusty-fxlens operations
pub type Result<T> = std::result::Result<T, FxLensError>;
