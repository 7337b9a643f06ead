//! Optimization error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("invalid GA parameters: {0}")]
    InvalidParams(String),

    #[error("chromosome serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OptimizeResult<T> = Result<T, OptimizeError>;
