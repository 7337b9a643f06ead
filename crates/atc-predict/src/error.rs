//! Prediction error type.

use thiserror::Error;

use atc_pattern::StorageError;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("predicted network is empty, nothing to optimize")]
    EmptyNetwork,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type PredictResult<T> = Result<T, PredictError>;
