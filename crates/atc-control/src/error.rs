//! Control error type.

use thiserror::Error;

use atc_core::RunId;
use atc_optimize::OptimizeError;
use atc_pattern::StorageError;
use atc_predict::PredictError;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("continuous optimization already running")]
    AlreadyRunning,

    #[error("predictive mode requested but no predictor is configured")]
    PredictorUnavailable,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("optimization run {0} not found")]
    RunNotFound(RunId),

    #[error("optimization run {0} is not completed")]
    NotCompleted(RunId),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Optimize(#[from] OptimizeError),

    #[error(transparent)]
    Predict(#[from] PredictError),
}

pub type ControlResult<T> = Result<T, ControlError>;
