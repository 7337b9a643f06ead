//! Shared error base.
//!
//! Sub-crates define their own error enums and either convert into
//! `CoreError` via `From` impls or wrap it as one variant.  Both patterns
//! are acceptable; prefer whichever keeps error sites clean.

use thiserror::Error;

use crate::RoadId;

/// The common error base for the `atc-*` crates.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("road {0} not found")]
    RoadNotFound(RoadId),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Shorthand result type.
pub type CoreResult<T> = Result<T, CoreError>;
