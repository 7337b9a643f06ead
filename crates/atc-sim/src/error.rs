//! Simulation error type.

use thiserror::Error;

use atc_core::{CoreError, RoadId};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("road {0} not found")]
    RoadNotFound(RoadId),

    #[error("lane {lane} out of range for road {road} ({lanes} lanes)")]
    LaneOutOfRange {
        road: RoadId,
        lane: usize,
        lanes: usize,
    },

    #[error("simulation runner already started")]
    AlreadyRunning,

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type SimResult<T> = Result<T, SimError>;
