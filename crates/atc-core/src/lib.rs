//! `atc-core` — foundational types for the `atc` adaptive traffic-control
//! workspace.
//!
//! This crate is a dependency of every other `atc-*` crate.  It intentionally
//! has no `atc-*` dependencies and minimal external ones (only `chrono`,
//! `rand`, `serde`, and `thiserror`).
//!
//! # What lives here
//!
//! | Module    | Contents                                                  |
//! |-----------|-----------------------------------------------------------|
//! | [`ids`]   | `RoadId`, `VehicleId`, `OdPairId`, `RunId`                |
//! | [`geo`]   | `CartPoint`, `GeoPoint`, flat-earth projection            |
//! | [`clock`] | Local-time day-of-week / half-hour-slot bucketing         |
//! | [`rng`]   | `SimRng` — deterministic seeded RNG with child derivation |
//! | [`error`] | `CoreError`, `CoreResult`                                 |

pub mod clock;
pub mod error;
pub mod geo;
pub mod ids;
pub mod rng;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use clock::{
    DayOfWeek, TimeSlot, day_and_slot, day_and_slot_at, day_of_week, local_offset_secs, now_unix,
    slot_label, time_slot,
};
pub use error::{CoreError, CoreResult};
pub use geo::{CartPoint, GeoPoint};
pub use ids::{OdPairId, RoadId, RunId, VehicleId};
pub use rng::SimRng;
