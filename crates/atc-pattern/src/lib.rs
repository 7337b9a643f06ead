//! `atc-pattern` — persistent learning of time-of-day traffic patterns.
//!
//! Periodic per-road snapshots land in a SQLite time-series table; the
//! aggregation pass folds the retention window into `(road, day-of-week,
//! half-hour-slot)` patterns that the predictor reads back.  The same
//! database also keeps optimization runs and their winning chromosomes so a
//! persisted run can be re-applied later.
//!
//! | Module    | Contents                                                  |
//! |-----------|-----------------------------------------------------------|
//! | [`model`] | `TrafficSnapshot`, `TrafficPattern`, run/solution records |
//! | [`store`] | `PatternStore` — the SQLite connection and queries        |

pub mod error;
pub mod model;
pub mod store;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{StorageError, StorageResult};
pub use model::{
    OptimizationRun, PatternConfig, StoredSolution, TrafficPattern, TrafficProfile,
    TrafficSnapshot,
};
pub use store::PatternStore;
