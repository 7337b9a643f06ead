//! `atc-metrics` — observation of the simulated world.
//!
//! | Module          | Contents                                             |
//! |-----------------|------------------------------------------------------|
//! | [`collector`]   | `SimulationMetrics`, `MetricsCollector`, fitness     |
//! | [`travel_time`] | O/D pairs, per-vehicle trackers, percentile stats    |

pub mod collector;
pub mod travel_time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use collector::{MetricsCollector, RoadMetrics, SimulationMetrics, road_metrics};
pub use travel_time::{
    OdPair, TravelTimeCollector, TravelTimeSample, TravelTimeStats,
};
