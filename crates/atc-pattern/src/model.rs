//! Row types of the pattern database.

use atc_core::{DayOfWeek, RoadId, RunId, TimeSlot};

/// One sampled row of per-road state.
#[derive(Clone, Debug, PartialEq)]
pub struct TrafficSnapshot {
    pub timestamp: i64,
    pub road: RoadId,
    pub vehicle_count: u32,
    pub queue_length: f64,
    pub avg_speed: f64,
    pub flow_rate: f64,
}

/// Aggregated traffic pattern for one `(road, day-of-week, slot)` bucket.
#[derive(Clone, Debug, PartialEq)]
pub struct TrafficPattern {
    pub road: RoadId,
    pub day_of_week: DayOfWeek,
    pub time_slot: TimeSlot,
    pub avg_vehicle_count: f64,
    pub avg_queue_length: f64,
    pub avg_speed: f64,
    pub avg_flow_rate: f64,
    pub min_vehicle_count: f64,
    pub max_vehicle_count: f64,
    pub stddev_vehicle_count: f64,
    pub sample_count: u32,
    pub last_updated: i64,
}

/// Snapshot recording and aggregation knobs.
#[derive(Copy, Clone, Debug)]
pub struct PatternConfig {
    /// Wall-clock seconds between snapshot batches.
    pub snapshot_interval_secs: u64,
    /// Raw snapshots older than this are pruned.
    pub retention_days: u32,
    /// Buckets with fewer samples don't become patterns.
    pub min_samples_for_pattern: u32,
}

impl Default for PatternConfig {
    fn default() -> Self {
        PatternConfig {
            snapshot_interval_secs: 60,
            retention_days: 7,
            min_samples_for_pattern: 3,
        }
    }
}

/// A persisted optimization run.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationRun {
    pub id: RunId,
    /// "completed" | "error" | "running".
    pub status: String,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub population_size: u32,
    pub generations: u32,
    pub simulation_steps: u32,
    pub baseline_fitness: Option<f64>,
    pub best_fitness: Option<f64>,
    pub improvement_percent: Option<f64>,
}

/// A persisted chromosome attached to a run.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredSolution {
    pub id: i64,
    pub run: RunId,
    pub fitness: f64,
    /// Canonical JSON array of `{"greenTime", "redTime"}` objects.
    pub chromosome_json: String,
    pub light_count: u32,
    pub is_best: bool,
    pub created_at: i64,
}

/// A named bundle of spawn rates and light timings.
///
/// Payloads are opaque JSON here; the control surface owns their shape.
#[derive(Clone, Debug, PartialEq)]
pub struct TrafficProfile {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub spawn_rates_json: String,
    pub light_timings_json: String,
    /// At most one profile is active at a time.
    pub active: bool,
    pub created_at: i64,
}
