//! Aggregated simulation metrics and the fitness scalar.
//!
//! The collector samples the road map at a fixed step interval and
//! accumulates; the averages are divided out once at the end of a run via
//! [`MetricsCollector::finalized`].  Fitness is a fixed-weight combination
//! (lower is better) — the exact weights are internal, but they are stable
//! within a run so that GA comparisons stay monotone.

use atc_core::RoadId;
use atc_sim::sim::CityMap;

/// Fitness returned when no samples were ever taken — a degenerate
/// configuration must never look attractive to the optimizer.
const EMPTY_PENALTY: f64 = 1e6;

/// City speed a network "should" sustain; shortfall is penalized.
const TARGET_SPEED: f64 = 15.0;

const W_AVG_QUEUE: f64 = 10.0;
const W_MAX_QUEUE: f64 = 2.0;
const W_SPEED_DEFICIT: f64 = 1.0;
const W_EXITS: f64 = 0.5;

/// Accumulated (or finalized) performance metrics of one simulation run.
#[derive(Copy, Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimulationMetrics {
    /// Mean vehicles queued at red lights, averaged per road per sample.
    pub average_queue_length: f64,
    /// Largest per-road queue observed in any sample.
    pub max_queue_length: f64,
    /// Vehicles present at the last sample.
    pub total_vehicles: f64,
    /// Vehicles that completed their route.
    pub vehicles_exited: f64,
    /// Mean vehicle speed, m/s.
    pub average_speed: f64,
    /// Samples accumulated.
    pub sample_count: u32,
}

impl SimulationMetrics {
    /// Fitness scalar, lower is better.
    ///
    /// Expects finalized (averaged) metrics.  Queues raise the score,
    /// completed routes lower it, and a mean speed below [`TARGET_SPEED`]
    /// is charged for the shortfall.
    pub fn fitness(&self) -> f64 {
        if self.sample_count == 0 {
            return EMPTY_PENALTY;
        }
        let speed_deficit = (TARGET_SPEED - self.average_speed).max(0.0);
        W_AVG_QUEUE * self.average_queue_length
            + W_MAX_QUEUE * self.max_queue_length
            + W_SPEED_DEFICIT * speed_deficit
            - W_EXITS * self.vehicles_exited
    }
}

/// Per-road observation for one snapshot instant.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RoadMetrics {
    pub road: RoadId,
    pub vehicle_count: u32,
    pub queue_length: f64,
    pub avg_speed: f64,
    /// Vehicles per minute leaving the road.
    // TODO: derive from per-road exit counters once Road tracks them; the
    // network-wide exit count cannot be attributed to a single road.
    pub flow_rate: f64,
}

/// Current per-road metrics for every road in the map.
pub fn road_metrics(map: &CityMap) -> Vec<RoadMetrics> {
    map.iter()
        .map(|(&road, r)| RoadMetrics {
            road,
            vehicle_count: r.vehicle_count() as u32,
            queue_length: r.queue_length() as f64,
            avg_speed: r.mean_velocity(),
            flow_rate: 0.0,
        })
        .collect()
}

/// Accumulates metrics over a simulation run.
#[derive(Clone, Debug, Default)]
pub struct MetricsCollector {
    metrics: SimulationMetrics,
}

impl MetricsCollector {
    pub fn new() -> MetricsCollector {
        MetricsCollector::default()
    }

    /// Take one sample of the road map.
    pub fn collect(&mut self, map: &CityMap) {
        if map.is_empty() {
            return;
        }

        let mut queue_total = 0usize;
        let mut queue_max = 0usize;
        let mut speed_total = 0.0;
        let mut vehicle_total = 0usize;

        for road in map.values() {
            let queued = road.queue_length();
            queue_total += queued;
            queue_max = queue_max.max(queued);
            vehicle_total += road.vehicle_count();
            speed_total += road
                .vehicles()
                .iter()
                .flatten()
                .map(atc_sim::Vehicle::velocity)
                .sum::<f64>();
        }

        let mean_speed = if vehicle_total > 0 {
            speed_total / vehicle_total as f64
        } else {
            0.0
        };

        self.metrics.average_queue_length += queue_total as f64 / map.len() as f64;
        self.metrics.average_speed += mean_speed;
        self.metrics.max_queue_length = self.metrics.max_queue_length.max(queue_max as f64);
        self.metrics.total_vehicles = vehicle_total as f64;
        self.metrics.sample_count += 1;
    }

    /// Credit vehicles that left the network (from a tick report).
    pub fn record_exits(&mut self, exited: u32) {
        self.metrics.vehicles_exited += exited as f64;
    }

    /// Raw accumulators.
    pub fn metrics(&self) -> SimulationMetrics {
        self.metrics
    }

    /// Metrics with the accumulated averages divided by the sample count.
    pub fn finalized(&self) -> SimulationMetrics {
        let mut metrics = self.metrics;
        if metrics.sample_count > 0 {
            metrics.average_queue_length /= metrics.sample_count as f64;
            metrics.average_speed /= metrics.sample_count as f64;
        }
        metrics
    }

    pub fn reset(&mut self) {
        self.metrics = SimulationMetrics::default();
    }
}
