//! Blending stored patterns with live state into per-road forecasts.
//!
//! For every road present in either source the forecast is
//!
//!   blended = pattern_weight · pattern_avg + current_weight · current
//!
//! falling back to whichever side exists.  Confidence multiplies a
//! sample-count factor with a variability factor (`1 − stddev/avg`,
//! floored at 0); a road with only live data gets a flat 0.1, a road with
//! nothing gets 0.  Results are cached per horizon for a configurable few
//! seconds because the control surface polls aggressively.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use rustc_hash::FxHashMap;
use tracing::debug;

use atc_core::clock::{self, now_unix};
use atc_core::{DayOfWeek, RoadId, TimeSlot};
use atc_metrics::{RoadMetrics, road_metrics};
use atc_pattern::{PatternStore, TrafficPattern};
use atc_sim::SharedSimulation;

use crate::error::PredictResult;

/// Predictor tuning.
#[derive(Copy, Clone, Debug)]
pub struct PredictionConfig {
    /// Default forecast horizon, minutes.
    pub horizon_minutes: u32,
    /// Hard ceiling on any requested horizon.
    pub max_horizon_minutes: u32,
    /// Weight of the historical pattern in the blend.
    pub pattern_weight: f64,
    /// Weight of the live state in the blend.
    pub current_weight: f64,
    /// Sample count at which the sample factor saturates at 1.
    pub min_samples_for_full_confidence: u32,
    /// Cache lifetime per horizon.
    pub cache_duration_secs: u64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        PredictionConfig {
            horizon_minutes: 30,
            max_horizon_minutes: 120,
            pattern_weight: 0.7,
            current_weight: 0.3,
            min_samples_for_full_confidence: 10,
            cache_duration_secs: 30,
        }
    }
}

impl PredictionConfig {
    /// Scale the two blend weights so they sum to 1.
    fn normalized(mut self) -> Self {
        let total = self.pattern_weight + self.current_weight;
        if total > 0.0 && (total - 1.0).abs() > 1e-3 {
            self.pattern_weight /= total;
            self.current_weight /= total;
        }
        self
    }
}

/// Forecast for one road.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PredictedMetrics {
    pub road: RoadId,
    pub vehicle_count: f64,
    pub queue_length: f64,
    pub avg_speed: f64,
    pub flow_rate: f64,
    /// 0 (no data) … 1 (many consistent samples).
    pub confidence: f64,
    pub has_pattern: bool,
    pub has_current: bool,
    /// Blend inputs kept for transparency.
    pub pattern_vehicle_count: f64,
    pub current_vehicle_count: f64,
    pub historical_samples: u32,
}

/// A full-network forecast.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PredictionResult {
    pub prediction_timestamp: i64,
    pub target_timestamp: i64,
    pub horizon_minutes: u32,
    pub target_day_of_week: DayOfWeek,
    pub target_time_slot: TimeSlot,
    pub target_slot_label: String,
    pub roads: Vec<PredictedMetrics>,
    pub average_confidence: f64,
}

struct CacheEntry {
    result: PredictionResult,
    at: Instant,
}

/// Produces forecasts from the pattern store and the live engine.
pub struct TrafficPredictor {
    store: Arc<PatternStore>,
    sim: SharedSimulation,
    config: Mutex<PredictionConfig>,
    cache: Mutex<FxHashMap<u32, CacheEntry>>,
}

impl TrafficPredictor {
    pub fn new(store: Arc<PatternStore>, sim: SharedSimulation) -> TrafficPredictor {
        TrafficPredictor {
            store,
            sim,
            config: Mutex::new(PredictionConfig::default()),
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn config(&self) -> PredictionConfig {
        *lock(&self.config)
    }

    /// Install a new config (weights normalized) and drop the cache.
    pub fn set_config(&self, config: PredictionConfig) {
        *lock(&self.config) = config.normalized();
        self.clear_cache();
    }

    pub fn clear_cache(&self) {
        lock(&self.cache).clear();
    }

    /// Forecast for the current slot — a zero-horizon forecast.
    pub fn predict_current(&self) -> PredictResult<PredictionResult> {
        self.predict_forecast(0)
    }

    /// Forecast `horizon_minutes` ahead of now, served from the per-horizon
    /// cache when fresh.
    pub fn predict_forecast(&self, horizon_minutes: u32) -> PredictResult<PredictionResult> {
        let config = self.config();
        let horizon = horizon_minutes.min(config.max_horizon_minutes);

        {
            let cache = lock(&self.cache);
            if let Some(entry) = cache.get(&horizon) {
                if entry.at.elapsed().as_secs() < config.cache_duration_secs {
                    debug!(horizon, "prediction served from cache");
                    return Ok(entry.result.clone());
                }
            }
        }

        let result = self.predict_forecast_at(now_unix(), horizon)?;
        lock(&self.cache).insert(
            horizon,
            CacheEntry {
                result: result.clone(),
                at: Instant::now(),
            },
        );
        Ok(result)
    }

    /// Forecast for one road, `None` if the road is unknown to both sources.
    pub fn predict_road(
        &self,
        road: RoadId,
        horizon_minutes: u32,
    ) -> PredictResult<Option<PredictedMetrics>> {
        let result = self.predict_forecast(horizon_minutes)?;
        Ok(result.roads.into_iter().find(|p| p.road == road))
    }

    /// Uncached forecast anchored at an explicit wall-clock instant.
    ///
    /// The cacheless explicit-time entry point keeps forecasting a pure
    /// function of `(now, horizon, store, live state)` — deterministic
    /// replay and tests use it directly.
    pub fn predict_forecast_at(
        &self,
        now: i64,
        horizon_minutes: u32,
    ) -> PredictResult<PredictionResult> {
        let config = self.config();
        let horizon = horizon_minutes.min(config.max_horizon_minutes);
        let target = now + i64::from(horizon) * 60;
        let (target_day, target_slot) = clock::day_and_slot(target);

        // Live per-road state under the sim mutex.
        let current: FxHashMap<RoadId, RoadMetrics> = {
            let sim = lock_sim(&self.sim);
            road_metrics(&sim.map)
                .into_iter()
                .map(|m| (m.road, m))
                .collect()
        };

        // Batch-fetch patterns for the target bucket.
        let patterns: FxHashMap<RoadId, TrafficPattern> = self
            .store
            .patterns_for_slot(target_day, target_slot)?
            .into_iter()
            .map(|p| (p.road, p))
            .collect();

        // Union of road ids from both sources, ascending for stable output.
        let mut roads: Vec<RoadId> = current.keys().chain(patterns.keys()).copied().collect();
        roads.sort();
        roads.dedup();

        let predictions: Vec<PredictedMetrics> = roads
            .into_iter()
            .map(|road| {
                predict_for_road(road, patterns.get(&road), current.get(&road), &config)
            })
            .collect();

        let average_confidence = if predictions.is_empty() {
            0.0
        } else {
            predictions.iter().map(|p| p.confidence).sum::<f64>() / predictions.len() as f64
        };

        debug!(
            horizon,
            roads = predictions.len(),
            confidence = average_confidence,
            "forecast generated"
        );

        Ok(PredictionResult {
            prediction_timestamp: now,
            target_timestamp: target,
            horizon_minutes: horizon,
            target_day_of_week: target_day,
            target_time_slot: target_slot,
            target_slot_label: clock::slot_label(target_slot),
            roads: predictions,
            average_confidence,
        })
    }
}

/// Blend one road's pattern and live state.
fn predict_for_road(
    road: RoadId,
    pattern: Option<&TrafficPattern>,
    current: Option<&RoadMetrics>,
    config: &PredictionConfig,
) -> PredictedMetrics {
    let blend = |pattern_value: f64, current_value: f64| match (pattern, current) {
        (Some(_), Some(_)) => {
            config.pattern_weight * pattern_value + config.current_weight * current_value
        }
        (Some(_), None) => pattern_value,
        (None, Some(_)) => current_value,
        (None, None) => 0.0,
    };

    let pattern_count = pattern.map_or(0.0, |p| p.avg_vehicle_count);
    let current_count = current.map_or(0.0, |c| f64::from(c.vehicle_count));

    let confidence = match (pattern, current) {
        (Some(p), _) => pattern_confidence(p, config.min_samples_for_full_confidence),
        (None, Some(_)) => 0.1,
        (None, None) => 0.0,
    };

    PredictedMetrics {
        road,
        vehicle_count: blend(pattern_count, current_count),
        queue_length: blend(
            pattern.map_or(0.0, |p| p.avg_queue_length),
            current.map_or(0.0, |c| c.queue_length),
        ),
        avg_speed: blend(
            pattern.map_or(0.0, |p| p.avg_speed),
            current.map_or(0.0, |c| c.avg_speed),
        ),
        flow_rate: blend(
            pattern.map_or(0.0, |p| p.avg_flow_rate),
            current.map_or(0.0, |c| c.flow_rate),
        ),
        confidence,
        has_pattern: pattern.is_some(),
        has_current: current.is_some(),
        pattern_vehicle_count: pattern_count,
        current_vehicle_count: current_count,
        historical_samples: pattern.map_or(0, |p| p.sample_count),
    }
}

/// `sample_factor · variability_factor`, clamped to [0, 1].
fn pattern_confidence(pattern: &TrafficPattern, min_samples: u32) -> f64 {
    let sample_factor =
        (f64::from(pattern.sample_count) / f64::from(min_samples.max(1))).min(1.0);

    let variability_factor = if pattern.avg_vehicle_count > 0.01 {
        1.0 - (pattern.stddev_vehicle_count / pattern.avg_vehicle_count).min(1.0)
    } else if pattern.sample_count > 0 {
        // Near-zero averages make the ratio meaningless; use moderate trust.
        0.5
    } else {
        1.0
    };

    (sample_factor * variability_factor).clamp(0.0, 1.0)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_sim(sim: &SharedSimulation) -> std::sync::MutexGuard<'_, atc_sim::Simulation> {
    match sim.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
