//! Predictive optimization pipeline.
//!
//! One run walks IDLE → PREDICTING → OPTIMIZING → VALIDATING → APPLYING →
//! COMPLETE (or ERROR): forecast the target slot, synthesize a network
//! snapshot matching the forecast, evolve light timings against it, validate
//! against the *live* snapshot, and persist the winning chromosome.  Every
//! forecast is also remembered as a pending prediction so its accuracy can
//! be scored against reality once the target time arrives.
//!
//! Synthetic snapshots only ever add vehicles (capped at 50 per road);
//! a forecast below the live count leaves the road as-is, which biases
//! optimization toward heavier-than-real traffic.  Known limitation,
//! inherited deliberately.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::FxHashMap;
use tracing::{info, warn};

use atc_core::clock::now_unix;
use atc_core::{RoadId, RunId};
use atc_optimize::{
    Chromosome, FitnessEvaluator, GaParams, GeneticAlgorithm, TimingBounds, TimingValidator,
    ValidationConfig, ValidationResult,
};
use atc_pattern::{OptimizationRun, PatternStore};
use atc_sim::sim::{CityMap, light_count};
use atc_sim::{SharedSimulation, Vehicle};

use crate::error::{PredictError, PredictResult};
use crate::predictor::{PredictionResult, TrafficPredictor};

/// Cap on synthetic vehicles injected per road per forecast.
const MAX_INJECTED_PER_ROAD: usize = 50;
/// Pending predictions retained for accuracy scoring.
const MAX_PENDING_PREDICTIONS: usize = 50;
/// Accuracy history FIFO capacity.
const MAX_ACCURACY_HISTORY: usize = 100;

/// Where a run currently is in the pipeline.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PipelineStatus {
    Idle,
    Predicting,
    Optimizing,
    Validating,
    Applying,
    Complete,
    Error,
}

impl PipelineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStatus::Idle => "idle",
            PipelineStatus::Predicting => "predicting",
            PipelineStatus::Optimizing => "optimizing",
            PipelineStatus::Validating => "validating",
            PipelineStatus::Applying => "applying",
            PipelineStatus::Complete => "complete",
            PipelineStatus::Error => "error",
        }
    }

    /// Coarse progress fraction for status endpoints.
    pub fn progress(self) -> f64 {
        match self {
            PipelineStatus::Idle | PipelineStatus::Error => 0.0,
            PipelineStatus::Predicting => 0.1,
            PipelineStatus::Optimizing => 0.5,
            PipelineStatus::Validating => 0.8,
            PipelineStatus::Applying => 0.9,
            PipelineStatus::Complete => 1.0,
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predictive-run tuning.
#[derive(Copy, Clone, Debug)]
pub struct PredictiveConfig {
    /// Forecast horizon, minutes; valid range 10–120.
    pub horizon_minutes: u32,
    pub population_size: usize,
    pub generations: usize,
    pub simulation_steps: u32,
    pub dt: f64,
    pub bounds: TimingBounds,
    /// Scale applied to forecast vehicle counts before injection.
    pub vehicle_scale_factor: f64,
    pub ga_seed: u64,
}

impl Default for PredictiveConfig {
    fn default() -> Self {
        PredictiveConfig {
            horizon_minutes: 30,
            population_size: 30,
            generations: 30,
            simulation_steps: 500,
            dt: 0.1,
            bounds: TimingBounds {
                min_green: 10.0,
                max_green: 60.0,
                min_red: 10.0,
                max_red: 60.0,
            },
            vehicle_scale_factor: 1.0,
            ga_seed: 42,
        }
    }
}

/// Everything one pipeline run produced.
#[derive(Clone, Debug)]
pub struct OptimizationOutcome {
    pub run_id: Option<RunId>,
    pub started_at: i64,
    pub finished_at: i64,
    pub horizon_minutes: u32,
    pub target_day_of_week: u8,
    pub target_time_slot: u8,
    pub target_slot_label: String,
    pub average_prediction_confidence: f64,
    pub baseline_fitness: f64,
    pub best_fitness: f64,
    pub improvement_percent: f64,
    /// The winning chromosome; `None` when validation rejected it.
    pub best: Option<Chromosome>,
    pub validation: Option<ValidationResult>,
    pub status: PipelineStatus,
    pub error: Option<String>,
}

/// Forecast vs. reality for one retired prediction.
#[derive(Copy, Clone, Debug)]
pub struct PredictionAccuracy {
    pub timestamp: i64,
    pub horizon_minutes: u32,
    pub predicted_vehicle_count: f64,
    pub actual_vehicle_count: f64,
    pub vehicle_count_error: f64,
    pub predicted_queue_length: f64,
    pub actual_queue_length: f64,
    pub queue_length_error: f64,
    /// 0 … 1, averaged over the vehicle-count and queue dimensions.
    pub accuracy_score: f64,
}

struct PendingPrediction {
    target_time: i64,
    horizon_minutes: u32,
    vehicle_counts: FxHashMap<RoadId, f64>,
    queue_lengths: FxHashMap<RoadId, f64>,
}

/// Runs GA optimization against synthesized future snapshots.
pub struct PredictiveOptimizer {
    predictor: Arc<TrafficPredictor>,
    store: Option<Arc<PatternStore>>,
    sim: SharedSimulation,
    config: Mutex<PredictiveConfig>,
    status: Mutex<PipelineStatus>,
    pending: Mutex<Vec<PendingPrediction>>,
    accuracy: Mutex<VecDeque<PredictionAccuracy>>,
    validator: Mutex<TimingValidator>,
    validation_enabled: AtomicBool,
    total_runs: AtomicU32,
    successful_runs: AtomicU32,
}

impl PredictiveOptimizer {
    pub fn new(
        predictor: Arc<TrafficPredictor>,
        store: Option<Arc<PatternStore>>,
        sim: SharedSimulation,
    ) -> PredictiveOptimizer {
        PredictiveOptimizer {
            predictor,
            store,
            sim,
            config: Mutex::new(PredictiveConfig::default()),
            status: Mutex::new(PipelineStatus::Idle),
            pending: Mutex::new(Vec::new()),
            accuracy: Mutex::new(VecDeque::new()),
            validator: Mutex::new(TimingValidator::default()),
            validation_enabled: AtomicBool::new(true),
            total_runs: AtomicU32::new(0),
            successful_runs: AtomicU32::new(0),
        }
    }

    pub fn config(&self) -> PredictiveConfig {
        *lock(&self.config)
    }

    pub fn set_config(&self, config: PredictiveConfig) -> PredictResult<()> {
        if !(10..=120).contains(&config.horizon_minutes) {
            return Err(PredictError::Config(
                "horizon_minutes must be between 10 and 120".to_owned(),
            ));
        }
        *lock(&self.config) = config;
        Ok(())
    }

    pub fn set_validation_config(&self, config: ValidationConfig) {
        lock(&self.validator).set_config(config);
    }

    pub fn set_validation_enabled(&self, enabled: bool) {
        self.validation_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn status(&self) -> PipelineStatus {
        *lock(&self.status)
    }

    fn set_status(&self, status: PipelineStatus) {
        *lock(&self.status) = status;
    }

    /// Run the full pipeline for the configured horizon.
    pub fn run_optimization(&self) -> PredictResult<OptimizationOutcome> {
        let horizon = self.config().horizon_minutes;
        self.run_optimization_for(horizon)
    }

    /// Run the full pipeline for an explicit horizon.
    ///
    /// Rejects an out-of-range horizon up front; failures *inside* the
    /// pipeline are folded into an `ERROR` outcome instead, so a scheduling
    /// loop can log and carry on.
    pub fn run_optimization_for(&self, horizon: u32) -> PredictResult<OptimizationOutcome> {
        if !(10..=120).contains(&horizon) {
            return Err(PredictError::Config(format!(
                "prediction horizon {horizon} outside [10, 120] minutes"
            )));
        }

        let started_at = now_unix();
        self.total_runs.fetch_add(1, Ordering::SeqCst);

        let outcome = match self.pipeline(horizon, started_at) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "predictive optimization failed");
                self.set_status(PipelineStatus::Error);
                OptimizationOutcome {
                    run_id: None,
                    started_at,
                    finished_at: now_unix(),
                    horizon_minutes: horizon,
                    target_day_of_week: 0,
                    target_time_slot: 0,
                    target_slot_label: String::new(),
                    average_prediction_confidence: 0.0,
                    baseline_fitness: 0.0,
                    best_fitness: 0.0,
                    improvement_percent: 0.0,
                    best: None,
                    validation: None,
                    status: PipelineStatus::Error,
                    error: Some(e.to_string()),
                }
            }
        };

        if outcome.status == PipelineStatus::Complete && outcome.improvement_percent > 0.0 {
            self.successful_runs.fetch_add(1, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    fn pipeline(&self, horizon: u32, started_at: i64) -> PredictResult<OptimizationOutcome> {
        let config = self.config();

        // ── PREDICTING ────────────────────────────────────────────────────
        self.set_status(PipelineStatus::Predicting);
        let prediction = self.predictor.predict_forecast(horizon)?;
        info!(
            horizon,
            slot = %prediction.target_slot_label,
            confidence = prediction.average_confidence,
            "forecast acquired"
        );
        self.remember_prediction(&prediction);

        // ── Snapshot synthesis ────────────────────────────────────────────
        let predicted_network = self.build_predicted_network(&prediction, &config);
        if predicted_network.is_empty() {
            return Err(PredictError::EmptyNetwork);
        }

        // ── OPTIMIZING ────────────────────────────────────────────────────
        self.set_status(PipelineStatus::Optimizing);
        let evaluator = FitnessEvaluator::new(config.simulation_steps, config.dt);
        let baseline_fitness = evaluator.baseline(&predicted_network);

        let ga_params = GaParams {
            population_size: config.population_size,
            generations: config.generations,
            mutation_rate: 0.15,
            mutation_std_dev: 5.0,
            crossover_rate: 0.8,
            tournament_size: 3,
            elitism_rate: 0.1,
            bounds: config.bounds,
            seed: config.ga_seed,
        };
        let genes = light_count(&predicted_network);
        let fitness_network = predicted_network.clone();
        let mut ga = GeneticAlgorithm::new(ga_params, move |chromosome| {
            evaluator.evaluate(chromosome, &fitness_network)
        })
        .map_err(|e| PredictError::Config(e.to_string()))?;
        ga.initialize_population(genes);
        let best = ga.evolve();

        let improvement_percent = if baseline_fitness != 0.0 {
            (baseline_fitness - best.fitness) / baseline_fitness * 100.0
        } else {
            0.0
        };
        info!(
            baseline = baseline_fitness,
            best = best.fitness,
            improvement = improvement_percent,
            "predictive GA finished"
        );

        // ── VALIDATING ────────────────────────────────────────────────────
        let mut validation = None;
        let mut winner = Some(best.clone());
        if self.validation_enabled.load(Ordering::SeqCst) {
            self.set_status(PipelineStatus::Validating);
            let live_network = lock_sim(&self.sim).map.clone();
            let result = lock(&self.validator).validate(&live_network, &best);
            if !result.passed {
                warn!(reason = %result.reason, "chromosome rejected by validation");
                winner = None;
            }
            validation = Some(result);
        }

        // ── APPLYING (persist; gradual application is the controller's) ───
        self.set_status(PipelineStatus::Applying);
        let finished_at = now_unix();
        let mut run_id = None;
        if improvement_percent > 0.0 && winner.is_some() {
            run_id = self.persist(
                &best,
                baseline_fitness,
                improvement_percent,
                started_at,
                finished_at,
                &config,
            );
        }

        self.set_status(PipelineStatus::Complete);
        Ok(OptimizationOutcome {
            run_id,
            started_at,
            finished_at,
            horizon_minutes: horizon,
            target_day_of_week: prediction.target_day_of_week,
            target_time_slot: prediction.target_time_slot,
            target_slot_label: prediction.target_slot_label.clone(),
            average_prediction_confidence: prediction.average_confidence,
            baseline_fitness,
            best_fitness: best.fitness,
            improvement_percent,
            best: winner,
            validation,
            status: PipelineStatus::Complete,
            error: None,
        })
    }

    /// Clone the live network and inject synthetic vehicles up to the
    /// forecast counts.
    pub(crate) fn build_predicted_network(
        &self,
        prediction: &PredictionResult,
        config: &PredictiveConfig,
    ) -> CityMap {
        let mut network = lock_sim(&self.sim).map.clone();

        for forecast in &prediction.roads {
            let Some(road) = network.get_mut(&forecast.road) else {
                continue;
            };

            let current = road.vehicle_count();
            let target = (forecast.vehicle_count * config.vehicle_scale_factor) as usize;
            if target <= current {
                continue;
            }

            let to_add = (target - current).min(MAX_INJECTED_PER_ROAD);
            let length = road.length();
            for i in 0..to_add {
                let position = length * 0.1 + length * 0.8 * i as f64 / to_add.max(1) as f64;
                if position >= length - 10.0 {
                    break;
                }
                let velocity = if forecast.avg_speed > 0.0 {
                    forecast.avg_speed * 0.9
                } else {
                    road.max_speed() * 0.5
                };
                let vehicle = Vehicle::car(position, velocity, road.max_speed());
                if let Some(lane) = least_loaded_lane(road) {
                    road.add_vehicle(vehicle, lane);
                }
            }
        }

        network
    }

    fn persist(
        &self,
        best: &Chromosome,
        baseline_fitness: f64,
        improvement_percent: f64,
        started_at: i64,
        finished_at: i64,
        config: &PredictiveConfig,
    ) -> Option<RunId> {
        let store = self.store.as_ref()?;

        let run = OptimizationRun {
            id: RunId(0),
            status: "completed".to_owned(),
            started_at,
            completed_at: Some(finished_at),
            population_size: config.population_size as u32,
            generations: config.generations as u32,
            simulation_steps: config.simulation_steps,
            baseline_fitness: Some(baseline_fitness),
            best_fitness: Some(best.fitness),
            improvement_percent: Some(improvement_percent),
        };

        let persisted = store.insert_run(&run).and_then(|run_id| {
            let json = best
                .to_json()
                .unwrap_or_else(|_| "[]".to_owned());
            store.insert_solution(
                run_id,
                best.fitness,
                &json,
                best.len() as u32,
                true,
                finished_at,
            )?;
            Ok(run_id)
        });

        match persisted {
            Ok(run_id) => {
                info!(run = %run_id, "optimization run persisted");
                Some(run_id)
            }
            Err(e) => {
                warn!(error = %e, "failed to persist optimization run");
                None
            }
        }
    }

    // ── Accuracy tracking ─────────────────────────────────────────────────

    fn remember_prediction(&self, prediction: &PredictionResult) {
        let mut pending = lock(&self.pending);
        pending.push(PendingPrediction {
            target_time: prediction.target_timestamp,
            horizon_minutes: prediction.horizon_minutes,
            vehicle_counts: prediction
                .roads
                .iter()
                .map(|p| (p.road, p.vehicle_count))
                .collect(),
            queue_lengths: prediction
                .roads
                .iter()
                .map(|p| (p.road, p.queue_length))
                .collect(),
        });
        if pending.len() > MAX_PENDING_PREDICTIONS {
            pending.remove(0);
        }
    }

    /// Score and retire pending predictions whose target time has passed.
    pub fn record_actual_metrics(&self) {
        self.record_actual_metrics_at(now_unix());
    }

    /// Explicit-time variant of [`record_actual_metrics`][Self::record_actual_metrics].
    pub fn record_actual_metrics_at(&self, now: i64) {
        let due: Vec<PendingPrediction> = {
            let mut pending = lock(&self.pending);
            let (ready, keep): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|p| now >= p.target_time);
            *pending = keep;
            ready
        };
        if due.is_empty() {
            return;
        }

        // Actual per-road state under the sim mutex.
        let (actual_counts, actual_queues): (FxHashMap<RoadId, f64>, FxHashMap<RoadId, f64>) = {
            let sim = lock_sim(&self.sim);
            let counts = sim
                .map
                .iter()
                .map(|(&id, road)| (id, road.vehicle_count() as f64))
                .collect();
            let queues = sim
                .map
                .iter()
                .map(|(&id, road)| (id, road.queue_length() as f64))
                .collect();
            (counts, queues)
        };

        for prediction in due {
            let mut predicted_count_sum = 0.0;
            let mut actual_count_sum = 0.0;
            let mut predicted_queue_sum = 0.0;
            let mut actual_queue_sum = 0.0;
            let mut roads = 0usize;

            for (road, predicted) in &prediction.vehicle_counts {
                if let Some(actual) = actual_counts.get(road) {
                    predicted_count_sum += predicted;
                    actual_count_sum += actual;
                    roads += 1;
                }
            }
            for (road, predicted) in &prediction.queue_lengths {
                if let Some(actual) = actual_queues.get(road) {
                    predicted_queue_sum += predicted;
                    actual_queue_sum += actual;
                }
            }
            if roads == 0 {
                continue;
            }

            let n = roads as f64;
            let predicted_vehicle_count = predicted_count_sum / n;
            let actual_vehicle_count = actual_count_sum / n;
            let predicted_queue_length = predicted_queue_sum / n;
            let actual_queue_length = actual_queue_sum / n;

            let accuracy = PredictionAccuracy {
                timestamp: now,
                horizon_minutes: prediction.horizon_minutes,
                predicted_vehicle_count,
                actual_vehicle_count,
                vehicle_count_error: (predicted_vehicle_count - actual_vehicle_count).abs(),
                predicted_queue_length,
                actual_queue_length,
                queue_length_error: (predicted_queue_length - actual_queue_length).abs(),
                accuracy_score: (accuracy_score(predicted_vehicle_count, actual_vehicle_count)
                    + accuracy_score(predicted_queue_length, actual_queue_length))
                    / 2.0,
            };

            info!(
                horizon = accuracy.horizon_minutes,
                score = accuracy.accuracy_score,
                "prediction accuracy recorded"
            );

            let mut history = lock(&self.accuracy);
            history.push_back(accuracy);
            if history.len() > MAX_ACCURACY_HISTORY {
                history.pop_front();
            }
        }
    }

    pub fn accuracy_history(&self) -> Vec<PredictionAccuracy> {
        lock(&self.accuracy).iter().copied().collect()
    }

    /// Mean accuracy score over the retained history, 0 when empty.
    pub fn average_accuracy(&self) -> f64 {
        let history = lock(&self.accuracy);
        if history.is_empty() {
            return 0.0;
        }
        history.iter().map(|a| a.accuracy_score).sum::<f64>() / history.len() as f64
    }

    pub fn total_runs(&self) -> u32 {
        self.total_runs.load(Ordering::SeqCst)
    }

    pub fn successful_runs(&self) -> u32 {
        self.successful_runs.load(Ordering::SeqCst)
    }
}

/// `1 − |p − a| / max(p, a)`, and 1.0 when both sides are zero.
fn accuracy_score(predicted: f64, actual: f64) -> f64 {
    let denom = predicted.max(actual);
    if denom <= f64::EPSILON {
        return 1.0;
    }
    (1.0 - (predicted - actual).abs() / denom).clamp(0.0, 1.0)
}

/// The lane with the fewest vehicles.
fn least_loaded_lane(road: &atc_sim::Road) -> Option<usize> {
    (0..road.lanes()).min_by_key(|&lane| road.vehicles()[lane].len())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_sim(sim: &SharedSimulation) -> MutexGuard<'_, atc_sim::Simulation> {
    match sim.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
