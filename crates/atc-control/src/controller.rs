//! The continuous optimization controller.
//!
//! A background worker wakes every second to drive active transitions and,
//! when the optimization interval elapses, runs one cycle — reactive (GA on
//! the live snapshot) or predictive (delegated to the
//! [`PredictiveOptimizer`]).  A winning chromosome is never slammed into the
//! lights; it is turned into a [`TransitionSet`] that walks them over
//! `transition_duration_secs`.
//!
//! Lock order: the transitions mutex is always taken *before* the sim mutex
//! when both are needed.  Cycle failures are logged and swallowed — the
//! worker must outlive any single bad run.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use atc_core::RunId;
use atc_optimize::{
    Chromosome, FitnessEvaluator, GaParams, GeneticAlgorithm, TimingBounds,
};
use atc_pattern::PatternStore;
use atc_predict::{PipelineStatus, PredictiveOptimizer};
use atc_sim::SharedSimulation;
use atc_sim::sim::{LightSetting, light_count};

use crate::error::{ControlError, ControlResult};
use crate::transition::{TimingTransition, TransitionSet};

/// Controller tuning.
#[derive(Copy, Clone, Debug)]
pub struct ControllerConfig {
    /// Seconds between optimization cycles; valid range 60–3600.
    pub optimization_interval_secs: u64,
    /// Seconds a timing transition takes; valid range 30–600.
    pub transition_duration_secs: u64,
    pub population_size: usize,
    pub generations: usize,
    pub simulation_steps: u32,
    pub dt: f64,
    pub bounds: TimingBounds,
    /// Predictive mode instead of reactive.
    pub use_prediction: bool,
    /// Forecast horizon for predictive mode; valid range 10–120.
    pub prediction_horizon_minutes: u32,
    pub ga_seed: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            optimization_interval_secs: 900,
            transition_duration_secs: 300,
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
            use_prediction: false,
            prediction_horizon_minutes: 30,
            ga_seed: 42,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> ControlResult<()> {
        let fail = |msg: &str| Err(ControlError::Config(msg.to_owned()));
        if !(60..=3_600).contains(&self.optimization_interval_secs) {
            return fail("optimization_interval_secs must be between 60 and 3600");
        }
        if !(30..=600).contains(&self.transition_duration_secs) {
            return fail("transition_duration_secs must be between 30 and 600");
        }
        if !(10..=120).contains(&self.prediction_horizon_minutes) {
            return fail("prediction_horizon_minutes must be between 10 and 120");
        }
        Ok(())
    }
}

/// Schedules optimization cycles and applies winners gradually.
pub struct ContinuousOptimizationController {
    sim: SharedSimulation,
    store: Option<Arc<PatternStore>>,
    predictive: Option<Arc<PredictiveOptimizer>>,
    config: Mutex<ControllerConfig>,
    transitions: Arc<Mutex<TransitionSet>>,
    /// Light settings captured when the last chromosome was applied.
    rollback_point: Arc<Mutex<Option<Vec<LightSetting>>>>,
    running: Arc<AtomicBool>,
    /// Woken on stop so the worker never oversleeps its shutdown.
    heartbeat: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
    total_runs: Arc<AtomicU32>,
    successful_runs: Arc<AtomicU32>,
    last_improvement: Arc<Mutex<f64>>,
}

impl ContinuousOptimizationController {
    pub fn new(
        sim: SharedSimulation,
        store: Option<Arc<PatternStore>>,
        predictive: Option<Arc<PredictiveOptimizer>>,
    ) -> ContinuousOptimizationController {
        ContinuousOptimizationController {
            sim,
            store,
            predictive,
            config: Mutex::new(ControllerConfig::default()),
            transitions: Arc::new(Mutex::new(TransitionSet::new())),
            rollback_point: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            heartbeat: Arc::new((Mutex::new(false), Condvar::new())),
            handle: None,
            total_runs: Arc::new(AtomicU32::new(0)),
            successful_runs: Arc::new(AtomicU32::new(0)),
            last_improvement: Arc::new(Mutex::new(0.0)),
        }
    }

    pub fn config(&self) -> ControllerConfig {
        *lock(&self.config)
    }

    pub fn set_config(&self, config: ControllerConfig) -> ControlResult<()> {
        config.validate()?;
        if config.use_prediction && self.predictive.is_none() {
            return Err(ControlError::PredictorUnavailable);
        }
        *lock(&self.config) = config;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn total_optimization_runs(&self) -> u32 {
        self.total_runs.load(Ordering::SeqCst)
    }

    pub fn successful_optimizations(&self) -> u32 {
        self.successful_runs.load(Ordering::SeqCst)
    }

    pub fn last_improvement_percent(&self) -> f64 {
        *lock(&self.last_improvement)
    }

    /// Copy of the currently active transitions.
    pub fn active_transitions(&self) -> Vec<TimingTransition> {
        lock(&self.transitions).active().to_vec()
    }

    // ── Worker lifecycle ──────────────────────────────────────────────────

    /// Start the background worker.
    pub fn start(&mut self) -> ControlResult<()> {
        let config = self.config();
        config.validate()?;
        if config.use_prediction && self.predictive.is_none() {
            return Err(ControlError::PredictorUnavailable);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ControlError::AlreadyRunning);
        }

        info!(
            interval = config.optimization_interval_secs,
            mode = if config.use_prediction { "predictive" } else { "reactive" },
            "continuous optimization starting"
        );

        let worker = Worker {
            sim: Arc::clone(&self.sim),
            store: self.store.clone(),
            predictive: self.predictive.clone(),
            transitions: Arc::clone(&self.transitions),
            rollback_point: Arc::clone(&self.rollback_point),
            running: Arc::clone(&self.running),
            heartbeat: Arc::clone(&self.heartbeat),
            total_runs: Arc::clone(&self.total_runs),
            successful_runs: Arc::clone(&self.successful_runs),
            last_improvement: Arc::clone(&self.last_improvement),
            config,
        };
        self.handle = Some(std::thread::spawn(move || worker.run()));
        Ok(())
    }

    /// Stop the worker; returns once it has joined (within ~1 s).
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.heartbeat.1.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        info!("continuous optimization stopped");
    }

    // ── Transition application ────────────────────────────────────────────

    /// Atomically replace the active transitions with one per (road, lane),
    /// walking each light from its current timings to the chromosome's over
    /// `transition_duration_secs`.
    pub fn apply_chromosome_gradually(&self, chromosome: &Chromosome) {
        let duration = Duration::from_secs(self.config().transition_duration_secs);
        apply_gradually(
            &self.sim,
            &self.transitions,
            chromosome,
            duration,
            &self.rollback_point,
        );
    }

    /// Drive active transitions against the live lights at the current
    /// instant (the worker does this once per second).
    pub fn update_transitions(&self) {
        self.update_transitions_at(Instant::now());
    }

    /// Explicit-time variant of [`update_transitions`][Self::update_transitions].
    pub fn update_transitions_at(&self, now: Instant) {
        drive_transitions(&self.sim, &self.transitions, now);
    }

    /// Re-apply a persisted optimization run by id.
    pub fn apply_run(&self, run_id: RunId) -> ControlResult<()> {
        let store = self.store.as_ref().ok_or(ControlError::RunNotFound(run_id))?;
        let run = store.run(run_id)?.ok_or(ControlError::RunNotFound(run_id))?;
        if run.status != "completed" {
            return Err(ControlError::NotCompleted(run_id));
        }
        let solution = store
            .best_solution(run_id)?
            .ok_or(ControlError::RunNotFound(run_id))?;
        let chromosome = Chromosome::from_json(&solution.chromosome_json, solution.fitness)?;

        info!(run = %run_id, lights = chromosome.len(), "re-applying persisted run");
        self.apply_chromosome_gradually(&chromosome);
        Ok(())
    }

    /// Abort in-flight transitions and restore the timings captured before
    /// the last application.
    pub fn rollback(&self) -> ControlResult<()> {
        let Some(settings) = lock(&self.rollback_point).take() else {
            return Err(ControlError::Config("nothing to roll back".to_owned()));
        };
        // Transitions lock before sim lock.
        let mut transitions = lock(&self.transitions);
        transitions.clear();
        let mut sim = lock_shared(&self.sim);
        sim.apply_light_settings(&settings)
            .map_err(|e| ControlError::Config(e.to_string()))?;
        info!(lights = settings.len(), "rolled back to previous timings");
        Ok(())
    }
}

impl Drop for ContinuousOptimizationController {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

struct Worker {
    sim: SharedSimulation,
    store: Option<Arc<PatternStore>>,
    predictive: Option<Arc<PredictiveOptimizer>>,
    transitions: Arc<Mutex<TransitionSet>>,
    rollback_point: Arc<Mutex<Option<Vec<LightSetting>>>>,
    running: Arc<AtomicBool>,
    heartbeat: Arc<(Mutex<bool>, Condvar)>,
    total_runs: Arc<AtomicU32>,
    successful_runs: Arc<AtomicU32>,
    last_improvement: Arc<Mutex<f64>>,
    config: ControllerConfig,
}

impl Worker {
    fn run(self) {
        info!("optimization worker started");
        while self.running.load(Ordering::SeqCst) {
            // One-second heartbeat until the interval elapses, driving
            // transitions each beat and honouring shutdown immediately.
            for _ in 0..self.config.optimization_interval_secs {
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
                let (lock_, cvar) = &*self.heartbeat;
                let guard = match lock_.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let _ = cvar.wait_timeout(guard, Duration::from_secs(1));
                drive_transitions(&self.sim, &self.transitions, Instant::now());
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            self.total_runs.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = self.cycle() {
                // Never let the worker die on a failed cycle.
                error!(error = %e, "optimization cycle failed");
            }
        }
        info!("optimization worker stopped");
    }

    fn cycle(&self) -> ControlResult<()> {
        if self.config.use_prediction {
            self.predictive_cycle()
        } else {
            self.reactive_cycle()
        }
    }

    fn predictive_cycle(&self) -> ControlResult<()> {
        let Some(optimizer) = &self.predictive else {
            return Err(ControlError::PredictorUnavailable);
        };

        // Score past forecasts before making a new one.
        optimizer.record_actual_metrics();

        let outcome = optimizer.run_optimization_for(self.config.prediction_horizon_minutes)?;
        *lock(&self.last_improvement) = outcome.improvement_percent;

        match (&outcome.best, outcome.status) {
            (Some(best), PipelineStatus::Complete) if outcome.improvement_percent > 0.0 => {
                apply_gradually(
                    &self.sim,
                    &self.transitions,
                    best,
                    Duration::from_secs(self.config.transition_duration_secs),
                    &self.rollback_point,
                );
                self.successful_runs.fetch_add(1, Ordering::SeqCst);
                info!(
                    improvement = outcome.improvement_percent,
                    confidence = outcome.average_prediction_confidence,
                    "predictive cycle applied"
                );
            }
            (_, PipelineStatus::Error) => {
                warn!(error = ?outcome.error, "predictive cycle errored");
            }
            _ => info!("predictive cycle found no improvement"),
        }
        Ok(())
    }

    fn reactive_cycle(&self) -> ControlResult<()> {
        // Snapshot the live network.
        let snapshot = lock_shared(&self.sim).map.clone();
        if snapshot.is_empty() {
            warn!("no network loaded, skipping optimization cycle");
            return Ok(());
        }

        let evaluator = FitnessEvaluator::new(self.config.simulation_steps, self.config.dt);
        let baseline = evaluator.baseline(&snapshot);

        let params = GaParams {
            population_size: self.config.population_size,
            generations: self.config.generations,
            mutation_rate: 0.15,
            mutation_std_dev: 5.0,
            crossover_rate: 0.8,
            tournament_size: 3,
            elitism_rate: 0.1,
            bounds: self.config.bounds,
            // Vary the stream per cycle while staying reproducible per run.
            seed: self
                .config
                .ga_seed
                .wrapping_add(u64::from(self.total_runs.load(Ordering::SeqCst))),
        };
        let genes = light_count(&snapshot);
        let fitness_network = snapshot.clone();
        let mut ga = GeneticAlgorithm::new(params, move |chromosome| {
            evaluator.evaluate(chromosome, &fitness_network)
        })?;
        ga.initialize_population(genes);
        let best = ga.evolve();

        let improvement = if baseline != 0.0 {
            (baseline - best.fitness) / baseline * 100.0
        } else {
            0.0
        };
        *lock(&self.last_improvement) = improvement;
        info!(baseline, best = best.fitness, improvement, "reactive cycle evaluated");

        if improvement > 0.0 {
            apply_gradually(
                &self.sim,
                &self.transitions,
                &best,
                Duration::from_secs(self.config.transition_duration_secs),
                &self.rollback_point,
            );
            self.successful_runs.fetch_add(1, Ordering::SeqCst);
            if let Some(store) = &self.store {
                persist_cycle(store, &self.config, baseline, &best, improvement);
            }
        } else {
            info!("no improvement found, skipping application");
        }
        Ok(())
    }
}

/// Persist a reactive cycle's winner; failures are logged, not fatal.
fn persist_cycle(
    store: &PatternStore,
    config: &ControllerConfig,
    baseline: f64,
    best: &Chromosome,
    improvement: f64,
) {
    let now = atc_core::clock::now_unix();
    let run = atc_pattern::OptimizationRun {
        id: RunId(0),
        status: "completed".to_owned(),
        started_at: now,
        completed_at: Some(now),
        population_size: config.population_size as u32,
        generations: config.generations as u32,
        simulation_steps: config.simulation_steps,
        baseline_fitness: Some(baseline),
        best_fitness: Some(best.fitness),
        improvement_percent: Some(improvement),
    };
    let stored = store.insert_run(&run).and_then(|run_id| {
        let json = best.to_json().unwrap_or_else(|_| "[]".to_owned());
        store.insert_solution(run_id, best.fitness, &json, best.len() as u32, true, now)?;
        Ok(run_id)
    });
    match stored {
        Ok(run_id) => info!(run = %run_id, "reactive run persisted"),
        Err(e) => warn!(error = %e, "failed to persist reactive run"),
    }
}

/// Shared implementation of gradual application (controller method and
/// worker both call it).  Captures the pre-application settings into
/// `rollback_point` when one is supplied.
fn apply_gradually(
    sim: &SharedSimulation,
    transitions: &Mutex<TransitionSet>,
    chromosome: &Chromosome,
    duration: Duration,
    rollback_point: &Mutex<Option<Vec<LightSetting>>>,
) {
    let now = Instant::now();
    let end = now + duration;

    // Transitions lock before sim lock.
    let mut set = lock(transitions);
    let sim_guard = lock_shared(sim);

    *lock(rollback_point) = Some(sim_guard.light_settings());

    let mut genes = chromosome.genes.iter();
    let mut fresh = Vec::with_capacity(chromosome.len());
    'roads: for (&road_id, road) in &sim_guard.map {
        for (lane, light) in road.lights().iter().enumerate() {
            let Some(gene) = genes.next() else {
                break 'roads;
            };
            fresh.push(TimingTransition {
                road: road_id,
                lane,
                start_green: light.green_time(),
                end_green: gene.green,
                start_red: light.red_time(),
                end_red: gene.red,
                start: now,
                end,
            });
        }
    }

    info!(
        transitions = fresh.len(),
        seconds = duration.as_secs(),
        "gradual transitions installed"
    );
    set.replace(fresh);
}

/// Interpolate active transitions into the live lights at `now`.
fn drive_transitions(sim: &SharedSimulation, transitions: &Mutex<TransitionSet>, now: Instant) {
    // Transitions lock before sim lock.
    let mut set = lock(transitions);
    if set.is_empty() {
        return;
    }
    let mut sim_guard = lock_shared(sim);
    set.drive_at(&mut sim_guard.map, now);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_shared(sim: &SharedSimulation) -> MutexGuard<'_, atc_sim::Simulation> {
    match sim.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
