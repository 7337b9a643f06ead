//! The live engine thread.
//!
//! One dedicated thread drives the tick loop; everything else (control
//! surface, optimizer, predictor) reaches the world through the shared
//! simulation mutex.  The loop observes atomic stop/pause/continuous flags
//! at every suspension point, so teardown completes within the pause-poll
//! interval.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::info;

use atc_core::clock::now_unix;

use crate::error::{SimError, SimResult};
use crate::observer::SimObserver;
use crate::sim::Simulation;
use crate::spawn::SpawnScheduler;

/// The world behind the simulation mutex — the single writer lock every
/// component agrees on.
pub type SharedSimulation = Arc<Mutex<Simulation>>;

/// Lock a mutex, recovering from poisoning.
///
/// Background loops are required to survive a panicking peer; the inner
/// state is still consistent enough to continue (a poisoned tick is simply
/// retried on the next interval).
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Engine loop configuration.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Simulated seconds per tick.
    pub dt: f64,
    /// Metrics sample interval, in ticks.
    pub metrics_interval_steps: u64,
    /// Streaming-snapshot interval, in ticks.
    pub stream_interval_steps: u64,
    /// Pattern-snapshot interval, wall-clock seconds.
    pub pattern_interval_secs: u64,
    /// Ticks to run when not in continuous mode.
    pub step_limit: u64,
    /// Ignore the step limit and run until stopped.
    pub continuous: bool,
    /// Sleep between ticks, bounding CPU use.
    pub tick_sleep: Duration,
    /// Poll interval while paused.
    pub pause_poll: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            dt: 0.1,
            metrics_interval_steps: 10,
            stream_interval_steps: 5,
            pattern_interval_secs: 60,
            step_limit: 10_000,
            continuous: false,
            tick_sleep: Duration::from_millis(10),
            pause_poll: Duration::from_millis(100),
        }
    }
}

/// Drives the engine tick loop on a dedicated thread.
pub struct SimulationRunner {
    sim: SharedSimulation,
    spawner: Arc<Mutex<SpawnScheduler>>,
    config: RunnerConfig,
    should_stop: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    continuous: Arc<AtomicBool>,
    step_limit: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl SimulationRunner {
    pub fn new(
        sim: SharedSimulation,
        spawner: Arc<Mutex<SpawnScheduler>>,
        config: RunnerConfig,
    ) -> SimulationRunner {
        let continuous = config.continuous;
        let step_limit = config.step_limit;
        SimulationRunner {
            sim,
            spawner,
            config,
            should_stop: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            continuous: Arc::new(AtomicBool::new(continuous)),
            step_limit: Arc::new(AtomicU64::new(step_limit)),
            handle: None,
        }
    }

    /// Handle to the shared world.
    pub fn simulation(&self) -> SharedSimulation {
        Arc::clone(&self.sim)
    }

    /// Handle to the spawn scheduler (for flow-rate reconfiguration).
    pub fn spawner(&self) -> Arc<Mutex<SpawnScheduler>> {
        Arc::clone(&self.spawner)
    }

    /// Spawn the loop thread.  Observers are invoked under the simulation
    /// mutex in the order given.
    pub fn start(&mut self, mut observers: Vec<Box<dyn SimObserver>>) -> SimResult<()> {
        if self.handle.is_some() {
            return Err(SimError::AlreadyRunning);
        }
        self.should_stop.store(false, Ordering::SeqCst);

        let sim = Arc::clone(&self.sim);
        let spawner = Arc::clone(&self.spawner);
        let should_stop = Arc::clone(&self.should_stop);
        let paused = Arc::clone(&self.paused);
        let continuous = Arc::clone(&self.continuous);
        let step_limit = Arc::clone(&self.step_limit);
        let config = self.config.clone();

        info!(
            dt = config.dt,
            continuous = continuous.load(Ordering::SeqCst),
            step_limit = step_limit.load(Ordering::SeqCst),
            "simulation loop starting"
        );

        self.handle = Some(std::thread::spawn(move || {
            let pattern_interval = Duration::from_secs(config.pattern_interval_secs);
            let metrics_every = config.metrics_interval_steps.max(1);
            let stream_every = config.stream_interval_steps.max(1);
            let mut last_pattern = Instant::now();
            let mut steps_done: u64;

            loop {
                if should_stop.load(Ordering::SeqCst) {
                    break;
                }
                while paused.load(Ordering::SeqCst) && !should_stop.load(Ordering::SeqCst) {
                    std::thread::sleep(config.pause_poll);
                }
                if should_stop.load(Ordering::SeqCst) {
                    break;
                }

                {
                    let mut world = lock(&sim);
                    let report = world.step(config.dt);
                    lock(&spawner).tick(&mut world.map, config.dt);

                    steps_done = world.steps;
                    let time = world.time;

                    for observer in observers.iter_mut() {
                        observer.on_tick_end(steps_done, time, &report);
                    }
                    if steps_done % metrics_every == 0 {
                        for observer in observers.iter_mut() {
                            observer.on_metrics_interval(&world.map, time);
                        }
                    }
                    if steps_done % stream_every == 0 {
                        for observer in observers.iter_mut() {
                            observer.on_stream_interval(&world.map, steps_done, time);
                        }
                    }
                    if last_pattern.elapsed() >= pattern_interval {
                        last_pattern = Instant::now();
                        let unix = now_unix();
                        for observer in observers.iter_mut() {
                            observer.on_pattern_interval(&world.map, unix);
                        }
                    }
                }

                if !continuous.load(Ordering::SeqCst)
                    && steps_done >= step_limit.load(Ordering::SeqCst)
                {
                    break;
                }
                std::thread::sleep(config.tick_sleep);
            }

            for observer in observers.iter_mut() {
                observer.on_stop();
            }
            info!("simulation loop stopped");
        }));

        Ok(())
    }

    /// Signal the loop to stop and join it.
    pub fn stop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn set_continuous(&self, continuous: bool) {
        self.continuous.store(continuous, Ordering::SeqCst);
    }

    pub fn set_step_limit(&self, limit: u64) {
        self.step_limit.store(limit, Ordering::SeqCst);
    }
}

impl Drop for SimulationRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
