//! Simulated traffic feed.
//!
//! A background producer that periodically publishes an expected-density
//! snapshot for every road: sampled around the stored pattern for the
//! current day/slot when one exists, otherwise estimated from road capacity.
//! Subscribers are invoked synchronously on the feed thread; the latest
//! snapshot stays available for pull access.  Shutdown goes through a
//! condition variable the thread waits on between updates, so `stop()`
//! returns promptly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use rand_distr::Distribution;
use tracing::{debug, info, warn};

use atc_core::clock::{day_and_slot, now_unix};
use atc_core::{RoadId, SimRng};
use atc_pattern::{PatternStore, StorageResult};
use atc_sim::SharedSimulation;

/// Average spacing assumed when estimating road capacity (length + gap).
const AVG_VEHICLE_SPACING: f64 = 20.0;
/// Lower bound on the update interval.
const MIN_INTERVAL_MS: u64 = 100;

/// Expected state for one road.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrafficFeedEntry {
    pub timestamp: i64,
    pub road: RoadId,
    pub expected_vehicle_count: u32,
    /// m/s; negative means unknown.
    pub expected_avg_speed: f64,
    /// 0 … 1.
    pub confidence: f64,
}

/// One full feed update.
#[derive(Clone, Debug, Default)]
pub struct TrafficFeedSnapshot {
    pub timestamp: i64,
    pub source: String,
    pub entries: Vec<TrafficFeedEntry>,
}

type FeedCallback = Box<dyn Fn(&TrafficFeedSnapshot) + Send>;

/// Pattern-driven feed producer with its own thread.
pub struct SimulatedTrafficFeed {
    store: Arc<PatternStore>,
    sim: SharedSimulation,
    interval_ms: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    shutdown: Arc<(Mutex<bool>, Condvar)>,
    subscribers: Arc<Mutex<Vec<FeedCallback>>>,
    latest: Arc<Mutex<TrafficFeedSnapshot>>,
    seed: u64,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedTrafficFeed {
    pub fn new(store: Arc<PatternStore>, sim: SharedSimulation, seed: u64) -> SimulatedTrafficFeed {
        SimulatedTrafficFeed {
            store,
            sim,
            interval_ms: Arc::new(AtomicU64::new(1_000)),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new((Mutex::new(false), Condvar::new())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            latest: Arc::new(Mutex::new(TrafficFeedSnapshot::default())),
            seed,
            handle: None,
        }
    }

    /// Register a callback invoked for every snapshot, on the feed thread.
    pub fn subscribe(&self, callback: FeedCallback) {
        let mut subscribers = lock(&self.subscribers);
        subscribers.push(callback);
        debug!(total = subscribers.len(), "feed subscriber added");
    }

    /// The most recent snapshot (empty before the first update).
    pub fn latest_snapshot(&self) -> TrafficFeedSnapshot {
        lock(&self.latest).clone()
    }

    pub fn set_update_interval_ms(&self, interval_ms: u64) {
        let clamped = interval_ms.max(MIN_INTERVAL_MS);
        if clamped != interval_ms {
            warn!(requested = interval_ms, clamped, "feed interval too low");
        }
        self.interval_ms.store(clamped, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the feed thread.  A second start is a no-op.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("traffic feed already running");
            return;
        }
        *lock(&self.shutdown.0) = false;

        let store = Arc::clone(&self.store);
        let sim = Arc::clone(&self.sim);
        let interval_ms = Arc::clone(&self.interval_ms);
        let running = Arc::clone(&self.running);
        let shutdown = Arc::clone(&self.shutdown);
        let subscribers = Arc::clone(&self.subscribers);
        let latest = Arc::clone(&self.latest);
        let mut rng = SimRng::derive(self.seed, u64::from(u32::MAX));

        info!(
            interval_ms = interval_ms.load(Ordering::SeqCst),
            "traffic feed started"
        );

        self.handle = Some(std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                match generate_snapshot(&store, &sim, now_unix(), &mut rng) {
                    Ok(snapshot) => {
                        *lock(&latest) = snapshot.clone();
                        for callback in lock(&subscribers).iter() {
                            callback(&snapshot);
                        }
                    }
                    Err(e) => warn!(error = %e, "feed snapshot generation failed"),
                }

                // Interruptible sleep: stop() flips the flag and notifies.
                let (mutex, cvar) = &*shutdown;
                let guard = match mutex.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let wait = Duration::from_millis(interval_ms.load(Ordering::SeqCst));
                let _ = cvar.wait_timeout_while(guard, wait, |stopped| !*stopped);
            }
            debug!("feed loop ended");
        }));
    }

    /// Signal shutdown and join the feed thread.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        {
            let (mutex, cvar) = &*self.shutdown;
            let mut stopped = match mutex.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *stopped = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        info!("traffic feed stopped");
    }
}

impl Drop for SimulatedTrafficFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build one snapshot: pattern-sampled where history exists, capacity
/// estimate otherwise.
pub(crate) fn generate_snapshot(
    store: &PatternStore,
    sim: &SharedSimulation,
    now: i64,
    rng: &mut SimRng,
) -> StorageResult<TrafficFeedSnapshot> {
    let (dow, slot) = day_and_slot(now);
    let patterns: std::collections::HashMap<RoadId, _> = store
        .patterns_for_slot(dow, slot)?
        .into_iter()
        .map(|p| (p.road, p))
        .collect();

    // (id, length, lanes, max_speed) per road, copied out under the lock.
    let roads: Vec<(RoadId, f64, usize, f64)> = {
        let guard = match sim.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .map
            .values()
            .map(|r| (r.id(), r.length(), r.lanes(), r.max_speed()))
            .collect()
    };

    let mut entries = Vec::with_capacity(roads.len());
    for (road, length, lanes, max_speed) in roads {
        let entry = match patterns.get(&road) {
            Some(pattern) if pattern.sample_count > 0 => {
                // Sample around the historical mean with damped variation.
                let stddev = if pattern.stddev_vehicle_count > 0.0 {
                    pattern.stddev_vehicle_count
                } else {
                    pattern.avg_vehicle_count * 0.1
                };
                let count = rand_distr::Normal::new(pattern.avg_vehicle_count, stddev * 0.3)
                    .map(|normal| normal.sample(rng.inner()))
                    .unwrap_or(pattern.avg_vehicle_count);
                TrafficFeedEntry {
                    timestamp: now,
                    road,
                    expected_vehicle_count: count.round().max(0.0) as u32,
                    expected_avg_speed: pattern.avg_speed,
                    confidence: (f64::from(pattern.sample_count) / 10.0).min(1.0),
                }
            }
            _ => {
                // No history: assume 30–50 % utilization of road capacity.
                let capacity_per_lane = (length / AVG_VEHICLE_SPACING) as u32;
                let utilization = rng.gen_range(0.3..0.5);
                let estimated =
                    (f64::from(capacity_per_lane) * lanes as f64 * utilization) as u32;
                TrafficFeedEntry {
                    timestamp: now,
                    road,
                    expected_vehicle_count: estimated.max(1),
                    expected_avg_speed: max_speed * 0.7,
                    confidence: 0.5,
                }
            }
        };
        entries.push(entry);
    }

    Ok(TrafficFeedSnapshot {
        timestamp: now,
        source: "simulated".to_owned(),
        entries,
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
