//! Observer bridges from the engine loop to the collectors.
//!
//! The runner invokes [`SimObserver`] hooks under the simulation mutex;
//! these bridges forward each hook to the component that cares.  Storage
//! failures are logged and swallowed — an observer must never take down the
//! engine loop.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use atc_metrics::{MetricsCollector, TravelTimeCollector, road_metrics};
use atc_pattern::PatternStore;
use atc_sim::sim::{CityMap, TickReport};
use atc_sim::{SimObserver, SimulationSnapshot};

/// Feeds tick reports and metric samples into a shared [`MetricsCollector`].
pub struct MetricsObserver {
    collector: Arc<Mutex<MetricsCollector>>,
}

impl MetricsObserver {
    pub fn new(collector: Arc<Mutex<MetricsCollector>>) -> MetricsObserver {
        MetricsObserver { collector }
    }
}

impl SimObserver for MetricsObserver {
    fn on_tick_end(&mut self, _steps: u64, _time: f64, report: &TickReport) {
        if report.vehicles_exited > 0 {
            lock(&self.collector).record_exits(report.vehicles_exited);
        }
    }

    fn on_metrics_interval(&mut self, map: &CityMap, _time: f64) {
        lock(&self.collector).collect(map);
    }
}

/// Records per-road snapshot batches into the pattern store.
pub struct PatternObserver {
    store: Arc<PatternStore>,
}

impl PatternObserver {
    pub fn new(store: Arc<PatternStore>) -> PatternObserver {
        PatternObserver { store }
    }
}

impl SimObserver for PatternObserver {
    fn on_pattern_interval(&mut self, map: &CityMap, unix_now: i64) {
        let batch = road_metrics(map);
        if let Err(e) = self.store.record_snapshot_batch(&batch, unix_now) {
            warn!(error = %e, "failed to record pattern snapshot batch");
        }
    }
}

/// Advances O/D travel-time tracking on the metrics cadence.
pub struct TravelTimeObserver {
    collector: Arc<Mutex<TravelTimeCollector>>,
}

impl TravelTimeObserver {
    pub fn new(collector: Arc<Mutex<TravelTimeCollector>>) -> TravelTimeObserver {
        TravelTimeObserver { collector }
    }
}

impl SimObserver for TravelTimeObserver {
    fn on_metrics_interval(&mut self, map: &CityMap, time: f64) {
        lock(&self.collector).update(map, time);
    }
}

/// Keeps the latest streaming snapshot available for the event stream.
pub struct StreamObserver {
    latest: Arc<Mutex<SimulationSnapshot>>,
}

impl StreamObserver {
    pub fn new(latest: Arc<Mutex<SimulationSnapshot>>) -> StreamObserver {
        StreamObserver { latest }
    }
}

impl SimObserver for StreamObserver {
    fn on_stream_interval(&mut self, map: &CityMap, steps: u64, time: f64) {
        *lock(&self.latest) = SimulationSnapshot::capture(map, steps, time);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
