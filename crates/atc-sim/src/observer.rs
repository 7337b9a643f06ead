//! Engine observer trait.
//!
//! The runner knows nothing about metrics, patterns, or travel times; it
//! just invokes these hooks at the configured intervals while holding the
//! simulation lock.  Bridge implementations live in `atc-control`.

use crate::sim::{CityMap, TickReport};

/// Callbacks invoked by [`SimulationRunner`][crate::SimulationRunner] during
/// Phase C of the tick.  All methods have default no-op implementations so
/// implementors only override what they care about.
pub trait SimObserver: Send {
    /// Every tick, after Phases A and B.
    fn on_tick_end(&mut self, _steps: u64, _time: f64, _report: &TickReport) {}

    /// Every `metrics_interval_steps` ticks, with the post-tick map.
    fn on_metrics_interval(&mut self, _map: &CityMap, _time: f64) {}

    /// Every `stream_interval_steps` ticks — capture a streaming snapshot.
    fn on_stream_interval(&mut self, _map: &CityMap, _steps: u64, _time: f64) {}

    /// On the wall-clock pattern interval (default 60 s), with the current
    /// Unix timestamp for snapshot stamping.
    fn on_pattern_interval(&mut self, _map: &CityMap, _unix_now: i64) {}

    /// Once, when the runner loop exits.
    fn on_stop(&mut self) {}
}

/// An observer that does nothing.
pub struct NoopObserver;

impl SimObserver for NoopObserver {}
