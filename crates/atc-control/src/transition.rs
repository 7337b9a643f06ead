//! Gradual light-timing transitions.
//!
//! A transition linearly interpolates one light's (green, red) from the
//! values installed when the chromosome was accepted to the chromosome's
//! values, over a fixed monotonic-clock window.  The active set is keyed by
//! `(road, lane)` and replaced atomically when a new chromosome arrives, so
//! no two transitions ever target the same light.

use std::time::Instant;

use tracing::debug;

use atc_core::RoadId;
use atc_optimize::FIXED_YELLOW;
use atc_sim::sim::CityMap;

/// One light's interpolation schedule.
#[derive(Copy, Clone, Debug)]
pub struct TimingTransition {
    pub road: RoadId,
    pub lane: usize,
    pub start_green: f64,
    pub end_green: f64,
    pub start_red: f64,
    pub end_red: f64,
    pub start: Instant,
    pub end: Instant,
}

impl TimingTransition {
    /// Interpolation fraction at `now`, clamped to [0, 1].
    pub fn progress_at(&self, now: Instant) -> f64 {
        if now >= self.end {
            return 1.0;
        }
        if now <= self.start {
            return 0.0;
        }
        let elapsed = now.duration_since(self.start).as_secs_f64();
        let total = self.end.duration_since(self.start).as_secs_f64();
        if total > 0.0 { elapsed / total } else { 1.0 }
    }

    pub fn green_at(&self, now: Instant) -> f64 {
        self.start_green + (self.end_green - self.start_green) * self.progress_at(now)
    }

    pub fn red_at(&self, now: Instant) -> f64 {
        self.start_red + (self.end_red - self.start_red) * self.progress_at(now)
    }

    pub fn is_complete_at(&self, now: Instant) -> bool {
        now >= self.end
    }

    pub fn progress(&self) -> f64 {
        self.progress_at(Instant::now())
    }
}

/// The active transitions, replaced wholesale per accepted chromosome.
#[derive(Debug, Default)]
pub struct TransitionSet {
    active: Vec<TimingTransition>,
}

impl TransitionSet {
    pub fn new() -> TransitionSet {
        TransitionSet::default()
    }

    /// Swap in a fresh transition set, dropping whatever was in flight.
    pub fn replace(&mut self, transitions: Vec<TimingTransition>) {
        debug!(count = transitions.len(), "transition set replaced");
        self.active = transitions;
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn active(&self) -> &[TimingTransition] {
        &self.active
    }

    /// Push the interpolated timings at `now` into the live map and drop
    /// transitions that have finished.
    ///
    /// Caller holds the sim mutex (and the transitions mutex around `self`).
    pub fn drive_at(&mut self, map: &mut CityMap, now: Instant) {
        for transition in &self.active {
            let Some(road) = map.get_mut(&transition.road) else {
                continue;
            };
            let Some(light) = road.lights_mut().get_mut(transition.lane) else {
                continue;
            };
            light.set_timings(
                transition.green_at(now),
                FIXED_YELLOW,
                transition.red_at(now),
            );
        }
        self.active.retain(|t| !t.is_complete_at(now));
    }
}
