//! Flow-rate driven vehicle spawning.
//!
//! The control surface configures rates in vehicles/minute per (road, lane).
//! Each tick converts the rate into a fractional accumulator increment; a
//! whole vehicle is spawned whenever the accumulator crosses 1.  When the
//! lane entry is blocked the accumulator is capped at 1, so a jammed lane
//! retries as soon as it clears instead of releasing a burst.

use rustc_hash::FxHashMap;

use atc_core::{RoadId, SimRng};

use crate::sim::CityMap;

/// One lane's configured inflow.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FlowRate {
    pub road: RoadId,
    pub lane: usize,
    pub vehicles_per_minute: f64,
}

/// Accumulating spawner driven from the engine loop.
#[derive(Debug)]
pub struct SpawnScheduler {
    rates: Vec<FlowRate>,
    accumulators: FxHashMap<(RoadId, usize), f64>,
    enabled: bool,
    rng: SimRng,
}

impl SpawnScheduler {
    pub fn new(seed: u64) -> SpawnScheduler {
        SpawnScheduler {
            rates: Vec::new(),
            accumulators: FxHashMap::default(),
            enabled: false,
            rng: SimRng::derive(seed, u64::MAX),
        }
    }

    /// Replace the configured rates.  Accumulators of lanes that keep their
    /// rate survive, so reconfiguration does not drop fractional progress.
    pub fn set_rates(&mut self, rates: Vec<FlowRate>) {
        self.accumulators
            .retain(|key, _| rates.iter().any(|r| (r.road, r.lane) == *key));
        self.rates = rates;
    }

    pub fn rates(&self) -> &[FlowRate] {
        &self.rates
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fractional vehicles owed to a lane — status-surface visibility into
    /// backlog on blocked entries.
    pub fn pending(&self, road: RoadId, lane: usize) -> f64 {
        self.accumulators.get(&(road, lane)).copied().unwrap_or(0.0)
    }

    /// Advance accumulators by `dt` seconds and spawn what is due.
    ///
    /// Spawned cars start at half the road's speed limit with an
    /// aggressivity drawn uniformly from [0.3, 0.7].
    pub fn tick(&mut self, map: &mut CityMap, dt: f64) -> u32 {
        if !self.enabled {
            return 0;
        }

        let mut spawned = 0u32;
        for rate in &self.rates {
            let accumulator = self
                .accumulators
                .entry((rate.road, rate.lane))
                .or_insert(0.0);
            *accumulator += rate.vehicles_per_minute * dt / 60.0;

            let Some(road) = map.get_mut(&rate.road) else {
                continue;
            };

            while *accumulator >= 1.0 {
                let velocity = road.max_speed() * 0.5;
                let aggressivity = self.rng.gen_range(0.3..0.7);
                if road.spawn_vehicle(rate.lane, velocity, aggressivity) {
                    *accumulator -= 1.0;
                    spawned += 1;
                } else {
                    // Entry blocked: retry next tick, no catch-up burst.
                    *accumulator = accumulator.min(1.0);
                    break;
                }
            }
        }
        spawned
    }
}
