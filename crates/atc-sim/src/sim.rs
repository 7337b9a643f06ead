//! The city map and the two-phase simulation step.
//!
//! # One tick
//!
//! 1. **Phase A — per-road updates.**  An [`EntryIndex`] is built from the
//!    pre-tick state, then every road is stepped independently (on Rayon
//!    workers with the `parallel` feature).  Each road appends to its own
//!    transition buffer; buffers are merged in ascending road-id order so
//!    the result is identical however the work was scheduled.
//! 2. **Phase B — serial transition apply.**  Each emitted transition moves
//!    its vehicle to position 0 of the destination road; a dangling
//!    destination id counts the vehicle as exited instead.
//!
//! The map is a `BTreeMap` keyed by [`RoadId`]: iteration order is the
//! canonical "road id ascending" order that chromosome gene layout, buffer
//! merging, and light-settings queries all rely on.

use std::collections::BTreeMap;

use tracing::warn;

use atc_core::RoadId;

use crate::error::{SimError, SimResult};
use crate::road::{Road, RoadTransition, entry_index};

/// All roads of the simulated city, keyed by id.
pub type CityMap = BTreeMap<RoadId, Road>;

/// Per-lane light timing triple, used by the external control surface.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LightSetting {
    pub road: RoadId,
    pub lane: usize,
    pub green: f64,
    pub yellow: f64,
    pub red: f64,
}

/// What one step did — fed to metrics accumulation.
#[derive(Copy, Clone, Debug, Default)]
pub struct TickReport {
    /// Vehicles that moved between roads this tick.
    pub transitions_applied: usize,
    /// Vehicles that left the network this tick.
    pub vehicles_exited: u32,
}

/// The simulated world: the road map plus the simulation clock.
#[derive(Clone, Debug, Default)]
pub struct Simulation {
    pub map: CityMap,
    /// Simulated seconds since start.
    pub time: f64,
    /// Ticks executed.
    pub steps: u64,
}

impl Simulation {
    pub fn new() -> Simulation {
        Simulation::default()
    }

    pub fn with_map(map: CityMap) -> Simulation {
        Simulation {
            map,
            time: 0.0,
            steps: 0,
        }
    }

    /// Insert a road, keyed by its id.
    pub fn add_road(&mut self, road: Road) -> RoadId {
        let id = road.id();
        self.map.insert(id, road);
        id
    }

    /// Total vehicles currently in the network.
    pub fn vehicle_count(&self) -> usize {
        self.map.values().map(Road::vehicle_count).sum()
    }

    /// Total traffic lights (one per lane per road) — the chromosome length
    /// for this network.
    pub fn light_count(&self) -> usize {
        light_count(&self.map)
    }

    /// Advance the whole network by `dt` seconds.
    pub fn step(&mut self, dt: f64) -> TickReport {
        // ── Phase A: independent road updates ─────────────────────────────
        let entries = entry_index(self.map.values());

        #[cfg(feature = "parallel")]
        let results: Vec<(Vec<RoadTransition>, u32)> = {
            use rayon::prelude::*;
            self.map
                .par_iter_mut()
                .map(|(_, road)| {
                    let mut buffer = Vec::new();
                    let exited = road.update(dt, &entries, &mut buffer);
                    (buffer, exited)
                })
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results: Vec<(Vec<RoadTransition>, u32)> = self
            .map
            .values_mut()
            .map(|road| {
                let mut buffer = Vec::new();
                let exited = road.update(dt, &entries, &mut buffer);
                (buffer, exited)
            })
            .collect();

        // Merge per-road buffers.  `collect` preserves the map's ascending
        // id order even when the updates ran on worker threads.
        let mut exited = 0u32;
        let mut pending = Vec::new();
        for (buffer, road_exited) in results {
            exited += road_exited;
            pending.extend(buffer);
        }

        // ── Phase B: serial transition apply ──────────────────────────────
        let mut applied = 0usize;
        for RoadTransition { mut vehicle, to, lane } in pending {
            match self.map.get_mut(&to) {
                Some(dest) => {
                    vehicle.set_position(0.0);
                    dest.add_vehicle(vehicle, lane);
                    applied += 1;
                }
                None => {
                    warn!(dest = %to, "transition to unknown road, vehicle counted as exited");
                    exited += 1;
                }
            }
        }

        self.time += dt;
        self.steps += 1;

        TickReport {
            transitions_applied: applied,
            vehicles_exited: exited,
        }
    }

    // ── Control-surface helpers ───────────────────────────────────────────

    /// Current timings of every light, road id ascending then lane ascending.
    pub fn light_settings(&self) -> Vec<LightSetting> {
        self.map
            .iter()
            .flat_map(|(&road, r)| {
                r.lights().iter().enumerate().map(move |(lane, light)| LightSetting {
                    road,
                    lane,
                    green: light.green_time(),
                    yellow: light.yellow_time(),
                    red: light.red_time(),
                })
            })
            .collect()
    }

    /// Apply explicit light timings.  Fails on an unknown road or lane
    /// without applying the remainder.
    pub fn apply_light_settings(&mut self, settings: &[LightSetting]) -> SimResult<()> {
        for s in settings {
            let road = self
                .map
                .get_mut(&s.road)
                .ok_or(SimError::RoadNotFound(s.road))?;
            let lanes = road.lanes();
            let light = road
                .lights_mut()
                .get_mut(s.lane)
                .ok_or(SimError::LaneOutOfRange {
                    road: s.road,
                    lane: s.lane,
                    lanes,
                })?;
            light.set_timings(s.green, s.yellow, s.red);
        }
        Ok(())
    }
}

/// Chromosome length of a map: one light per lane per road.
pub fn light_count(map: &CityMap) -> usize {
    map.values().map(Road::lanes).sum()
}
