//! Origin/destination travel-time tracking.
//!
//! Registered O/D pairs are indexed by origin road.  On each update pass a
//! vehicle first sighted on an origin road is enrolled; when it later shows
//! up on the destination road a sample is recorded and the tracker retired.
//! A tracker whose vehicle vanished from the network is dropped silently —
//! the vehicle exited before reaching the destination.
//!
//! Elapsed time is measured on the simulation clock, so samples stay
//! meaningful for step-driven runs that don't pace against the wall clock.

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, trace};

use atc_core::{OdPairId, RoadId, VehicleId};
use atc_sim::sim::CityMap;

/// A registered origin/destination pair.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OdPair {
    pub id: OdPairId,
    pub origin: RoadId,
    pub destination: RoadId,
    pub name: String,
}

/// A completed traversal.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TravelTimeSample {
    pub od: OdPairId,
    pub vehicle: VehicleId,
    pub seconds: f64,
}

/// Summary statistics for one O/D pair.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TravelTimeStats {
    pub od: OdPairId,
    pub sample_count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
}

#[derive(Clone, Debug)]
struct Tracker {
    od: OdPairId,
    destination: RoadId,
    start_time: f64,
}

/// Tracks vehicles between registered origin and destination roads.
#[derive(Debug, Default)]
pub struct TravelTimeCollector {
    pairs: BTreeMap<OdPairId, OdPair>,
    /// Origin road → pairs starting there, in registration order.
    origin_index: FxHashMap<RoadId, Vec<OdPairId>>,
    /// One tracker per in-flight vehicle.  When several pairs share an
    /// origin, enrollment walks them in registration order and each insert
    /// overwrites the previous, so the last-registered pair wins.
    tracked: FxHashMap<VehicleId, Tracker>,
    samples: Vec<TravelTimeSample>,
    next_id: u32,
}

impl TravelTimeCollector {
    pub fn new() -> TravelTimeCollector {
        TravelTimeCollector::default()
    }

    /// Register a pair; an existing (origin, destination) pair is returned
    /// instead of duplicated.  An empty name gets a generated one.
    pub fn add_od_pair(&mut self, origin: RoadId, destination: RoadId, name: &str) -> OdPairId {
        if let Some(existing) = self
            .pairs
            .values()
            .find(|p| p.origin == origin && p.destination == destination)
        {
            return existing.id;
        }

        let id = OdPairId(self.next_id);
        self.next_id += 1;
        let name = if name.is_empty() {
            format!("{origin} -> {destination}")
        } else {
            name.to_owned()
        };

        info!(od = %id, %origin, %destination, name, "added O/D pair");
        self.pairs.insert(
            id,
            OdPair {
                id,
                origin,
                destination,
                name,
            },
        );
        self.origin_index.entry(origin).or_default().push(id);
        id
    }

    /// Remove a pair and its in-flight trackers and samples.
    pub fn remove_od_pair(&mut self, id: OdPairId) {
        let Some(pair) = self.pairs.remove(&id) else {
            return;
        };
        if let Some(ids) = self.origin_index.get_mut(&pair.origin) {
            ids.retain(|&other| other != id);
        }
        self.tracked.retain(|_, t| t.od != id);
        self.samples.retain(|s| s.od != id);
        info!(od = %id, "removed O/D pair");
    }

    pub fn pairs(&self) -> impl Iterator<Item = &OdPair> {
        self.pairs.values()
    }

    pub fn pair(&self, id: OdPairId) -> Option<&OdPair> {
        self.pairs.get(&id)
    }

    /// One tracking pass over the network at simulation time `now`.
    pub fn update(&mut self, map: &CityMap, now: f64) {
        if self.pairs.is_empty() {
            return;
        }

        let mut seen: FxHashSet<VehicleId> = FxHashSet::default();

        for (&road_id, road) in map {
            for lane in road.vehicles() {
                for vehicle in lane {
                    let id = vehicle.id();
                    seen.insert(id);

                    if let Some(tracker) = self.tracked.get(&id) {
                        if road_id == tracker.destination {
                            let sample = TravelTimeSample {
                                od: tracker.od,
                                vehicle: id,
                                seconds: now - tracker.start_time,
                            };
                            debug!(od = %sample.od, vehicle = %id, seconds = sample.seconds, "O/D traversal complete");
                            self.samples.push(sample);
                            self.tracked.remove(&id);
                        }
                    } else if let Some(od_ids) = self.origin_index.get(&road_id) {
                        for &od in od_ids {
                            let destination = self.pairs[&od].destination;
                            trace!(od = %od, vehicle = %id, "tracking vehicle");
                            self.tracked.insert(
                                id,
                                Tracker {
                                    od,
                                    destination,
                                    start_time: now,
                                },
                            );
                        }
                    }
                }
            }
        }

        // Vehicles that left the network before the destination.
        self.tracked.retain(|vehicle, _| {
            let keep = seen.contains(vehicle);
            if !keep {
                trace!(vehicle = %vehicle, "tracked vehicle left the network");
            }
            keep
        });
    }

    /// Number of vehicles currently being tracked.
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Statistics over all retained samples of `od`.
    pub fn stats(&self, od: OdPairId) -> TravelTimeStats {
        let mut times: Vec<f64> = self
            .samples
            .iter()
            .filter(|s| s.od == od)
            .map(|s| s.seconds)
            .collect();

        if times.is_empty() {
            return TravelTimeStats {
                od,
                ..TravelTimeStats::default()
            };
        }
        times.sort_by(|a, b| a.total_cmp(b));

        let n = times.len();
        let p50 = if n % 2 == 0 {
            (times[n / 2 - 1] + times[n / 2]) / 2.0
        } else {
            times[n / 2]
        };
        let p95 = times[((n as f64 * 0.95) as usize).min(n - 1)];

        TravelTimeStats {
            od,
            sample_count: n,
            min: times[0],
            max: times[n - 1],
            mean: times.iter().sum::<f64>() / n as f64,
            p50,
            p95,
        }
    }

    /// Stats for every registered pair.
    pub fn all_stats(&self) -> Vec<TravelTimeStats> {
        self.pairs.keys().map(|&od| self.stats(od)).collect()
    }

    /// Most recent samples for a pair, newest first.
    pub fn recent_samples(&self, od: OdPairId, limit: usize) -> Vec<TravelTimeSample> {
        self.samples
            .iter()
            .rev()
            .filter(|s| s.od == od)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn reset(&mut self) {
        self.tracked.clear();
        self.samples.clear();
    }
}
