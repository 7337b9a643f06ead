//! Roads — one-way segments bounded by per-lane traffic lights.
//!
//! Lane 0 is the rightmost ("slow") lane.  Within a lane, vehicles are kept
//! sorted strictly ascending by position; the per-road tick walks them from
//! front to back so every follower sees its leader already advanced for the
//! same tick.
//!
//! Roads know their neighbours only through id-keyed connection lists, and
//! the tick reads destination state through a pre-built [`EntryIndex`]
//! rather than touching other `Road` values, which is what makes the
//! per-road phase safe to fan out across Rayon workers.

use rustc_hash::FxHashMap;
use tracing::{error, trace, warn};

use atc_core::{CartPoint, GeoPoint, RoadId, SimRng};

use crate::light::TrafficLight;
use crate::vehicle::{DEFAULT_VEHICLE_LENGTH, Leader, Vehicle};

/// Don't evaluate a lane change when the leader is further ahead than this.
const MAX_CHANGE_LANE_DIST: f64 = 25.0;

/// Queue rule: a vehicle this close to the stop line ...
pub const QUEUE_DISTANCE: f64 = 50.0;
/// ... and slower than this counts as queued.
pub const QUEUE_SPEED: f64 = 2.0;

/// Default light durations for a freshly built road (green, yellow, red).
const DEFAULT_LIGHT_TIMINGS: (f64, f64, f64) = (30.0, 3.0, 30.0);

/// A weighted outgoing connection from one lane.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Connection {
    pub to: RoadId,
    /// Non-negative usage weight, normalized at selection time.
    pub weight: f64,
}

/// A vehicle leaving one road for another, emitted during Phase A and
/// applied serially in Phase B.  Carries the vehicle by value.
#[derive(Clone, Debug)]
pub struct RoadTransition {
    pub vehicle: Vehicle,
    pub to: RoadId,
    pub lane: usize,
}

/// Read-only entry-admissibility index for one tick: road id → position of
/// the first vehicle on lane 0 (`f64::INFINITY` for an empty lane).
///
/// Built once before Phase A from the pre-tick state, so parallel road
/// updates never read each other's live lanes.
pub type EntryIndex = FxHashMap<RoadId, f64>;

/// Build the [`EntryIndex`] for a road map.
pub fn entry_index<'a, I>(roads: I) -> EntryIndex
where
    I: IntoIterator<Item = &'a Road>,
{
    roads
        .into_iter()
        .map(|road| (road.id(), road.entry_front_position()))
        .collect()
}

/// What the tick decided to do with one vehicle.
enum Action {
    Keep,
    /// Remove; the vehicle left the network (counts as an exit).
    Exit,
    /// Remove; emit a transition to this road's lane 0.
    Transition(RoadId),
    /// Remove from this lane, insert into the target lane.
    LaneChange(usize),
}

/// A one-way road segment.
#[derive(Clone, Debug)]
pub struct Road {
    id: RoadId,
    length: f64,
    max_speed: f64,
    start_cart: CartPoint,
    end_cart: CartPoint,
    start_geo: GeoPoint,
    end_geo: GeoPoint,
    /// Per-lane vehicle sequences, sorted strictly ascending by position.
    vehicles: Vec<Vec<Vehicle>>,
    /// One light per lane.
    lights: Vec<TrafficLight>,
    /// Per-lane outgoing connections.
    connections: Vec<Vec<Connection>>,
    /// Deterministic per-road stream for connection choice.  Cloned with the
    /// road, so snapshot evaluations replay identically.
    rng: SimRng,
}

impl Road {
    /// Build a road with `lanes` lanes, default light timings, and a
    /// deterministic RNG stream derived from `seed` and the allocated id.
    ///
    /// Each lane's light starts at a random point of its cycle so that a
    /// fleet of roads never ticks in phase.
    pub fn new(length: f64, lanes: usize, max_speed: f64, seed: u64) -> Road {
        let id = RoadId::next();
        let lanes = lanes.max(1);
        let mut rng = SimRng::derive(seed, id.raw());

        let (g, y, r) = DEFAULT_LIGHT_TIMINGS;
        let lights = (0..lanes).map(|_| TrafficLight::new(g, y, r, &mut rng)).collect();

        trace!(road = %id, length, lanes, max_speed, "new road");

        Road {
            id,
            length,
            max_speed,
            start_cart: CartPoint::default(),
            end_cart: CartPoint::default(),
            start_geo: CartPoint::default().to_geo(),
            end_geo: CartPoint::default().to_geo(),
            vehicles: vec![Vec::new(); lanes],
            lights,
            connections: vec![Vec::new(); lanes],
            rng,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn id(&self) -> RoadId {
        self.id
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    #[inline]
    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    #[inline]
    pub fn lanes(&self) -> usize {
        self.vehicles.len()
    }

    pub fn vehicles(&self) -> &[Vec<Vehicle>] {
        &self.vehicles
    }

    pub fn lights(&self) -> &[TrafficLight] {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut [TrafficLight] {
        &mut self.lights
    }

    pub fn connections(&self) -> &[Vec<Connection>] {
        &self.connections
    }

    pub fn start_geo(&self) -> GeoPoint {
        self.start_geo
    }

    pub fn end_geo(&self) -> GeoPoint {
        self.end_geo
    }

    pub fn start_cart(&self) -> CartPoint {
        self.start_cart
    }

    pub fn end_cart(&self) -> CartPoint {
        self.end_cart
    }

    /// Cartesian point at `position` meters along the road.
    pub fn point_at(&self, position: f64) -> CartPoint {
        let t = if self.length > 0.0 { position / self.length } else { 0.0 };
        self.start_cart.lerp(self.end_cart, t)
    }

    /// Set cartesian endpoints; geographic endpoints are projected from them.
    pub fn set_cartesian(&mut self, start: CartPoint, end: CartPoint) {
        self.start_cart = start;
        self.end_cart = end;
        self.start_geo = start.to_geo();
        self.end_geo = end.to_geo();
    }

    /// Per-lane light colors as 'G' / 'Y' / 'R'.
    pub fn current_light_config(&self) -> Vec<char> {
        self.lights.iter().map(|l| l.phase().code()).collect()
    }

    /// Total vehicles across all lanes.
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.iter().map(Vec::len).sum()
    }

    /// Vehicles queued at the stop line (within [`QUEUE_DISTANCE`] of the
    /// end, slower than [`QUEUE_SPEED`]).
    pub fn queue_length(&self) -> usize {
        self.vehicles
            .iter()
            .flatten()
            .filter(|v| v.position() >= self.length - QUEUE_DISTANCE && v.velocity() < QUEUE_SPEED)
            .count()
    }

    /// Mean velocity over all vehicles, 0 when the road is empty.
    pub fn mean_velocity(&self) -> f64 {
        let count = self.vehicle_count();
        if count == 0 {
            return 0.0;
        }
        let total: f64 = self.vehicles.iter().flatten().map(Vehicle::velocity).sum();
        total / count as f64
    }

    /// Position of the first vehicle on lane 0, `INFINITY` when empty.
    pub fn entry_front_position(&self) -> f64 {
        self.vehicles[0]
            .first()
            .map_or(f64::INFINITY, Vehicle::position)
    }

    // ── Mutation ──────────────────────────────────────────────────────────

    /// Insert `vehicle` into `lane`, ordered by position, recording this
    /// road in its itinerary.  An out-of-range lane is clamped to 0 with a
    /// warning.
    pub fn add_vehicle(&mut self, mut vehicle: Vehicle, lane: usize) -> bool {
        let lane = if lane >= self.vehicles.len() {
            warn!(
                road = %self.id,
                lane,
                lanes = self.vehicles.len(),
                "vehicle assigned to out-of-range lane, clamping to 0"
            );
            0
        } else {
            lane
        };
        vehicle.push_road(self.id);
        insert_sorted(&mut self.vehicles[lane], vehicle);
        true
    }

    /// Register an outgoing connection for `lane`.
    pub fn add_lane_connection(&mut self, lane: usize, to: RoadId, weight: f64) {
        if lane >= self.connections.len() {
            error!(
                road = %self.id,
                lane,
                lanes = self.connections.len(),
                "cannot connect out-of-range lane"
            );
            return;
        }
        self.connections[lane].push(Connection { to, weight });
    }

    /// Spawn a fresh car at position 0 of `lane` if there is room.
    ///
    /// The car gets the supplied initial velocity and aggressivity; its
    /// desired velocity is the road's speed limit.
    pub fn spawn_vehicle(&mut self, lane: usize, velocity: f64, aggressivity: f64) -> bool {
        if lane >= self.vehicles.len() {
            trace!(road = %self.id, lane, "cannot spawn on out-of-range lane");
            return false;
        }
        if !self.lane_has_entry_room(lane) {
            trace!(road = %self.id, lane, "cannot spawn, no space at lane entry");
            return false;
        }

        let mut vehicle = Vehicle::car(0.0, velocity, self.max_speed);
        vehicle.set_aggressivity(aggressivity);
        trace!(road = %self.id, lane, vehicle = %vehicle.id(), velocity, "spawned vehicle");
        self.add_vehicle(vehicle, lane);
        true
    }

    /// Spawn into the least-loaded lane that has entry room.
    pub fn spawn_vehicle_any_lane(&mut self, velocity: f64, aggressivity: f64) -> Option<usize> {
        let lane = (0..self.vehicles.len())
            .filter(|&l| self.lane_has_entry_room(l))
            .min_by_key(|&l| self.vehicles[l].len())?;
        self.spawn_vehicle(lane, velocity, aggressivity)
            .then_some(lane)
    }

    fn lane_has_entry_room(&self, lane: usize) -> bool {
        match self.vehicles[lane].first() {
            None => true,
            Some(first) => first.position() >= DEFAULT_VEHICLE_LENGTH + first.min_gap(),
        }
    }

    // ── Per-road tick ─────────────────────────────────────────────────────

    /// Advance this road by `dt`: step each lane's light, update vehicles
    /// front to back, and resolve road and lane changes.
    ///
    /// Emitted transitions are appended to `transitions`; the return value
    /// is the number of vehicles that exited the network at this road's end
    /// (no outgoing connection, or a dangling destination id).
    ///
    /// Reads destination admissibility from `entries` only, so different
    /// roads may be updated concurrently.
    pub fn update(
        &mut self,
        dt: f64,
        entries: &EntryIndex,
        transitions: &mut Vec<RoadTransition>,
    ) -> u32 {
        let Road {
            id,
            length,
            vehicles,
            lights,
            connections,
            rng,
            ..
        } = self;
        let road_id = *id;
        let road_len = *length;
        let mut exited = 0u32;

        for lane_idx in 0..vehicles.len() {
            lights[lane_idx].update(dt);
            let green = lights[lane_idx].is_green();

            let mut idx = vehicles[lane_idx].len();
            while idx > 0 {
                idx -= 1;
                let is_front = idx + 1 == vehicles[lane_idx].len();

                // Leader for this vehicle: the already-updated vehicle ahead,
                // or the lane sentinel when it is frontmost.
                let (leader, leader_is_signal) = if is_front {
                    if green {
                        (Leader::NONE, false)
                    } else {
                        (Leader::signal(road_len), true)
                    }
                } else {
                    (vehicles[lane_idx][idx + 1].as_leader(), false)
                };

                vehicles[lane_idx][idx].update(dt, &leader);

                let action = {
                    let current = &vehicles[lane_idx][idx];
                    if is_front && current.position() >= road_len {
                        road_change(current, &connections[lane_idx], entries, rng, road_id, lane_idx)
                    } else if current.is_slowing_down() && !leader_is_signal {
                        lane_change(vehicles, lane_idx, idx, &leader)
                    } else {
                        Action::Keep
                    }
                };

                match action {
                    Action::Keep => {}
                    Action::Exit => {
                        vehicles[lane_idx].remove(idx);
                        exited += 1;
                    }
                    Action::Transition(to) => {
                        let vehicle = vehicles[lane_idx].remove(idx);
                        transitions.push(RoadTransition { vehicle, to, lane: 0 });
                    }
                    Action::LaneChange(target) => {
                        let vehicle = vehicles[lane_idx].remove(idx);
                        trace!(
                            road = %road_id,
                            vehicle = %vehicle.id(),
                            from = lane_idx,
                            to = target,
                            "lane change"
                        );
                        insert_sorted(&mut vehicles[target], vehicle);
                    }
                }
            }
        }
        exited
    }
}

/// Ordered insert keeping the lane sorted ascending by position.
fn insert_sorted(lane: &mut Vec<Vehicle>, vehicle: Vehicle) {
    let at = lane.partition_point(|v| v.position() < vehicle.position());
    lane.insert(at, vehicle);
}

/// Decide what happens to a frontmost vehicle that reached the road end.
fn road_change(
    vehicle: &Vehicle,
    connections: &[Connection],
    entries: &EntryIndex,
    rng: &mut SimRng,
    road: RoadId,
    lane: usize,
) -> Action {
    // No connections: this is how vehicles leave the network.
    if connections.is_empty() {
        trace!(road = %road, lane, vehicle = %vehicle.id(), "vehicle leaving simulation");
        return Action::Exit;
    }

    let dest = select_connection(connections, rng);

    let Some(&front_position) = entries.get(&dest) else {
        warn!(road = %road, dest = %dest, vehicle = %vehicle.id(), "destination road not in map, dropping vehicle");
        return Action::Exit;
    };

    // Lane-0 admissibility on the destination.  Multi-lane destination
    // selection is a known extension; entry is always lane 0 today.
    if front_position < vehicle.length() + vehicle.min_gap() {
        trace!(road = %road, dest = %dest, vehicle = %vehicle.id(), "destination full, vehicle waits");
        return Action::Keep;
    }

    trace!(road = %road, dest = %dest, vehicle = %vehicle.id(), "road transition");
    Action::Transition(dest)
}

/// Weighted random choice over a non-empty connection list.
///
/// Weights are normalized by their sum; a zero or negative sum falls back to
/// the first entry, floating-point roundoff to the last.
fn select_connection(connections: &[Connection], rng: &mut SimRng) -> RoadId {
    let sum: f64 = connections.iter().map(|c| c.weight).sum();
    if sum <= 0.0 {
        warn!("connection weights sum to zero, choosing first connection");
        return connections[0].to;
    }

    let draw = rng.unit();
    let mut cumulative = 0.0;
    for connection in connections {
        cumulative += connection.weight / sum;
        if draw <= cumulative {
            return connection.to;
        }
    }
    connections[connections.len() - 1].to
}

/// Try the MOBIL move for `vehicles[lane_idx][idx]`, preferring the left
/// neighbour lane.  Returns the chosen action (never removes anything).
fn lane_change(
    vehicles: &[Vec<Vehicle>],
    lane_idx: usize,
    idx: usize,
    current_leader: &Leader,
) -> Action {
    if vehicles.len() == 1 {
        return Action::Keep;
    }

    let current = &vehicles[lane_idx][idx];

    // Not worth the math when the leader is far ahead.
    if current_leader.position - current.position() > MAX_CHANGE_LANE_DIST {
        return Action::Keep;
    }

    let candidates = [
        (lane_idx + 1 < vehicles.len()).then(|| lane_idx + 1),
        lane_idx.checked_sub(1),
    ];

    for target in candidates.into_iter().flatten() {
        let lane = &vehicles[target];
        let split = lane.partition_point(|v| v.position() < current.position());

        let new_leader = lane.get(split).map_or(Leader::NONE, Vehicle::as_leader);
        let new_follower = (split > 0).then(|| &lane[split - 1]);

        if current.can_change_lane(current_leader, &new_leader, new_follower) {
            return Action::LaneChange(target);
        }
    }
    Action::Keep
}
