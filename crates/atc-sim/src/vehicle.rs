//! Vehicles and the IDM / MOBIL driver models.
//!
//! # IDM
//!
//! Longitudinal acceleration toward a leader at net distance `s`:
//!
//!   s* = s0 + max(0, v·T + v·Δv / (2·√(a·b)))
//!   dv/dt = a · (1 − (v/v0)^δ − (s*/s)²)
//!
//! The interaction term is dropped on a free road — when the leader is more
//! than 100 m ahead, or "behind" the vehicle (net distance ≤ 0), which is how
//! the no-leader sentinel is encoded.
//!
//! # MOBIL
//!
//! A lane change is taken only when the geometric gaps exist, the would-be
//! new follower can still brake within `b_safe`, and the acceleration gained
//! outweighs the politeness-weighted loss imposed on that follower by more
//! than a fixed threshold.

use atc_core::{RoadId, VehicleId};

/// Acceleration exponent δ of the IDM.
const IDM_DELTA: i32 = 4;
/// Net distance beyond which the road ahead counts as free.
const FREE_ROAD_DISTANCE: f64 = 100.0;
/// MOBIL politeness factor.
const POLITENESS: f64 = 0.3;
/// MOBIL maximum safe deceleration imposed on the new follower.
const B_SAFE: f64 = 4.0;
/// MOBIL acceleration threshold — suppresses changes for marginal gains.
const ACCEL_THRESHOLD: f64 = 0.2;

/// Default length of a spawned car, meters.
pub const DEFAULT_VEHICLE_LENGTH: f64 = 5.0;

/// What kind of element occupies a position on a lane.
///
/// Traffic-light sentinels are never stored in a lane's vehicle vector; the
/// road materialises one as a [`Leader`] when a lane's light is not green.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VehicleKind {
    Car,
    TrafficLight,
    Obstacle,
}

/// The view a follower has of the element directly ahead of it.
///
/// Carries just the kinematic fields the IDM interaction term reads, plus
/// the current acceleration for the MOBIL incentive criterion.  A leader
/// with `length == 0.0` at position 0 encodes "no leader" (free road): its
/// net distance is negative, which switches the interaction term off.
#[derive(Copy, Clone, Debug)]
pub struct Leader {
    pub position: f64,
    pub length: f64,
    pub velocity: f64,
    pub acceleration: f64,
}

impl Leader {
    /// The free-road sentinel.
    pub const NONE: Leader = Leader {
        position: 0.0,
        length: 0.0,
        velocity: 0.0,
        acceleration: 0.0,
    };

    /// The traffic-light sentinel: a stationary zero-length element at the
    /// stop line.
    pub fn signal(stop_line: f64) -> Leader {
        Leader {
            position: stop_line,
            length: 0.0,
            velocity: 0.0,
            acceleration: 0.0,
        }
    }

    /// Whether this leader is an actual vehicle (MOBIL participant) rather
    /// than a sentinel.
    #[inline]
    pub fn is_present(&self) -> bool {
        self.length > 0.0
    }
}

/// A kinematic particle on one lane of one road.
#[derive(Clone, Debug)]
pub struct Vehicle {
    id: VehicleId,
    kind: VehicleKind,
    length: f64,
    position: f64,
    velocity: f64,
    acceleration: f64,
    /// Desired velocity v0 — normally the road's speed limit.
    desired_velocity: f64,
    /// Driver aggressivity in [0, 1]; 0.5 is a normal driver.
    aggressivity: f64,
    /// Safe time headway T, seconds.
    headway: f64,
    /// Maximum acceleration a, m/s².
    max_accel: f64,
    /// Comfortable deceleration b, m/s².
    comfort_decel: f64,
    /// Minimum standstill gap s0, meters.
    min_gap: f64,
    /// Velocity decreased during the last update.
    slowing_down: bool,
    /// Road ids traversed, in order.
    itinerary: Vec<RoadId>,
    /// Accumulated time in traffic, seconds.
    road_time: f64,
}

impl Vehicle {
    /// A car at `position` with the given initial velocity and desired
    /// velocity.
    pub fn car(position: f64, velocity: f64, desired_velocity: f64) -> Vehicle {
        Vehicle {
            id: VehicleId::next(),
            kind: VehicleKind::Car,
            length: DEFAULT_VEHICLE_LENGTH,
            position,
            velocity,
            acceleration: 0.0,
            desired_velocity,
            aggressivity: 0.5,
            headway: 1.0,
            max_accel: 1.5,
            comfort_decel: 3.0,
            min_gap: 1.0,
            slowing_down: false,
            itinerary: Vec::new(),
            road_time: 0.0,
        }
    }

    /// A stationary obstacle of the given length.
    pub fn obstacle(position: f64, length: f64) -> Vehicle {
        let mut v = Vehicle::car(position, 0.0, 0.0);
        v.kind = VehicleKind::Obstacle;
        v.length = length;
        v
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn id(&self) -> VehicleId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> VehicleKind {
        self.kind
    }

    #[inline]
    pub fn position(&self) -> f64 {
        self.position
    }

    #[inline]
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    #[inline]
    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    #[inline]
    pub fn min_gap(&self) -> f64 {
        self.min_gap
    }

    #[inline]
    pub fn is_slowing_down(&self) -> bool {
        self.slowing_down
    }

    #[inline]
    pub fn aggressivity(&self) -> f64 {
        self.aggressivity
    }

    pub fn set_aggressivity(&mut self, aggressivity: f64) {
        self.aggressivity = aggressivity.clamp(0.0, 1.0);
    }

    /// Reset position (used when a vehicle enters a new road).
    pub fn set_position(&mut self, position: f64) {
        self.position = position;
    }

    pub fn push_road(&mut self, road: RoadId) {
        self.itinerary.push(road);
    }

    /// The road this vehicle currently drives on, if it ever entered one.
    pub fn current_road(&self) -> Option<RoadId> {
        self.itinerary.last().copied()
    }

    pub fn itinerary(&self) -> &[RoadId] {
        &self.itinerary
    }

    /// Accumulated time in traffic, seconds.
    pub fn road_time(&self) -> f64 {
        self.road_time
    }

    /// This vehicle viewed as a leader by its follower.
    #[inline]
    pub fn as_leader(&self) -> Leader {
        Leader {
            position: self.position,
            length: self.length,
            velocity: self.velocity,
            acceleration: self.acceleration,
        }
    }

    // ── Driver models ─────────────────────────────────────────────────────

    /// IDM acceleration toward `leader`.
    ///
    /// Pure — reads `self` and `leader`, mutates nothing.  Split out of
    /// [`update`][Self::update] because the MOBIL criterion evaluates it for
    /// hypothetical leader/follower pairings.
    pub fn idm_acceleration(&self, leader: &Leader) -> f64 {
        let net_distance = leader.position - self.position - leader.length;
        let free_road = net_distance <= 0.0 || net_distance >= FREE_ROAD_DISTANCE;

        let delta_v = self.velocity - leader.velocity;
        let s_star = self.min_gap
            + (self.velocity * self.headway
                + self.velocity * delta_v / (2.0 * (self.max_accel * self.comfort_decel).sqrt()))
            .max(0.0);

        // A vehicle with no desired velocity holds position: treat it as
        // already at v0 rather than dividing by zero.
        let free_term = if self.desired_velocity > 0.0 {
            (self.velocity / self.desired_velocity).powi(IDM_DELTA)
        } else {
            1.0
        };

        let interaction = if free_road {
            0.0
        } else {
            (s_star / net_distance).powi(2)
        };

        self.max_accel * (1.0 - free_term - interaction)
    }

    /// Advance this vehicle by `dt` seconds against `leader`.
    ///
    /// No-op for traffic-light sentinels.  Velocity is floored at zero and
    /// the position never moves backward.
    pub fn update(&mut self, dt: f64, leader: &Leader) {
        if self.kind == VehicleKind::TrafficLight {
            return;
        }

        self.road_time += dt;
        self.acceleration = self.idm_acceleration(leader);

        let dx = self.velocity * dt + 0.5 * self.acceleration * dt * dt;
        self.position += dx.max(0.0);

        let previous = self.velocity;
        self.velocity = (self.velocity + self.acceleration * dt).max(0.0);
        self.slowing_down = self.velocity < previous;
    }

    /// MOBIL lane-change criterion.
    ///
    /// `current_leader` and `new_leader` may be the free-road sentinel
    /// ([`Leader::NONE`]); an absent new follower is `None`.  Pure.
    pub fn can_change_lane(
        &self,
        current_leader: &Leader,
        new_leader: &Leader,
        new_follower: Option<&Vehicle>,
    ) -> bool {
        // Geometric gap on the target lane.
        if new_leader.is_present()
            && self.position >= new_leader.position - new_leader.length - self.min_gap
        {
            return false;
        }
        if let Some(follower) = new_follower {
            if self.position - self.length - self.min_gap <= follower.position {
                return false;
            }
        }

        // Safety criterion: the new follower must not be forced to brake
        // harder than b_safe.
        if let Some(follower) = new_follower {
            if follower.idm_acceleration(&self.as_leader()) <= -B_SAFE {
                return false;
            }
        }

        // Incentive criterion.
        let acc_new = if new_leader.is_present() {
            self.idm_acceleration(new_leader)
        } else {
            self.max_accel
        };
        let acc_current = if current_leader.is_present() {
            self.idm_acceleration(current_leader)
        } else {
            self.max_accel
        };
        let (follower_now, follower_after) = match new_follower {
            Some(f) => (f.acceleration, f.idm_acceleration(&self.as_leader())),
            None => (0.0, 0.0),
        };

        (acc_new - acc_current) > POLITENESS * (follower_now - follower_after) + ACCEL_THRESHOLD
    }
}
