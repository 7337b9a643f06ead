//! The demo's four-way intersection.
//!
//! Four approach roads (north, south, east, west) feeding each other with
//! symmetric connection weights and a handful of vehicles already on the
//! move.  Coordinates put the junction at (500, 500) in cartesian meters.

use atc_core::CartPoint;
use atc_sim::sim::{CityMap, Simulation};
use atc_sim::{Road, Vehicle};

/// Build the intersection; `seed` drives light phases and connection choice.
pub fn build_intersection(seed: u64) -> CityMap {
    let mut north = Road::new(300.0, 2, 15.0, seed);
    let mut south = Road::new(300.0, 2, 15.0, seed);
    let mut east = Road::new(300.0, 1, 15.0, seed);
    let mut west = Road::new(300.0, 1, 15.0, seed);

    north.set_cartesian(CartPoint::new(500.0, 0.0), CartPoint::new(500.0, 300.0));
    south.set_cartesian(CartPoint::new(500.0, 1000.0), CartPoint::new(500.0, 700.0));
    east.set_cartesian(CartPoint::new(1000.0, 500.0), CartPoint::new(700.0, 500.0));
    west.set_cartesian(CartPoint::new(0.0, 500.0), CartPoint::new(300.0, 500.0));

    let (n, s, e, w) = (north.id(), south.id(), east.id(), west.id());

    // Mostly straight through, with turn shares on the inner lanes.
    north.add_lane_connection(0, e, 0.7);
    north.add_lane_connection(0, w, 0.3);
    north.add_lane_connection(1, e, 0.5);
    north.add_lane_connection(1, s, 0.5);
    south.add_lane_connection(0, w, 0.6);
    south.add_lane_connection(0, e, 0.4);
    south.add_lane_connection(1, w, 0.5);
    south.add_lane_connection(1, n, 0.5);
    east.add_lane_connection(0, w, 0.7);
    east.add_lane_connection(0, n, 0.3);
    west.add_lane_connection(0, e, 0.6);
    west.add_lane_connection(0, s, 0.4);

    north.add_vehicle(Vehicle::car(50.0, 10.0, 15.0), 0);
    north.add_vehicle(Vehicle::car(100.0, 12.0, 15.0), 0);
    north.add_vehicle(Vehicle::car(150.0, 8.0, 15.0), 1);
    south.add_vehicle(Vehicle::car(50.0, 11.0, 15.0), 0);
    south.add_vehicle(Vehicle::car(120.0, 9.0, 15.0), 1);
    east.add_vehicle(Vehicle::car(80.0, 10.0, 15.0), 0);
    east.add_vehicle(Vehicle::car(180.0, 11.0, 15.0), 0);
    west.add_vehicle(Vehicle::car(60.0, 12.0, 15.0), 0);
    west.add_vehicle(Vehicle::car(140.0, 9.0, 15.0), 0);

    let mut sim = Simulation::new();
    for road in [north, south, east, west] {
        sim.add_road(road);
    }
    sim.map
}
