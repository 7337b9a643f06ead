//! Streaming snapshot of the live world.
//!
//! Captured under the simulation mutex and handed to the event-stream
//! collaborator, which filters it by viewport before serializing.  Vehicle
//! geographic positions are interpolated along the road segment from the
//! cartesian endpoints.

use atc_core::GeoPoint;

use crate::sim::CityMap;

/// One vehicle as seen by the stream.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct VehicleState {
    pub id: u64,
    pub road: u64,
    pub lane: usize,
    pub position: f64,
    pub velocity: f64,
    pub acceleration: f64,
    pub lon: f64,
    pub lat: f64,
}

/// One traffic light as seen by the stream.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct LightState {
    pub road: u64,
    pub lane: usize,
    /// 'G', 'Y', or 'R'.
    pub state: char,
    pub lon: f64,
    pub lat: f64,
}

/// Full world snapshot at one instant.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct SimulationSnapshot {
    pub step: u64,
    pub time: f64,
    pub vehicles: Vec<VehicleState>,
    pub lights: Vec<LightState>,
}

impl SimulationSnapshot {
    /// Copy out the current world state.
    pub fn capture(map: &CityMap, step: u64, time: f64) -> SimulationSnapshot {
        let mut vehicles = Vec::new();
        let mut lights = Vec::new();

        for (&road_id, road) in map {
            for (lane, lane_vehicles) in road.vehicles().iter().enumerate() {
                for vehicle in lane_vehicles {
                    let GeoPoint { lon, lat } = road.point_at(vehicle.position()).to_geo();
                    vehicles.push(VehicleState {
                        id: vehicle.id().raw(),
                        road: road_id.raw(),
                        lane,
                        position: vehicle.position(),
                        velocity: vehicle.velocity(),
                        acceleration: vehicle.acceleration(),
                        lon,
                        lat,
                    });
                }
            }
            for (lane, light) in road.lights().iter().enumerate() {
                let GeoPoint { lon, lat } = road.end_geo();
                lights.push(LightState {
                    road: road_id.raw(),
                    lane,
                    state: light.phase().code(),
                    lon,
                    lat,
                });
            }
        }

        SimulationSnapshot {
            step,
            time,
            vehicles,
            lights,
        }
    }
}
