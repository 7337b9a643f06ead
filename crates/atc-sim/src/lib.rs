//! `atc-sim` — the microscopic traffic simulation core.
//!
//! Vehicles follow the Intelligent Driver Model (IDM) for longitudinal
//! dynamics and the MOBIL criterion for lane changes.  Roads are one-way
//! segments bounded by per-lane traffic lights; a city is a map of roads
//! wired together by weighted lane connections.  The [`Simulation`] advances
//! the whole network with a two-phase tick: a data-parallel per-road update
//! followed by a serial application of road-to-road transitions.
//!
//! | Module       | Contents                                                |
//! |--------------|---------------------------------------------------------|
//! | [`vehicle`]  | `Vehicle`, `Leader`, IDM + MOBIL math                   |
//! | [`light`]    | `TrafficLight` — G→Y→R cyclic state machine             |
//! | [`road`]     | `Road` — lanes, lights, connections, per-road tick      |
//! | [`sim`]      | `CityMap`, `Simulation`, the two-phase step             |
//! | [`spawn`]    | `SpawnScheduler` — vehicles/minute flow rates           |
//! | [`runner`]   | `SimulationRunner` — the live engine thread             |
//! | [`observer`] | `SimObserver` hook trait                                |
//! | [`snapshot`] | Streaming snapshot types with projected geo positions   |

pub mod error;
pub mod light;
pub mod observer;
pub mod road;
pub mod runner;
pub mod sim;
pub mod snapshot;
pub mod spawn;
pub mod vehicle;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{SimError, SimResult};
pub use light::{LightPhase, TrafficLight};
pub use observer::{NoopObserver, SimObserver};
pub use road::{Connection, EntryIndex, Road, RoadTransition, entry_index};
pub use runner::{RunnerConfig, SharedSimulation, SimulationRunner};
pub use sim::{CityMap, LightSetting, Simulation, TickReport};
pub use snapshot::{LightState, SimulationSnapshot, VehicleState};
pub use spawn::{FlowRate, SpawnScheduler};
pub use vehicle::{Leader, Vehicle, VehicleKind};
