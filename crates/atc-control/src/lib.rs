//! `atc-control` — closing the loop between optimization and the live engine.
//!
//! The [`ContinuousOptimizationController`] periodically runs a reactive or
//! predictive optimization cycle and, when a chromosome wins, installs
//! [`TimingTransition`]s that walk every light's timings to the new values
//! over a few minutes instead of slamming them in.  The
//! [`SimulatedTrafficFeed`] plays back learned patterns as an
//! expected-density feed, and the observer bridges wire the engine loop to
//! metrics, pattern storage, and travel-time tracking.
//!
//! | Module         | Contents                                             |
//! |----------------|------------------------------------------------------|
//! | [`transition`] | `TimingTransition`, `TransitionSet`                  |
//! | [`controller`] | `ControllerConfig`, `ContinuousOptimizationController` |
//! | [`feed`]       | `SimulatedTrafficFeed` and snapshot types            |
//! | [`observers`]  | `SimObserver` bridges for metrics/patterns/O-D       |

pub mod controller;
pub mod error;
pub mod feed;
pub mod observers;
pub mod transition;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use controller::{ContinuousOptimizationController, ControllerConfig};
pub use error::{ControlError, ControlResult};
pub use feed::{SimulatedTrafficFeed, TrafficFeedEntry, TrafficFeedSnapshot};
pub use observers::{MetricsObserver, PatternObserver, StreamObserver, TravelTimeObserver};
pub use transition::{TimingTransition, TransitionSet};
