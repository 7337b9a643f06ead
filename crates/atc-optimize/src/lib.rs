//! `atc-optimize` — genetic retuning of traffic-light timings.
//!
//! A [`Chromosome`] is one `(green, red)` timing pair per traffic light in
//! the network, laid out in canonical order (road id ascending, then lane
//! ascending); yellow is fixed at 3 s.  The [`GeneticAlgorithm`] evolves a
//! population against a caller-supplied fitness function — in practice a
//! [`FitnessEvaluator`] side-simulation over a network snapshot — and the
//! [`TimingValidator`] runs a differential A/B simulation before a winning
//! chromosome is allowed anywhere near the live engine.
//!
//! | Module        | Contents                                              |
//! |---------------|-------------------------------------------------------|
//! | [`chromosome`]| `SignalTiming`, `Chromosome`, `TimingBounds`, JSON    |
//! | [`ga`]        | `GaParams`, `GeneticAlgorithm`                        |
//! | [`evaluator`] | `FitnessEvaluator` — N-step snapshot simulations      |
//! | [`validator`] | `TimingValidator` — pass/fail against thresholds      |
//! | [`history`]   | CSV export of evolution history                       |

pub mod chromosome;
pub mod error;
pub mod evaluator;
pub mod ga;
pub mod history;
pub mod validator;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use chromosome::{Chromosome, FIXED_YELLOW, SignalTiming, TimingBounds};
pub use error::{OptimizeError, OptimizeResult};
pub use evaluator::FitnessEvaluator;
pub use ga::{GaParams, GeneticAlgorithm};
pub use history::{export_chromosome_csv, export_history_csv};
pub use validator::{TimingValidator, ValidationConfig, ValidationResult};
