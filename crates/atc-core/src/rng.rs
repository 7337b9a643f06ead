//! Deterministic seeded RNG wrapper.
//!
//! # Determinism strategy
//!
//! Every randomized component (road connection choice, traffic-light phase
//! offsets, the genetic algorithm, the simulated feed) owns its own
//! `SimRng`, derived from one master seed:
//!
//!   seed = master_seed XOR (entity_id * MIXING_CONSTANT)
//!
//! The mixing constant is the 64-bit fractional part of the golden ratio,
//! which spreads consecutive entity ids uniformly across the seed space.
//! This means:
//!
//! - Roads stepped on different Rayon workers never share RNG state, so the
//!   parallel phase needs no synchronisation and no ordering dependency.
//! - Cloning a road network (for GA side-simulations) clones the RNG state
//!   with it, so every evaluation of the same snapshot replays identically.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// 64-bit fractional golden-ratio constant for seed mixing.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// A seeded `SmallRng` with deterministic child derivation.
#[derive(Clone, Debug)]
pub struct SimRng(SmallRng);

impl SimRng {
    pub fn new(seed: u64) -> Self {
        SimRng(SmallRng::seed_from_u64(seed))
    }

    /// Derive an independent `SimRng` for the entity with the given id.
    ///
    /// Pure function of `(seed, id)` — deriving for the same id twice yields
    /// the same stream, regardless of derivation order.
    pub fn derive(seed: u64, id: u64) -> Self {
        SimRng(SmallRng::seed_from_u64(
            seed ^ id.wrapping_mul(MIXING_CONSTANT),
        ))
    }

    /// Expose the inner `SmallRng` for use with `rand_distr` distribution
    /// types (`dist.sample(rng.inner())`).
    #[inline]
    pub fn inner(&mut self) -> &mut SmallRng {
        &mut self.0
    }

    /// Generate a value uniformly in `range`.
    #[inline]
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: rand::distributions::uniform::SampleUniform,
        R: rand::distributions::uniform::SampleRange<T>,
    {
        self.0.gen_range(range)
    }

    /// `true` with probability `p` (clamped to [0, 1]).
    #[inline]
    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.0.gen_bool(p.clamp(0.0, 1.0))
    }

    /// A uniform draw in `[0, 1)` — the workhorse of weighted choices.
    #[inline]
    pub fn unit(&mut self) -> f64 {
        self.0.gen_range(0.0..1.0)
    }
}
