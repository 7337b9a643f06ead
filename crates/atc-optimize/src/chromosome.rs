//! Chromosomes — flat timing vectors over the network's traffic lights.
//!
//! # Gene order
//!
//! Genes pair with lights in canonical order: roads ascending by id, lanes
//! ascending within a road.  The same order is used when a chromosome is
//! built, applied, persisted, and re-applied — a persisted run can only be
//! replayed because every consumer agrees on it.  `CityMap` is a `BTreeMap`,
//! so plain iteration already yields this order.

use atc_core::SimRng;
use atc_sim::sim::CityMap;

use crate::error::OptimizeResult;

/// Yellow is not evolved; it stays at 3 s for safety.
pub const FIXED_YELLOW: f64 = 3.0;

/// Timing pair for one traffic light.  Field names are the canonical
/// persisted form (`{"greenTime": …, "redTime": …}`).
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SignalTiming {
    #[serde(rename = "greenTime")]
    pub green: f64,
    #[serde(rename = "redTime")]
    pub red: f64,
}

impl Default for SignalTiming {
    fn default() -> Self {
        SignalTiming {
            green: 30.0,
            red: 30.0,
        }
    }
}

/// Inclusive per-gene bounds enforced after randomization and mutation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimingBounds {
    pub min_green: f64,
    pub max_green: f64,
    pub min_red: f64,
    pub max_red: f64,
}

impl Default for TimingBounds {
    fn default() -> Self {
        TimingBounds {
            min_green: 10.0,
            max_green: 90.0,
            min_red: 10.0,
            max_red: 90.0,
        }
    }
}

/// A complete light configuration for one network, plus its fitness
/// (lower is better).
#[derive(Clone, Debug, PartialEq)]
pub struct Chromosome {
    pub genes: Vec<SignalTiming>,
    pub fitness: f64,
}

impl Chromosome {
    /// `light_count` default genes with zero fitness.
    pub fn new(light_count: usize) -> Chromosome {
        Chromosome {
            genes: vec![SignalTiming::default(); light_count],
            fitness: 0.0,
        }
    }

    /// A chromosome mirroring the timings currently installed in `map` — the
    /// baseline the validator compares against.
    pub fn from_map(map: &CityMap) -> Chromosome {
        let genes = map
            .values()
            .flat_map(|road| {
                road.lights().iter().map(|light| SignalTiming {
                    green: light.green_time(),
                    red: light.red_time(),
                })
            })
            .collect();
        Chromosome {
            genes,
            fitness: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Replace every gene with an independent uniform draw within bounds.
    pub fn randomize(&mut self, bounds: &TimingBounds, rng: &mut SimRng) {
        for gene in &mut self.genes {
            gene.green = rng.gen_range(bounds.min_green..=bounds.max_green);
            gene.red = rng.gen_range(bounds.min_red..=bounds.max_red);
        }
    }

    /// Per-gene Gaussian mutation: with probability `rate`, perturb both the
    /// green and red time, then clamp back into bounds.
    pub fn mutate(
        &mut self,
        rate: f64,
        noise: &rand_distr::Normal<f64>,
        bounds: &TimingBounds,
        rng: &mut SimRng,
    ) {
        use rand_distr::Distribution;
        for gene in &mut self.genes {
            if rng.gen_bool(rate) {
                gene.green += noise.sample(rng.inner());
                gene.red += noise.sample(rng.inner());
            }
        }
        self.clamp(bounds);
    }

    /// Clamp every gene into bounds.
    pub fn clamp(&mut self, bounds: &TimingBounds) {
        for gene in &mut self.genes {
            gene.green = gene.green.clamp(bounds.min_green, bounds.max_green);
            gene.red = gene.red.clamp(bounds.min_red, bounds.max_red);
        }
    }

    /// Install this chromosome's timings into `map` in canonical order,
    /// with yellow fixed at [`FIXED_YELLOW`].
    ///
    /// Extra genes are ignored; a short chromosome leaves trailing lights
    /// untouched.
    pub fn apply_to_map(&self, map: &mut CityMap) {
        let mut genes = self.genes.iter();
        'roads: for road in map.values_mut() {
            for light in road.lights_mut() {
                let Some(gene) = genes.next() else {
                    break 'roads;
                };
                light.set_timings(gene.green, FIXED_YELLOW, gene.red);
            }
        }
    }

    // ── Canonical serialized form ─────────────────────────────────────────

    /// The persisted form: a JSON array of `{"greenTime", "redTime"}`
    /// objects in gene order.
    pub fn to_json(&self) -> OptimizeResult<String> {
        Ok(serde_json::to_string(&self.genes)?)
    }

    /// Parse the persisted form back into a chromosome.
    pub fn from_json(json: &str, fitness: f64) -> OptimizeResult<Chromosome> {
        let genes: Vec<SignalTiming> = serde_json::from_str(json)?;
        Ok(Chromosome { genes, fitness })
    }
}
