//! The genetic algorithm engine.
//!
//! Minimization: lower fitness is better.  One `evolve` call runs the
//! configured number of generations of evaluate → sort → elitism →
//! tournament selection → uniform crossover → Gaussian mutation, and
//! returns the best chromosome seen across all generations.
//!
//! Given a fixed seed and a deterministic fitness function, evolution is
//! reproducible — population evaluation may fan out over Rayon, but the
//! selection RNG never leaves the main thread.

use tracing::{debug, info};

use atc_core::SimRng;

use crate::chromosome::{Chromosome, TimingBounds};
use crate::error::{OptimizeError, OptimizeResult};

/// Tunables of one evolution run.
#[derive(Clone, Debug)]
pub struct GaParams {
    pub population_size: usize,
    pub generations: usize,
    /// Per-gene mutation probability.
    pub mutation_rate: f64,
    /// Std-dev of the Gaussian timing perturbation, seconds.
    pub mutation_std_dev: f64,
    pub crossover_rate: f64,
    pub tournament_size: usize,
    /// Fraction of the population copied unchanged; at least one survives.
    pub elitism_rate: f64,
    pub bounds: TimingBounds,
    pub seed: u64,
}

impl Default for GaParams {
    fn default() -> Self {
        GaParams {
            population_size: 50,
            generations: 100,
            mutation_rate: 0.1,
            mutation_std_dev: 5.0,
            crossover_rate: 0.8,
            tournament_size: 3,
            elitism_rate: 0.1,
            bounds: TimingBounds::default(),
            seed: 42,
        }
    }
}

impl GaParams {
    /// Reject out-of-range parameters before they can produce a degenerate
    /// run.
    pub fn validate(&self) -> OptimizeResult<()> {
        let fail = |msg: &str| Err(OptimizeError::InvalidParams(msg.to_owned()));
        if self.population_size < 10 {
            return fail("population_size must be at least 10");
        }
        if self.generations == 0 {
            return fail("generations must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return fail("mutation_rate must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return fail("crossover_rate must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.elitism_rate) {
            return fail("elitism_rate must be in [0, 1]");
        }
        if self.tournament_size < 2 {
            return fail("tournament_size must be at least 2");
        }
        if self.mutation_std_dev <= 0.0 {
            return fail("mutation_std_dev must be positive");
        }
        if self.bounds.min_green > self.bounds.max_green
            || self.bounds.min_red > self.bounds.max_red
        {
            return fail("timing bounds are inverted");
        }
        Ok(())
    }
}

/// GA engine over a caller-supplied fitness function.
pub struct GeneticAlgorithm<F>
where
    F: Fn(&Chromosome) -> f64 + Sync,
{
    params: GaParams,
    population: Vec<Chromosome>,
    rng: SimRng,
    noise: rand_distr::Normal<f64>,
    fitness_fn: F,
    best: Option<Chromosome>,
    /// Best fitness per generation; non-increasing thanks to elitism.
    history: Vec<f64>,
}

impl<F> GeneticAlgorithm<F>
where
    F: Fn(&Chromosome) -> f64 + Sync,
{
    pub fn new(params: GaParams, fitness_fn: F) -> OptimizeResult<Self> {
        params.validate()?;
        let noise = rand_distr::Normal::new(0.0, params.mutation_std_dev)
            .map_err(|e| OptimizeError::InvalidParams(e.to_string()))?;
        let rng = SimRng::new(params.seed);
        Ok(GeneticAlgorithm {
            params,
            population: Vec::new(),
            rng,
            noise,
            fitness_fn,
            best: None,
            history: Vec::new(),
        })
    }

    /// Fill the population with uniform random chromosomes of `gene_count`
    /// genes.
    pub fn initialize_population(&mut self, gene_count: usize) {
        self.population = (0..self.params.population_size)
            .map(|_| {
                let mut chromosome = Chromosome::new(gene_count);
                chromosome.randomize(&self.params.bounds, &mut self.rng);
                chromosome
            })
            .collect();
        self.best = None;
        self.history.clear();
    }

    /// Run the configured number of generations and return the global best.
    pub fn evolve(&mut self) -> Chromosome {
        info!(
            population = self.params.population_size,
            generations = self.params.generations,
            genes = self.population.first().map_or(0, Chromosome::len),
            "starting evolution"
        );

        for generation in 0..self.params.generations {
            self.evaluate_population();
            self.population
                .sort_by(|a, b| a.fitness.total_cmp(&b.fitness));

            let generation_best = &self.population[0];
            self.history.push(generation_best.fitness);
            if self
                .best
                .as_ref()
                .is_none_or(|best| generation_best.fitness < best.fitness)
            {
                self.best = Some(generation_best.clone());
            }
            debug!(
                generation,
                best = generation_best.fitness,
                worst = self.population.last().map_or(f64::NAN, |c| c.fitness),
                "generation evaluated"
            );

            self.reproduce();
        }

        let best = self
            .best
            .clone()
            .unwrap_or_else(|| self.population[0].clone());
        info!(fitness = best.fitness, "evolution finished");
        best
    }

    pub fn fitness_history(&self) -> &[f64] {
        &self.history
    }

    pub fn best(&self) -> Option<&Chromosome> {
        self.best.as_ref()
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn evaluate_population(&mut self) {
        let fitness_fn = &self.fitness_fn;

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            self.population.par_iter_mut().for_each(|chromosome| {
                chromosome.fitness = guard(fitness_fn(chromosome));
            });
        }

        #[cfg(not(feature = "parallel"))]
        for chromosome in &mut self.population {
            chromosome.fitness = guard(fitness_fn(chromosome));
        }
    }

    /// Build the next generation: elites unchanged, the rest from
    /// tournament-selected parents via uniform crossover and mutation.
    fn reproduce(&mut self) {
        let elite_count = ((self.params.population_size as f64 * self.params.elitism_rate) as usize)
            .clamp(1, self.params.population_size);

        let mut next: Vec<Chromosome> = self.population[..elite_count].to_vec();

        while next.len() < self.params.population_size {
            let parent1 = self.tournament();
            let parent2 = self.tournament();

            let mut child = if self.rng.gen_bool(self.params.crossover_rate) {
                self.uniform_crossover(parent1, parent2)
            } else {
                self.population[parent1].clone()
            };

            child.mutate(
                self.params.mutation_rate,
                &self.noise,
                &self.params.bounds,
                &mut self.rng,
            );
            next.push(child);
        }

        self.population = next;
    }

    /// Index of the best among `tournament_size` random members.
    fn tournament(&mut self) -> usize {
        let mut winner = self.rng.gen_range(0..self.population.len());
        for _ in 1..self.params.tournament_size {
            let challenger = self.rng.gen_range(0..self.population.len());
            if self.population[challenger].fitness < self.population[winner].fitness {
                winner = challenger;
            }
        }
        winner
    }

    /// Per gene, take parent 1's or parent 2's with equal probability.
    fn uniform_crossover(&mut self, parent1: usize, parent2: usize) -> Chromosome {
        let genes = (0..self.population[parent1].len())
            .map(|i| {
                if self.rng.gen_bool(0.5) {
                    self.population[parent1].genes[i]
                } else {
                    self.population[parent2].genes[i]
                }
            })
            .collect();
        Chromosome {
            genes,
            fitness: 0.0,
        }
    }
}

/// A fitness function that panicked upstream or produced NaN must never win
/// a tournament.
#[inline]
fn guard(fitness: f64) -> f64 {
    if fitness.is_finite() { fitness } else { f64::MAX }
}
