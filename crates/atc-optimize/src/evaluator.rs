//! Side-simulation fitness evaluation.
//!
//! Every call clones the supplied network snapshot, applies the chromosome
//! (or leaves the installed timings for a baseline), runs `steps` ticks with
//! a local metrics collector, and reduces to the fitness scalar.  Calls are
//! fully independent, so the GA is free to evaluate chromosomes on worker
//! threads.

use atc_metrics::MetricsCollector;
use atc_sim::Simulation;
use atc_sim::sim::CityMap;

use crate::chromosome::Chromosome;

/// Snapshot-simulation parameters.
#[derive(Copy, Clone, Debug)]
pub struct FitnessEvaluator {
    /// Ticks per evaluation.
    pub steps: u32,
    /// Seconds per tick.
    pub dt: f64,
    /// Metrics sampling stride, in ticks.
    pub sample_interval: u32,
}

impl Default for FitnessEvaluator {
    fn default() -> Self {
        FitnessEvaluator {
            steps: 1_000,
            dt: 0.1,
            sample_interval: 10,
        }
    }
}

impl FitnessEvaluator {
    pub fn new(steps: u32, dt: f64) -> FitnessEvaluator {
        FitnessEvaluator {
            steps,
            dt,
            sample_interval: 10,
        }
    }

    /// Fitness of `chromosome` applied to a fresh copy of `network`.
    pub fn evaluate(&self, chromosome: &Chromosome, network: &CityMap) -> f64 {
        let mut map = network.clone();
        chromosome.apply_to_map(&mut map);
        self.run(map)
    }

    /// Fitness of `network` exactly as configured (the baseline).
    pub fn baseline(&self, network: &CityMap) -> f64 {
        self.run(network.clone())
    }

    fn run(&self, map: CityMap) -> f64 {
        let mut sim = Simulation::with_map(map);
        let mut collector = MetricsCollector::new();
        let sample_every = self.sample_interval.max(1);

        for step in 0..self.steps {
            let report = sim.step(self.dt);
            collector.record_exits(report.vehicles_exited);
            if step % sample_every == 0 {
                collector.collect(&sim.map);
            }
        }

        collector.finalized().fitness()
    }
}
