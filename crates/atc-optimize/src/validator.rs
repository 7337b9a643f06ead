//! Differential validation of candidate timings.
//!
//! Two independent side-simulations on identical copies of the network:
//! the baseline keeps the installed timings, the candidate gets the
//! chromosome.  The improvement percentage decides pass/fail against the
//! configured thresholds — a small regression is tolerated, a large one is
//! rejected before the chromosome can touch the live engine.

use tracing::info;

use atc_core::clock::now_unix;
use atc_sim::sim::CityMap;

use crate::chromosome::Chromosome;
use crate::evaluator::FitnessEvaluator;

/// Validation thresholds and side-simulation length.
#[derive(Copy, Clone, Debug)]
pub struct ValidationConfig {
    pub simulation_steps: u32,
    pub dt: f64,
    /// Minimum improvement (%) for a "significant improvement" pass.
    pub improvement_threshold: f64,
    /// Maximum tolerated regression (%) before rejection.
    pub regression_threshold: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            simulation_steps: 500,
            dt: 0.1,
            improvement_threshold: 5.0,
            regression_threshold: 10.0,
        }
    }
}

/// Outcome of one validation run.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub baseline_fitness: f64,
    pub optimized_fitness: f64,
    /// `(baseline − optimized) / baseline · 100`; positive is better.
    pub improvement_percent: f64,
    pub reason: String,
    pub timestamp: i64,
}

/// Runs baseline-vs-candidate comparisons.
#[derive(Copy, Clone, Debug, Default)]
pub struct TimingValidator {
    config: ValidationConfig,
}

impl TimingValidator {
    pub fn new(config: ValidationConfig) -> TimingValidator {
        TimingValidator { config }
    }

    pub fn config(&self) -> ValidationConfig {
        self.config
    }

    pub fn set_config(&mut self, config: ValidationConfig) {
        self.config = config;
    }

    /// Compare `chromosome` against the timings installed in `network`.
    pub fn validate(&self, network: &CityMap, chromosome: &Chromosome) -> ValidationResult {
        let evaluator = FitnessEvaluator {
            steps: self.config.simulation_steps,
            dt: self.config.dt,
            sample_interval: 10,
        };

        let baseline_fitness = evaluator.baseline(network);
        let optimized_fitness = evaluator.evaluate(chromosome, network);

        let improvement_percent = if baseline_fitness > 0.0 {
            (baseline_fitness - optimized_fitness) / baseline_fitness * 100.0
        } else if optimized_fitness < baseline_fitness {
            100.0
        } else {
            -100.0
        };

        let (passed, reason) = decide(improvement_percent, &self.config);

        info!(
            passed,
            baseline = baseline_fitness,
            optimized = optimized_fitness,
            improvement = improvement_percent,
            "timing validation"
        );

        ValidationResult {
            passed,
            baseline_fitness,
            optimized_fitness,
            improvement_percent,
            reason,
            timestamp: now_unix(),
        }
    }
}

/// The four-outcome decision table over the improvement percentage.
pub(crate) fn decide(improvement_percent: f64, config: &ValidationConfig) -> (bool, String) {
    if improvement_percent >= config.improvement_threshold {
        (
            true,
            format!(
                "significant improvement: {improvement_percent:.2}% (threshold {:.2}%)",
                config.improvement_threshold
            ),
        )
    } else if improvement_percent >= 0.0 {
        (
            true,
            format!("minor improvement, no regression: {improvement_percent:.2}%"),
        )
    } else if improvement_percent.abs() <= config.regression_threshold {
        (
            true,
            format!(
                "minor regression within tolerance: {improvement_percent:.2}% (threshold -{:.2}%)",
                config.regression_threshold
            ),
        )
    } else {
        (
            false,
            format!(
                "significant regression: {improvement_percent:.2}% (threshold -{:.2}%)",
                config.regression_threshold
            ),
        )
    }
}
