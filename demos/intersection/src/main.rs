//! intersection — four-way intersection optimization demo.
//!
//! Builds a symmetric four-approach intersection, measures the baseline
//! fitness under the default light timings, evolves new timings with the
//! genetic algorithm, and reports the improvement.  Evolution history and
//! the winning configuration land in CSV files next to the binary.
//!
//!   cargo run --release -p intersection -- [--pop N] [--gen N] [--steps N]

mod network;

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use atc_optimize::{
    FitnessEvaluator, GaParams, GeneticAlgorithm, TimingBounds, export_chromosome_csv,
    export_history_csv,
};
use atc_sim::sim::light_count;

use network::build_intersection;

// ── Defaults ──────────────────────────────────────────────────────────────────

const DEFAULT_POPULATION: usize = 30;
const DEFAULT_GENERATIONS: usize = 50;
const DEFAULT_STEPS: u32 = 1_000;
const DT: f64 = 0.1;
const SEED: u64 = 42;

struct Options {
    population: usize,
    generations: usize,
    steps: u32,
}

fn parse_args() -> Result<Options> {
    let mut options = Options {
        population: DEFAULT_POPULATION,
        generations: DEFAULT_GENERATIONS,
        steps: DEFAULT_STEPS,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .with_context(|| format!("{name} requires a value"))
        };
        match arg.as_str() {
            "--pop" => options.population = value("--pop")?.parse()?,
            "--gen" => options.generations = value("--gen")?.parse()?,
            "--steps" => options.steps = value("--steps")?.parse()?,
            "--help" => {
                println!("Usage: intersection [--pop N] [--gen N] [--steps N]");
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(options)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let options = parse_args()?;

    println!("atc — genetic traffic-light optimizer demo");
    println!(
        "  population={}  generations={}  steps={}  dt={DT}",
        options.population, options.generations, options.steps
    );

    // ── Build the network ─────────────────────────────────────────────────
    let network = build_intersection(SEED);
    let lights = light_count(&network);
    println!("  roads={}  traffic lights={lights}", network.len());

    // ── Baseline with the default timings ─────────────────────────────────
    let evaluator = FitnessEvaluator::new(options.steps, DT);
    let baseline = evaluator.baseline(&network);
    println!("baseline fitness: {baseline:.3}");

    // ── Evolve ────────────────────────────────────────────────────────────
    let params = GaParams {
        population_size: options.population,
        generations: options.generations,
        mutation_rate: 0.15,
        mutation_std_dev: 5.0,
        crossover_rate: 0.8,
        tournament_size: 3,
        elitism_rate: 0.1,
        bounds: TimingBounds {
            min_green: 10.0,
            max_green: 60.0,
            min_red: 10.0,
            max_red: 60.0,
        },
        seed: SEED,
    };

    let fitness_network = network.clone();
    let mut ga = GeneticAlgorithm::new(params, move |chromosome| {
        evaluator.evaluate(chromosome, &fitness_network)
    })?;
    ga.initialize_population(lights);

    let begun = Instant::now();
    let best = ga.evolve();
    let elapsed = begun.elapsed();

    // ── Report ────────────────────────────────────────────────────────────
    let improvement = (baseline - best.fitness) / baseline * 100.0;
    println!("optimized fitness: {:.3}  ({elapsed:.1?})", best.fitness);
    println!("improvement: {improvement:.1}%");
    for (i, gene) in best.genes.iter().enumerate() {
        println!("  light {i}: green={:.1}s red={:.1}s", gene.green, gene.red);
    }

    export_history_csv(ga.fitness_history(), Path::new("evolution_history.csv"))?;
    export_chromosome_csv(&best, Path::new("best_solution.csv"))?;
    println!("wrote evolution_history.csv and best_solution.csv");

    Ok(())
}
