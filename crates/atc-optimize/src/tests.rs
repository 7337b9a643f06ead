//! Unit tests for atc-optimize.

use atc_core::{CartPoint, SimRng};
use atc_sim::sim::{CityMap, Simulation};
use atc_sim::{Road, Vehicle};

use crate::chromosome::{Chromosome, SignalTiming, TimingBounds};
use crate::evaluator::FitnessEvaluator;
use crate::ga::{GaParams, GeneticAlgorithm};
use crate::validator::{TimingValidator, ValidationConfig, decide};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Four-way intersection: four approach roads feeding each other with
/// symmetric weights and some standing traffic.
fn intersection() -> CityMap {
    let mut north = Road::new(300.0, 2, 15.0, 7);
    let mut south = Road::new(300.0, 2, 15.0, 7);
    let mut east = Road::new(300.0, 1, 15.0, 7);
    let mut west = Road::new(300.0, 1, 15.0, 7);

    north.set_cartesian(CartPoint::new(500.0, 0.0), CartPoint::new(500.0, 300.0));
    south.set_cartesian(CartPoint::new(500.0, 1000.0), CartPoint::new(500.0, 700.0));
    east.set_cartesian(CartPoint::new(1000.0, 500.0), CartPoint::new(700.0, 500.0));
    west.set_cartesian(CartPoint::new(0.0, 500.0), CartPoint::new(300.0, 500.0));

    let (n, s, e, w) = (north.id(), south.id(), east.id(), west.id());

    north.add_lane_connection(0, e, 0.7);
    north.add_lane_connection(0, w, 0.3);
    north.add_lane_connection(1, e, 0.5);
    north.add_lane_connection(1, s, 0.5);
    south.add_lane_connection(0, w, 0.6);
    south.add_lane_connection(0, e, 0.4);
    south.add_lane_connection(1, w, 0.5);
    south.add_lane_connection(1, n, 0.5);
    east.add_lane_connection(0, w, 0.7);
    east.add_lane_connection(0, n, 0.3);
    west.add_lane_connection(0, e, 0.6);
    west.add_lane_connection(0, s, 0.4);

    north.add_vehicle(Vehicle::car(50.0, 10.0, 15.0), 0);
    north.add_vehicle(Vehicle::car(100.0, 12.0, 15.0), 0);
    north.add_vehicle(Vehicle::car(150.0, 8.0, 15.0), 1);
    south.add_vehicle(Vehicle::car(50.0, 11.0, 15.0), 0);
    south.add_vehicle(Vehicle::car(120.0, 9.0, 15.0), 1);
    east.add_vehicle(Vehicle::car(80.0, 10.0, 15.0), 0);
    east.add_vehicle(Vehicle::car(180.0, 11.0, 15.0), 0);
    west.add_vehicle(Vehicle::car(60.0, 12.0, 15.0), 0);
    west.add_vehicle(Vehicle::car(140.0, 9.0, 15.0), 0);

    let mut sim = Simulation::new();
    for road in [north, south, east, west] {
        sim.add_road(road);
    }
    sim.map
}

fn quick_params(seed: u64) -> GaParams {
    GaParams {
        population_size: 12,
        generations: 6,
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
        seed,
    }
}

// ── Chromosome ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod chromosome {
    use super::*;

    #[test]
    fn json_round_trip_preserves_genes() {
        let mut c = Chromosome::new(4);
        c.randomize(&TimingBounds::default(), &mut SimRng::new(5));
        c.fitness = 12.5;

        let json = c.to_json().unwrap();
        let back = Chromosome::from_json(&json, c.fitness).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn json_uses_canonical_field_names() {
        let c = Chromosome {
            genes: vec![SignalTiming {
                green: 25.0,
                red: 35.0,
            }],
            fitness: 0.0,
        };
        let json = c.to_json().unwrap();
        assert_eq!(json, r#"[{"greenTime":25.0,"redTime":35.0}]"#);
    }

    #[test]
    fn randomize_stays_within_bounds() {
        let bounds = TimingBounds {
            min_green: 12.0,
            max_green: 20.0,
            min_red: 30.0,
            max_red: 40.0,
        };
        let mut rng = SimRng::new(9);
        let mut c = Chromosome::new(64);
        c.randomize(&bounds, &mut rng);
        for gene in &c.genes {
            assert!((12.0..=20.0).contains(&gene.green));
            assert!((30.0..=40.0).contains(&gene.red));
        }
    }

    #[test]
    fn mutation_clamps_to_bounds() {
        let bounds = TimingBounds {
            min_green: 10.0,
            max_green: 11.0,
            min_red: 10.0,
            max_red: 11.0,
        };
        let noise = rand_distr::Normal::new(0.0, 50.0).unwrap();
        let mut rng = SimRng::new(1);
        let mut c = Chromosome::new(32);
        c.clamp(&bounds);
        c.mutate(1.0, &noise, &bounds, &mut rng);
        for gene in &c.genes {
            assert!((10.0..=11.0).contains(&gene.green));
            assert!((10.0..=11.0).contains(&gene.red));
        }
    }

    #[test]
    fn map_round_trip_in_canonical_order() {
        let mut map = intersection();
        let light_count = atc_sim::sim::light_count(&map);

        let mut c = Chromosome::new(light_count);
        for (i, gene) in c.genes.iter_mut().enumerate() {
            gene.green = 10.0 + i as f64;
            gene.red = 20.0 + i as f64;
        }
        c.apply_to_map(&mut map);

        let read_back = Chromosome::from_map(&map);
        assert_eq!(read_back.genes, c.genes);
        // Canonical order: road id ascending, lane ascending — the first
        // gene landed on the lowest road id's lane 0.
        let first_road = map.values().next().unwrap();
        assert_eq!(first_road.lights()[0].green_time(), 10.0);
        assert_eq!(first_road.lights()[0].yellow_time(), crate::FIXED_YELLOW);
    }
}

// ── GA parameters ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod params {
    use super::*;

    #[test]
    fn default_params_are_valid() {
        assert!(GaParams::default().validate().is_ok());
    }

    #[test]
    fn tiny_population_is_rejected() {
        let params = GaParams {
            population_size: 5,
            ..GaParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn out_of_range_rates_are_rejected() {
        for bad in [
            GaParams {
                mutation_rate: 1.5,
                ..GaParams::default()
            },
            GaParams {
                crossover_rate: -0.1,
                ..GaParams::default()
            },
            GaParams {
                tournament_size: 1,
                ..GaParams::default()
            },
            GaParams {
                mutation_std_dev: 0.0,
                ..GaParams::default()
            },
        ] {
            assert!(bad.validate().is_err());
        }
    }
}

// ── Evolution ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod evolution {
    use super::*;

    #[test]
    fn history_is_monotone_non_increasing() {
        let network = intersection();
        let evaluator = FitnessEvaluator::new(200, 0.1);
        let mut ga = GeneticAlgorithm::new(quick_params(42), move |c| {
            evaluator.evaluate(c, &network)
        })
        .unwrap();
        ga.initialize_population(6);
        ga.evolve();

        let history = ga.fitness_history();
        assert_eq!(history.len(), 6);
        for pair in history.windows(2) {
            assert!(
                pair[1] <= pair[0] + 1e-9,
                "best-of-generation got worse: {pair:?}"
            );
        }
    }

    #[test]
    fn fixed_seed_reproduces_evolution() {
        let network = intersection();
        let run = |seed: u64| {
            let network = network.clone();
            let evaluator = FitnessEvaluator::new(150, 0.1);
            let mut ga = GeneticAlgorithm::new(quick_params(seed), move |c| {
                evaluator.evaluate(c, &network)
            })
            .unwrap();
            ga.initialize_population(6);
            let best = ga.evolve();
            (best, ga.fitness_history().to_vec())
        };

        let (best_a, history_a) = run(1234);
        let (best_b, history_b) = run(1234);
        assert_eq!(best_a.genes, best_b.genes);
        assert_eq!(history_a, history_b);

        let (best_c, _) = run(4321);
        assert_ne!(best_a.genes, best_c.genes, "different seeds should diverge");
    }

    #[test]
    fn elitism_keeps_at_least_one_survivor() {
        // elitism_rate · population < 1 must still preserve the champion.
        let network = intersection();
        let evaluator = FitnessEvaluator::new(100, 0.1);
        let params = GaParams {
            population_size: 10,
            generations: 3,
            elitism_rate: 0.05,
            ..quick_params(7)
        };
        let mut ga =
            GeneticAlgorithm::new(params, move |c| evaluator.evaluate(c, &network)).unwrap();
        ga.initialize_population(6);
        ga.evolve();

        let history = ga.fitness_history();
        for pair in history.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-9, "champion was lost: {pair:?}");
        }
    }

    #[test]
    fn optimization_beats_poor_installed_timings() {
        let mut network = intersection();
        // Install a deliberately starved configuration: short green, long red.
        let mut starved = Chromosome::new(atc_sim::sim::light_count(&network));
        for gene in &mut starved.genes {
            gene.green = 10.0;
            gene.red = 60.0;
        }
        starved.apply_to_map(&mut network);

        let evaluator = FitnessEvaluator::new(300, 0.1);
        let baseline = evaluator.baseline(&network);

        let params = GaParams {
            population_size: 16,
            generations: 8,
            ..quick_params(99)
        };
        let gene_count = atc_sim::sim::light_count(&network);
        let fitness_network = network.clone();
        let mut ga = GeneticAlgorithm::new(params, move |c| {
            evaluator.evaluate(c, &fitness_network)
        })
        .unwrap();
        ga.initialize_population(gene_count);
        let best = ga.evolve();

        assert!(
            best.fitness <= baseline,
            "GA best {} worse than baseline {}",
            best.fitness,
            baseline
        );
    }
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod evaluator {
    use super::*;

    #[test]
    fn installed_timings_equal_baseline() {
        // A chromosome mirroring the installed timings must score exactly
        // the baseline: snapshot clones replay identically.
        let network = intersection();
        let evaluator = FitnessEvaluator::new(250, 0.1);

        let mirror = Chromosome::from_map(&network);
        let with_mirror = evaluator.evaluate(&mirror, &network);
        let baseline = evaluator.baseline(&network);
        assert_eq!(with_mirror, baseline);
    }

    #[test]
    fn evaluation_does_not_disturb_the_snapshot() {
        let network = intersection();
        let before: usize = network.values().map(Road::vehicle_count).sum();
        let evaluator = FitnessEvaluator::new(100, 0.1);
        evaluator.evaluate(&Chromosome::from_map(&network), &network);
        let after: usize = network.values().map(Road::vehicle_count).sum();
        assert_eq!(before, after);
    }
}

// ── Validator ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod validator {
    use super::*;

    #[test]
    fn decision_table_covers_all_outcomes() {
        let config = ValidationConfig::default();

        let (passed, reason) = decide(7.5, &config);
        assert!(passed && reason.starts_with("significant improvement"));

        let (passed, reason) = decide(2.0, &config);
        assert!(passed && reason.starts_with("minor improvement"));

        let (passed, reason) = decide(-4.0, &config);
        assert!(passed && reason.starts_with("minor regression within tolerance"));

        let (passed, reason) = decide(-25.0, &config);
        assert!(!passed && reason.starts_with("significant regression"));
    }

    #[test]
    fn identical_timings_validate_with_zero_improvement() {
        let network = intersection();
        let validator = TimingValidator::new(ValidationConfig {
            simulation_steps: 200,
            ..ValidationConfig::default()
        });

        let mirror = Chromosome::from_map(&network);
        let result = validator.validate(&network, &mirror);
        assert!(result.passed);
        assert!(
            result.improvement_percent.abs() < 1e-9,
            "expected symmetry, got {}%",
            result.improvement_percent
        );
    }
}

// ── CSV export ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod export {
    use super::*;
    use crate::history::{export_chromosome_csv, export_history_csv};

    #[test]
    fn history_csv_has_one_row_per_generation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        export_history_csv(&[10.0, 8.5, 8.5, 7.0], &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "generation,best_fitness");
        assert_eq!(lines[1], "0,10");
    }

    #[test]
    fn chromosome_csv_lists_all_lights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solution.csv");
        let c = Chromosome {
            genes: vec![
                SignalTiming {
                    green: 20.0,
                    red: 40.0,
                },
                SignalTiming {
                    green: 35.0,
                    red: 25.0,
                },
            ],
            fitness: 1.0,
        };
        export_chromosome_csv(&c, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.contains("0,20,40"));
        assert!(content.contains("1,35,25"));
    }
}
