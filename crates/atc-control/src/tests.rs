//! Unit tests for atc-control.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use atc_core::{RoadId, RunId, SimRng};
use atc_optimize::{Chromosome, SignalTiming};
use atc_pattern::{OptimizationRun, PatternStore, TrafficPattern};
use atc_sim::light::{LightPhase, TrafficLight};
use atc_sim::{Road, SharedSimulation, Simulation, Vehicle};

use crate::controller::{ContinuousOptimizationController, ControllerConfig};
use crate::error::ControlError;
use crate::feed::{SimulatedTrafficFeed, generate_snapshot};
use crate::transition::{TimingTransition, TransitionSet};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn fixed_light(green: f64, red: f64) -> TrafficLight {
    TrafficLight::fixed(green, 3.0, red, LightPhase::Green, 0.0)
}

/// Shared world: one road, one lane, light at (20, 3, 40).
fn world() -> (SharedSimulation, RoadId) {
    let mut road = Road::new(400.0, 1, 15.0, 31);
    *road.lights_mut().first_mut().unwrap() = fixed_light(20.0, 40.0);
    road.add_vehicle(Vehicle::car(50.0, 8.0, 15.0), 0);
    let id = road.id();
    let mut sim = Simulation::new();
    sim.add_road(road);
    (Arc::new(Mutex::new(sim)), id)
}

fn transition_20_40_to_40_20(road: RoadId, start: Instant) -> TimingTransition {
    TimingTransition {
        road,
        lane: 0,
        start_green: 20.0,
        end_green: 40.0,
        start_red: 40.0,
        end_red: 20.0,
        start,
        end: start + Duration::from_secs(300),
    }
}

// ── TimingTransition interpolation ────────────────────────────────────────────

#[cfg(test)]
mod interpolation {
    use super::*;

    #[test]
    fn halfway_point_is_averaged() {
        let start = Instant::now();
        let t = transition_20_40_to_40_20(RoadId(1), start);

        let mid = start + Duration::from_secs(150);
        assert!((t.progress_at(mid) - 0.5).abs() < 1e-12);
        assert!((t.green_at(mid) - 30.0).abs() < 1e-9);
        assert!((t.red_at(mid) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn endpoints_are_exact() {
        let start = Instant::now();
        let t = transition_20_40_to_40_20(RoadId(1), start);

        assert_eq!(t.progress_at(start), 0.0);
        assert_eq!(t.green_at(start), 20.0);

        let end = start + Duration::from_secs(300);
        assert_eq!(t.progress_at(end), 1.0);
        assert_eq!(t.green_at(end), 40.0);
        assert_eq!(t.red_at(end), 20.0);
        assert!(t.is_complete_at(end));
        assert!(!t.is_complete_at(end - Duration::from_millis(1)));
    }

    #[test]
    fn progress_is_clamped_beyond_the_window() {
        let start = Instant::now();
        let t = transition_20_40_to_40_20(RoadId(1), start);
        assert_eq!(t.progress_at(start + Duration::from_secs(10_000)), 1.0);
    }

    #[test]
    fn drive_applies_and_retires() {
        let (sim, road) = world();
        let start = Instant::now();
        let mut set = TransitionSet::new();
        set.replace(vec![transition_20_40_to_40_20(road, start)]);

        let mut guard = sim.lock().unwrap();

        // Mid-transition: interpolated timings, transition still active.
        set.drive_at(&mut guard.map, start + Duration::from_secs(150));
        let light = &guard.map[&road].lights()[0];
        assert!((light.green_time() - 30.0).abs() < 1e-9);
        assert!((light.red_time() - 30.0).abs() < 1e-9);
        assert_eq!(light.yellow_time(), 3.0);
        assert_eq!(set.len(), 1);

        // Just past the end: final timings installed, transition removed.
        set.drive_at(&mut guard.map, start + Duration::from_millis(300_010));
        let light = &guard.map[&road].lights()[0];
        assert_eq!(light.green_time(), 40.0);
        assert_eq!(light.red_time(), 20.0);
        assert!(set.is_empty());
    }

    #[test]
    fn replace_drops_in_flight_transitions() {
        let start = Instant::now();
        let mut set = TransitionSet::new();
        set.replace(vec![transition_20_40_to_40_20(RoadId(1), start)]);
        set.replace(vec![
            transition_20_40_to_40_20(RoadId(1), start),
            transition_20_40_to_40_20(RoadId(2), start),
        ]);
        assert_eq!(set.len(), 2);
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod controller {
    use super::*;

    fn target_chromosome() -> Chromosome {
        Chromosome {
            genes: vec![SignalTiming {
                green: 40.0,
                red: 20.0,
            }],
            fitness: 1.0,
        }
    }

    #[test]
    fn gradual_apply_builds_one_transition_per_light() {
        let (sim, road) = world();
        let controller = ContinuousOptimizationController::new(sim, None, None);
        controller.apply_chromosome_gradually(&target_chromosome());

        let active = controller.active_transitions();
        assert_eq!(active.len(), 1);
        let t = &active[0];
        assert_eq!(t.road, road);
        assert_eq!(t.lane, 0);
        assert_eq!(t.start_green, 20.0);
        assert_eq!(t.end_green, 40.0);
        assert_eq!(t.start_red, 40.0);
        assert_eq!(t.end_red, 20.0);
    }

    #[test]
    fn update_transitions_walks_the_light_to_target() {
        let (sim, road) = world();
        let controller = ContinuousOptimizationController::new(Arc::clone(&sim), None, None);
        controller.apply_chromosome_gradually(&target_chromosome());

        let start = controller.active_transitions()[0].start;
        controller.update_transitions_at(start + Duration::from_secs(301));

        let guard = sim.lock().unwrap();
        let light = &guard.map[&road].lights()[0];
        assert_eq!(light.green_time(), 40.0);
        assert_eq!(light.red_time(), 20.0);
        drop(guard);
        assert!(controller.active_transitions().is_empty());
    }

    #[test]
    fn rollback_restores_previous_timings() {
        let (sim, road) = world();
        let controller = ContinuousOptimizationController::new(Arc::clone(&sim), None, None);
        controller.apply_chromosome_gradually(&target_chromosome());

        // Drive to completion, then undo.
        let start = controller.active_transitions()[0].start;
        controller.update_transitions_at(start + Duration::from_secs(301));
        controller.rollback().unwrap();

        let guard = sim.lock().unwrap();
        let light = &guard.map[&road].lights()[0];
        assert_eq!(light.green_time(), 20.0);
        assert_eq!(light.red_time(), 40.0);
        drop(guard);

        // Nothing left to roll back to.
        assert!(matches!(
            controller.rollback(),
            Err(ControlError::Config(_))
        ));
    }

    #[test]
    fn config_bounds_are_validated() {
        let (sim, _) = world();
        let controller = ContinuousOptimizationController::new(sim, None, None);

        for bad in [
            ControllerConfig {
                optimization_interval_secs: 10,
                ..ControllerConfig::default()
            },
            ControllerConfig {
                transition_duration_secs: 5,
                ..ControllerConfig::default()
            },
            ControllerConfig {
                prediction_horizon_minutes: 500,
                ..ControllerConfig::default()
            },
        ] {
            assert!(matches!(
                controller.set_config(bad),
                Err(ControlError::Config(_))
            ));
        }
    }

    #[test]
    fn predictive_mode_requires_a_predictor() {
        let (sim, _) = world();
        let controller = ContinuousOptimizationController::new(sim, None, None);
        let config = ControllerConfig {
            use_prediction: true,
            ..ControllerConfig::default()
        };
        assert!(matches!(
            controller.set_config(config),
            Err(ControlError::PredictorUnavailable)
        ));
    }

    #[test]
    fn worker_starts_and_stops_promptly() {
        let (sim, _) = world();
        let mut controller = ContinuousOptimizationController::new(sim, None, None);

        controller.start().unwrap();
        assert!(controller.is_running());
        assert!(matches!(
            controller.start(),
            Err(ControlError::AlreadyRunning)
        ));

        let begun = Instant::now();
        controller.stop();
        assert!(!controller.is_running());
        // Shutdown latency is bounded by the one-second heartbeat.
        assert!(begun.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn apply_run_replays_a_persisted_chromosome() {
        let (sim, _) = world();
        let store = Arc::new(PatternStore::open_in_memory().unwrap());

        let run_id = store
            .insert_run(&OptimizationRun {
                id: RunId(0),
                status: "completed".to_owned(),
                started_at: 1_000,
                completed_at: Some(1_100),
                population_size: 30,
                generations: 30,
                simulation_steps: 500,
                baseline_fitness: Some(50.0),
                best_fitness: Some(40.0),
                improvement_percent: Some(20.0),
            })
            .unwrap();
        store
            .insert_solution(
                run_id,
                40.0,
                r#"[{"greenTime":40.0,"redTime":20.0}]"#,
                1,
                true,
                1_100,
            )
            .unwrap();

        let controller = ContinuousOptimizationController::new(sim, Some(store), None);
        controller.apply_run(run_id).unwrap();
        assert_eq!(controller.active_transitions().len(), 1);
        assert_eq!(controller.active_transitions()[0].end_green, 40.0);

        assert!(matches!(
            controller.apply_run(RunId(999)),
            Err(ControlError::RunNotFound(_))
        ));
    }

    #[test]
    fn incomplete_run_is_not_applied() {
        let (sim, _) = world();
        let store = Arc::new(PatternStore::open_in_memory().unwrap());
        let run_id = store
            .insert_run(&OptimizationRun {
                id: RunId(0),
                status: "running".to_owned(),
                started_at: 1_000,
                completed_at: None,
                population_size: 30,
                generations: 30,
                simulation_steps: 500,
                baseline_fitness: None,
                best_fitness: None,
                improvement_percent: None,
            })
            .unwrap();

        let controller = ContinuousOptimizationController::new(sim, Some(store), None);
        assert!(matches!(
            controller.apply_run(run_id),
            Err(ControlError::NotCompleted(_))
        ));
    }
}

// ── Feed ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod feed {
    use super::*;

    /// 08:00 UTC on Tuesday 2024-01-09.  The feed buckets by the host's
    /// local clock, so the pattern key is derived, not hardcoded.
    const TUESDAY_0800: i64 = 1_704_758_400 + 8 * 3_600;

    fn pattern(road: RoadId, avg: f64, samples: u32) -> TrafficPattern {
        let (dow, slot) = atc_core::clock::day_and_slot(TUESDAY_0800);
        TrafficPattern {
            road,
            day_of_week: dow,
            time_slot: slot,
            avg_vehicle_count: avg,
            avg_queue_length: 1.0,
            avg_speed: 9.0,
            avg_flow_rate: 0.0,
            min_vehicle_count: avg - 2.0,
            max_vehicle_count: avg + 2.0,
            stddev_vehicle_count: 0.0,
            sample_count: samples,
            last_updated: TUESDAY_0800,
        }
    }

    #[test]
    fn pattern_backed_entry_samples_around_the_mean() {
        let (sim, road) = world();
        let store = Arc::new(PatternStore::open_in_memory().unwrap());
        store.upsert_pattern(&pattern(road, 10.0, 20)).unwrap();

        let mut rng = SimRng::new(3);
        let snapshot = generate_snapshot(&store, &sim, TUESDAY_0800, &mut rng).unwrap();

        assert_eq!(snapshot.entries.len(), 1);
        let entry = &snapshot.entries[0];
        assert_eq!(entry.road, road);
        // Mean 10, sigma 1·0.3: stays well within [5, 15].
        assert!((5..=15).contains(&entry.expected_vehicle_count));
        assert_eq!(entry.expected_avg_speed, 9.0);
        assert_eq!(entry.confidence, 1.0);
        assert_eq!(snapshot.source, "simulated");
    }

    #[test]
    fn missing_pattern_falls_back_to_capacity_estimate() {
        let (sim, _) = world();
        let store = Arc::new(PatternStore::open_in_memory().unwrap());

        let mut rng = SimRng::new(3);
        let snapshot = generate_snapshot(&store, &sim, TUESDAY_0800, &mut rng).unwrap();

        let entry = &snapshot.entries[0];
        // 400 m / 20 m spacing = 20 per lane, 30–50 % utilization.
        assert!((6..=10).contains(&entry.expected_vehicle_count));
        assert!((entry.expected_avg_speed - 15.0 * 0.7).abs() < 1e-9);
        assert_eq!(entry.confidence, 0.5);
    }

    #[test]
    fn feed_thread_publishes_and_stops_promptly() {
        let (sim, _) = world();
        let store = Arc::new(PatternStore::open_in_memory().unwrap());
        let mut feed = SimulatedTrafficFeed::new(store, sim, 11);
        feed.set_update_interval_ms(50); // clamped up to 100

        let received = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&received);
        feed.subscribe(Box::new(move |snapshot| {
            assert!(!snapshot.entries.is_empty());
            *counter.lock().unwrap() += 1;
        }));

        feed.start();
        std::thread::sleep(Duration::from_millis(350));

        let begun = Instant::now();
        feed.stop();
        assert!(begun.elapsed() < Duration::from_secs(1), "slow shutdown");

        assert!(*received.lock().unwrap() >= 2, "feed barely ticked");
        assert!(!feed.latest_snapshot().entries.is_empty());
        assert!(!feed.is_running());
    }
}

// ── Observer bridges ──────────────────────────────────────────────────────────

#[cfg(test)]
mod observers {
    use super::*;
    use atc_metrics::{MetricsCollector, TravelTimeCollector};
    use atc_sim::sim::TickReport;
    use atc_sim::{SimObserver, SimulationSnapshot};

    use crate::observers::{
        MetricsObserver, PatternObserver, StreamObserver, TravelTimeObserver,
    };

    #[test]
    fn metrics_observer_collects_and_counts_exits() {
        let (sim, _) = world();
        let collector = Arc::new(Mutex::new(MetricsCollector::new()));
        let mut observer = MetricsObserver::new(Arc::clone(&collector));

        let guard = sim.lock().unwrap();
        observer.on_tick_end(
            1,
            0.1,
            &TickReport {
                transitions_applied: 0,
                vehicles_exited: 2,
            },
        );
        observer.on_metrics_interval(&guard.map, 0.1);
        drop(guard);

        let metrics = collector.lock().unwrap().metrics();
        assert_eq!(metrics.sample_count, 1);
        assert_eq!(metrics.vehicles_exited, 2.0);
    }

    #[test]
    fn pattern_observer_records_batches() {
        let (sim, road) = world();
        let store = Arc::new(PatternStore::open_in_memory().unwrap());
        let mut observer = PatternObserver::new(Arc::clone(&store));

        let guard = sim.lock().unwrap();
        observer.on_pattern_interval(&guard.map, 12_345);
        drop(guard);

        let rows = store.snapshots_since(0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].road, road);
        assert_eq!(rows[0].timestamp, 12_345);
    }

    #[test]
    fn travel_time_observer_updates_tracking() {
        let (sim, road) = world();
        let collector = Arc::new(Mutex::new(TravelTimeCollector::new()));
        collector
            .lock()
            .unwrap()
            .add_od_pair(road, RoadId(999), "out");
        let mut observer = TravelTimeObserver::new(Arc::clone(&collector));

        let guard = sim.lock().unwrap();
        observer.on_metrics_interval(&guard.map, 1.0);
        drop(guard);

        assert_eq!(collector.lock().unwrap().tracked_count(), 1);
    }

    #[test]
    fn stream_observer_captures_latest() {
        let (sim, _) = world();
        let latest = Arc::new(Mutex::new(SimulationSnapshot::default()));
        let mut observer = StreamObserver::new(Arc::clone(&latest));

        let guard = sim.lock().unwrap();
        observer.on_stream_interval(&guard.map, 7, 0.7);
        drop(guard);

        let snapshot = latest.lock().unwrap();
        assert_eq!(snapshot.step, 7);
        assert_eq!(snapshot.vehicles.len(), 1);
        assert_eq!(snapshot.lights.len(), 1);
    }
}
