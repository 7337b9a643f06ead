//! Unit tests for atc-pattern.

use atc_core::{RoadId, SimRng, clock};
use atc_metrics::RoadMetrics;

use crate::model::{OptimizationRun, PatternConfig};
use crate::store::PatternStore;

// ── Helpers ───────────────────────────────────────────────────────────────────

/// 08:00 UTC on Tuesday 2024-01-09.  Bucketing follows the host's local
/// clock, so tests derive the expected (day, slot) via `clock::day_and_slot`
/// instead of hardcoding it.
const TUESDAY_0800: i64 = 1_704_758_400 + 8 * 3_600;

/// Base instant for single-bucket tests: five minutes past the hour, so a
/// short sample span cannot straddle a half-hour boundary in any timezone
/// with a quarter-hour-multiple offset.
const BUCKET_BASE: i64 = TUESDAY_0800 + 300;

fn metrics(road: u64, vehicle_count: u32) -> RoadMetrics {
    RoadMetrics {
        road: RoadId(road),
        vehicle_count,
        queue_length: vehicle_count as f64 / 2.0,
        avg_speed: 10.0,
        flow_rate: 0.0,
    }
}

// ── Snapshots ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod snapshots {
    use super::*;

    #[test]
    fn batch_round_trips() {
        let store = PatternStore::open_in_memory().unwrap();
        store
            .record_snapshot_batch(&[metrics(1, 4), metrics(2, 9)], 1_000)
            .unwrap();

        let rows = store.snapshots_since(0).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, 1_000);
        assert_eq!(rows[1].road, RoadId(2));
        assert_eq!(rows[1].vehicle_count, 9);
    }

    #[test]
    fn since_filter_applies() {
        let store = PatternStore::open_in_memory().unwrap();
        store.record_snapshot_batch(&[metrics(1, 1)], 100).unwrap();
        store.record_snapshot_batch(&[metrics(1, 2)], 200).unwrap();
        assert_eq!(store.snapshots_since(150).unwrap().len(), 1);
    }

    #[test]
    fn empty_batch_is_a_noop() {
        let store = PatternStore::open_in_memory().unwrap();
        store.record_snapshot_batch(&[], 100).unwrap();
        assert!(store.snapshots_since(0).unwrap().is_empty());
    }

    #[test]
    fn prune_deletes_only_old_rows() {
        let store = PatternStore::open_in_memory().unwrap();
        let now = 10 * 86_400;
        store.record_snapshot_batch(&[metrics(1, 1)], 86_400).unwrap(); // day 1
        store
            .record_snapshot_batch(&[metrics(1, 2)], 9 * 86_400)
            .unwrap(); // day 9

        let deleted = store.prune_snapshots(7, now).unwrap();
        assert_eq!(deleted, 1);
        let remaining = store.snapshots_since(0).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].vehicle_count, 2);
    }
}

// ── Aggregation ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod aggregation {
    use super::*;

    #[test]
    fn hundred_snapshots_build_one_pattern() {
        // 100 samples for road 1, all within one half-hour bucket, with
        // vehicle counts uniform in {8..12}.
        let store = PatternStore::open_in_memory().unwrap();
        let mut rng = SimRng::new(17);
        for i in 0..100 {
            let count = rng.gen_range(8..=12u32);
            store
                .record_snapshot_batch(&[metrics(1, count)], BUCKET_BASE + i * 4)
                .unwrap();
        }

        let updated = store.aggregate_snapshots(BUCKET_BASE + 3_600).unwrap();
        assert_eq!(updated, 1);

        let (dow, slot) = clock::day_and_slot(BUCKET_BASE);
        let pattern = store.pattern(RoadId(1), dow, slot).unwrap().unwrap();
        assert_eq!(pattern.sample_count, 100);
        assert!(
            (pattern.avg_vehicle_count - 10.0).abs() < 0.3,
            "mean {}",
            pattern.avg_vehicle_count
        );
        assert!(pattern.min_vehicle_count <= 8.0);
        assert!(pattern.max_vehicle_count >= 12.0);
        assert!(pattern.stddev_vehicle_count > 0.0);
        assert_eq!(pattern.day_of_week, dow);
        assert_eq!(pattern.time_slot, slot);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let store = PatternStore::open_in_memory().unwrap();
        for i in 0..10 {
            store
                .record_snapshot_batch(&[metrics(1, 5 + (i % 3) as u32)], TUESDAY_0800 + i * 30)
                .unwrap();
        }

        let now = TUESDAY_0800 + 7_200;
        store.aggregate_snapshots(now).unwrap();
        let first = store.all_patterns().unwrap();
        store.aggregate_snapshots(now).unwrap();
        let second = store.all_patterns().unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn sparse_buckets_are_skipped() {
        let store = PatternStore::open_in_memory().unwrap();
        // Two samples only — below the default floor of 3.
        store
            .record_snapshot_batch(&[metrics(1, 5)], TUESDAY_0800)
            .unwrap();
        store
            .record_snapshot_batch(&[metrics(1, 6)], TUESDAY_0800 + 60)
            .unwrap();

        let updated = store.aggregate_snapshots(TUESDAY_0800 + 3_600).unwrap();
        assert_eq!(updated, 0);
        assert!(store.all_patterns().unwrap().is_empty());
    }

    #[test]
    fn snapshots_outside_retention_are_ignored() {
        let store = PatternStore::open_in_memory().unwrap();
        store.set_config(PatternConfig {
            retention_days: 7,
            min_samples_for_pattern: 1,
            ..PatternConfig::default()
        });

        let now = TUESDAY_0800 + 30 * 86_400;
        // All samples are 30 days old: outside the window.
        for i in 0..5 {
            store
                .record_snapshot_batch(&[metrics(1, 5)], TUESDAY_0800 + i * 60)
                .unwrap();
        }
        assert_eq!(store.aggregate_snapshots(now).unwrap(), 0);
    }

    #[test]
    fn buckets_split_by_road_and_slot() {
        let store = PatternStore::open_in_memory().unwrap();
        store.set_config(PatternConfig {
            min_samples_for_pattern: 1,
            ..PatternConfig::default()
        });

        for i in 0..3 {
            // Road 1 in one bucket, road 2 exactly one slot later.
            store
                .record_snapshot_batch(&[metrics(1, 4)], BUCKET_BASE + i * 60)
                .unwrap();
            store
                .record_snapshot_batch(&[metrics(2, 8)], BUCKET_BASE + 1_800 + i * 60)
                .unwrap();
        }

        let first = clock::day_and_slot(BUCKET_BASE);
        let second = clock::day_and_slot(BUCKET_BASE + 1_800);
        assert_ne!(first, second);

        assert_eq!(store.aggregate_snapshots(BUCKET_BASE + 7_200).unwrap(), 2);
        assert!(store.pattern(RoadId(1), first.0, first.1).unwrap().is_some());
        assert!(store.pattern(RoadId(2), second.0, second.1).unwrap().is_some());
        assert!(store.pattern(RoadId(1), second.0, second.1).unwrap().is_none());

        assert_eq!(store.patterns_for_road(RoadId(1)).unwrap().len(), 1);
        assert_eq!(store.patterns_for_slot(first.0, first.1).unwrap().len(), 1);
    }
}

// ── Runs & solutions ──────────────────────────────────────────────────────────

#[cfg(test)]
mod runs {
    use super::*;
    use atc_core::RunId;

    fn completed_run() -> OptimizationRun {
        OptimizationRun {
            id: RunId(0),
            status: "completed".to_owned(),
            started_at: 1_000,
            completed_at: Some(1_060),
            population_size: 30,
            generations: 30,
            simulation_steps: 500,
            baseline_fitness: Some(42.0),
            best_fitness: Some(35.5),
            improvement_percent: Some(15.5),
        }
    }

    #[test]
    fn run_round_trips() {
        let store = PatternStore::open_in_memory().unwrap();
        let id = store.insert_run(&completed_run()).unwrap();

        let loaded = store.run(id).unwrap().unwrap();
        assert_eq!(loaded.status, "completed");
        assert_eq!(loaded.best_fitness, Some(35.5));
        assert_eq!(loaded.id, id);
        assert!(store.run(RunId(9_999)).unwrap().is_none());
    }

    #[test]
    fn best_solution_round_trips() {
        let store = PatternStore::open_in_memory().unwrap();
        let run = store.insert_run(&completed_run()).unwrap();
        let json = r#"[{"greenTime":20.0,"redTime":40.0}]"#;
        store
            .insert_solution(run, 35.5, json, 1, true, 1_060)
            .unwrap();

        let best = store.best_solution(run).unwrap().unwrap();
        assert_eq!(best.chromosome_json, json);
        assert_eq!(best.light_count, 1);
        assert!(best.is_best);
    }

    #[test]
    fn profiles_round_trip_and_activate_exclusively() {
        use crate::model::TrafficProfile;

        let store = PatternStore::open_in_memory().unwrap();
        let profile = |name: &str| TrafficProfile {
            id: 0,
            name: name.to_owned(),
            description: "test bundle".to_owned(),
            spawn_rates_json: r#"[{"road":1,"lane":0,"vehiclesPerMinute":12.0}]"#.to_owned(),
            light_timings_json: r#"[{"road":1,"lane":0,"green":30.0,"yellow":3.0,"red":30.0}]"#
                .to_owned(),
            active: false,
            created_at: 1_000,
        };
        store.upsert_profile(&profile("rush-hour")).unwrap();
        store.upsert_profile(&profile("night")).unwrap();

        assert_eq!(store.all_profiles().unwrap().len(), 2);
        let loaded = store.profile("rush-hour").unwrap().unwrap();
        assert!(loaded.spawn_rates_json.contains("vehiclesPerMinute"));
        assert!(!loaded.active);

        // Activation is exclusive.
        assert!(store.activate_profile("rush-hour").unwrap());
        assert!(store.activate_profile("night").unwrap());
        let profiles = store.all_profiles().unwrap();
        let active: Vec<&str> = profiles
            .iter()
            .filter(|p| p.active)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(active, vec!["night"]);

        // Unknown names activate nothing; deletes report accurately.
        assert!(!store.activate_profile("ghost").unwrap());
        assert!(store.delete_profile("night").unwrap());
        assert!(!store.delete_profile("night").unwrap());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.db");

        let id = {
            let store = PatternStore::open(&path).unwrap();
            store
                .record_snapshot_batch(&[metrics(1, 5)], TUESDAY_0800)
                .unwrap();
            store.insert_run(&completed_run()).unwrap()
        };

        let store = PatternStore::open(&path).unwrap();
        assert_eq!(store.snapshots_since(0).unwrap().len(), 1);
        assert!(store.run(id).unwrap().is_some());
    }
}
