//! Unit tests for atc-core.

use crate::{CartPoint, RoadId, SimRng, VehicleId, clock, geo};

// ── ids ───────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod ids {
    use super::*;

    #[test]
    fn vehicle_ids_are_unique_and_monotone() {
        let a = VehicleId::next();
        let b = VehicleId::next();
        let c = VehicleId::next();
        assert!(a < b && b < c);
    }

    #[test]
    fn road_ids_are_unique() {
        let a = RoadId::next();
        let b = RoadId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_are_concurrency_safe() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..1000).map(|_| VehicleId::next()).collect::<Vec<_>>()))
            .collect();
        let mut all: Vec<VehicleId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let before = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), before);
    }
}

// ── clock ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod clock_arithmetic {
    use super::clock::{
        day_and_slot, day_and_slot_at, day_of_week_at, local_offset_secs, slot_label,
        time_slot_at,
    };

    #[test]
    fn epoch_was_a_thursday_in_utc() {
        assert_eq!(day_of_week_at(0, 0), 4);
    }

    #[test]
    fn known_sunday_in_utc() {
        // 2024-01-07 00:00:00 UTC was a Sunday.
        assert_eq!(day_of_week_at(1_704_585_600, 0), 0);
    }

    #[test]
    fn slots_cover_the_day_in_utc() {
        assert_eq!(time_slot_at(0, 0), 0); // 00:00
        assert_eq!(time_slot_at(29 * 60, 0), 0); // 00:29
        assert_eq!(time_slot_at(30 * 60, 0), 1); // 00:30
        assert_eq!(time_slot_at(8 * 3_600, 0), 16); // 08:00
        assert_eq!(time_slot_at(23 * 3_600 + 45 * 60, 0), 47); // 23:45
    }

    #[test]
    fn offset_shifts_day_and_slot_together() {
        // Sunday 23:45 UTC ...
        let unix = 1_704_585_600 + 23 * 3_600 + 45 * 60;
        assert_eq!(day_and_slot_at(unix, 0), (0, 47));
        // ... is Monday 00:45 in CET (+1 h) ...
        assert_eq!(day_and_slot_at(unix, 3_600), (1, 1));
        // ... and still Sunday 14:45 at UTC-9.
        assert_eq!(day_and_slot_at(unix, -(9 * 3_600)), (0, 29));
        // Quarter-hour offsets land mid-slot: Monday 05:30 at +5:45.
        assert_eq!(day_and_slot_at(unix, 5 * 3_600 + 45 * 60), (1, 11));
    }

    #[test]
    fn local_bucketing_uses_the_host_offset() {
        // The wall-clock entry points are exactly the pure variants applied
        // at the host timezone's offset for that instant.
        let unix = 1_704_585_600 + 12 * 3_600;
        let offset = local_offset_secs(unix);
        assert!((-14 * 3_600..=14 * 3_600).contains(&offset));
        assert_eq!(day_and_slot(unix), day_and_slot_at(unix, offset));
    }

    #[test]
    fn slot_labels() {
        assert_eq!(slot_label(0), "00:00-00:30");
        assert_eq!(slot_label(16), "08:00-08:30");
        assert_eq!(slot_label(17), "08:30-09:00");
        assert_eq!(slot_label(47), "23:30-00:00");
        assert_eq!(slot_label(48), "invalid");
    }
}

// ── rng ───────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod rng {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = SimRng::new(7);
        let mut b = SimRng::new(7);
        for _ in 0..100 {
            assert_eq!(a.gen_range(0..1_000_000), b.gen_range(0..1_000_000));
        }
    }

    #[test]
    fn derived_streams_differ() {
        let mut a = SimRng::derive(7, 1);
        let mut b = SimRng::derive(7, 2);
        let draws_a: Vec<u64> = (0..10).map(|_| a.gen_range(0..u64::MAX)).collect();
        let draws_b: Vec<u64> = (0..10).map(|_| b.gen_range(0..u64::MAX)).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn clone_replays_identically() {
        let mut a = SimRng::new(42);
        a.gen_range(0..100); // advance
        let mut b = a.clone();
        assert_eq!(a.gen_range(0..1_000_000), b.gen_range(0..1_000_000));
    }

    #[test]
    fn unit_is_in_range() {
        let mut rng = SimRng::new(1);
        for _ in 0..1_000 {
            let u = rng.unit();
            assert!((0.0..1.0).contains(&u));
        }
    }
}

// ── geo ───────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod projection {
    use super::*;

    #[test]
    fn origin_maps_to_reference() {
        let g = CartPoint::new(0.0, 0.0).to_geo();
        assert!((g.lat - geo::REF_LAT).abs() < 1e-12);
        assert!((g.lon - geo::REF_LON).abs() < 1e-12);
    }

    #[test]
    fn one_degree_of_latitude() {
        let g = CartPoint::new(0.0, geo::METERS_PER_DEG_LAT).to_geo();
        assert!((g.lat - (geo::REF_LAT + 1.0)).abs() < 1e-9);
    }

    #[test]
    fn lerp_endpoints_and_midpoint() {
        let a = CartPoint::new(0.0, 0.0);
        let b = CartPoint::new(100.0, 200.0);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
        let mid = a.lerp(b, 0.5);
        assert!((mid.x - 50.0).abs() < 1e-12 && (mid.y - 100.0).abs() < 1e-12);
        // Out-of-range t is clamped.
        assert_eq!(a.lerp(b, 2.0), b);
    }
}
