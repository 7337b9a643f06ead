//! The SQLite pattern store.
//!
//! One connection behind a mutex; batch writes go through prepared
//! statements inside a transaction.  Patterns are derivable at any time by
//! re-aggregating the surviving snapshots — aggregation is a pure fold over
//! the time-series, upserted by `(road_id, day_of_week, time_slot)`, so
//! running it twice without new data yields identical rows (modulo
//! `last_updated`).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, params};
use tracing::{debug, info};

use atc_core::{DayOfWeek, RoadId, RunId, TimeSlot, clock};
use atc_metrics::RoadMetrics;

use crate::error::StorageResult;
use crate::model::{
    OptimizationRun, PatternConfig, StoredSolution, TrafficPattern, TrafficProfile,
    TrafficSnapshot,
};

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous  = NORMAL;
    CREATE TABLE IF NOT EXISTS traffic_snapshots (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp     INTEGER NOT NULL,
        road_id       INTEGER NOT NULL,
        vehicle_count INTEGER NOT NULL,
        queue_length  REAL    NOT NULL,
        avg_speed     REAL    NOT NULL,
        flow_rate     REAL    NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_snapshots_timestamp
        ON traffic_snapshots(timestamp);
    CREATE TABLE IF NOT EXISTS traffic_patterns (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        road_id              INTEGER NOT NULL,
        day_of_week          INTEGER NOT NULL,
        time_slot            INTEGER NOT NULL,
        avg_vehicle_count    REAL    NOT NULL,
        avg_queue_length     REAL    NOT NULL,
        avg_speed            REAL    NOT NULL,
        avg_flow_rate        REAL    NOT NULL,
        min_vehicle_count    REAL    NOT NULL,
        max_vehicle_count    REAL    NOT NULL,
        stddev_vehicle_count REAL    NOT NULL,
        sample_count         INTEGER NOT NULL,
        last_updated         INTEGER NOT NULL,
        UNIQUE(road_id, day_of_week, time_slot)
    );
    CREATE TABLE IF NOT EXISTS optimization_runs (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        status              TEXT    NOT NULL,
        started_at          INTEGER NOT NULL,
        completed_at        INTEGER,
        population_size     INTEGER NOT NULL,
        generations         INTEGER NOT NULL,
        simulation_steps    INTEGER NOT NULL,
        baseline_fitness    REAL,
        best_fitness        REAL,
        improvement_percent REAL
    );
    CREATE TABLE IF NOT EXISTS optimization_solutions (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id          INTEGER NOT NULL REFERENCES optimization_runs(id),
        fitness         REAL    NOT NULL,
        chromosome_json TEXT    NOT NULL,
        light_count     INTEGER NOT NULL,
        is_best         INTEGER NOT NULL,
        created_at      INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS traffic_profiles (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        name               TEXT    NOT NULL UNIQUE,
        description        TEXT    NOT NULL,
        spawn_rates_json   TEXT    NOT NULL,
        light_timings_json TEXT    NOT NULL,
        active             INTEGER NOT NULL DEFAULT 0,
        created_at         INTEGER NOT NULL
    );
";

/// Snapshot, pattern, and run persistence behind one SQLite connection.
pub struct PatternStore {
    conn: Mutex<Connection>,
    config: Mutex<PatternConfig>,
}

impl PatternStore {
    /// Open (or create) the database at `path` and initialize the schema.
    pub fn open(path: &Path) -> StorageResult<PatternStore> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory store — tests and ephemeral runs.
    pub fn open_in_memory() -> StorageResult<PatternStore> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<PatternStore> {
        conn.execute_batch(SCHEMA)?;
        info!("pattern store ready");
        Ok(PatternStore {
            conn: Mutex::new(conn),
            config: Mutex::new(PatternConfig::default()),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn config(&self) -> PatternConfig {
        match self.config.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_config(&self, config: PatternConfig) {
        let mut guard = match self.config.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = config;
    }

    // ── Snapshots ─────────────────────────────────────────────────────────

    /// Append one batch of per-road metrics, all stamped `timestamp`.
    pub fn record_snapshot_batch(
        &self,
        metrics: &[RoadMetrics],
        timestamp: i64,
    ) -> StorageResult<()> {
        if metrics.is_empty() {
            return Ok(());
        }
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO traffic_snapshots \
                 (timestamp, road_id, vehicle_count, queue_length, avg_speed, flow_rate) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for m in metrics {
                stmt.execute(params![
                    timestamp,
                    m.road.raw() as i64,
                    m.vehicle_count,
                    m.queue_length,
                    m.avg_speed,
                    m.flow_rate,
                ])?;
            }
        }
        tx.commit()?;
        debug!(count = metrics.len(), timestamp, "recorded snapshot batch");
        Ok(())
    }

    /// Raw snapshots with `timestamp >= since`, oldest first.
    pub fn snapshots_since(&self, since: i64) -> StorageResult<Vec<TrafficSnapshot>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT timestamp, road_id, vehicle_count, queue_length, avg_speed, flow_rate \
             FROM traffic_snapshots WHERE timestamp >= ?1 ORDER BY timestamp",
        )?;
        let rows = stmt.query_map([since], |row| {
            Ok(TrafficSnapshot {
                timestamp: row.get(0)?,
                road: RoadId(row.get::<_, i64>(1)? as u64),
                vehicle_count: row.get(2)?,
                queue_length: row.get(3)?,
                avg_speed: row.get(4)?,
                flow_rate: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Delete raw snapshots older than `days` relative to `now`.
    pub fn prune_snapshots(&self, days: u32, now: i64) -> StorageResult<usize> {
        let cutoff = now - i64::from(days) * 86_400;
        let deleted = self.conn().execute(
            "DELETE FROM traffic_snapshots WHERE timestamp < ?1",
            [cutoff],
        )?;
        info!(days, deleted, "pruned old snapshots");
        Ok(deleted)
    }

    // ── Aggregation ───────────────────────────────────────────────────────

    /// Fold the retention window into `(road, dow, slot)` patterns.
    ///
    /// Buckets below `min_samples_for_pattern` are skipped.  Returns the
    /// number of patterns upserted.
    pub fn aggregate_snapshots(&self, now: i64) -> StorageResult<usize> {
        let config = self.config();
        let cutoff = now - i64::from(config.retention_days) * 86_400;
        let snapshots = self.snapshots_since(cutoff)?;
        if snapshots.is_empty() {
            debug!("no snapshots to aggregate");
            return Ok(0);
        }

        let mut buckets: BTreeMap<(RoadId, DayOfWeek, TimeSlot), Vec<&TrafficSnapshot>> =
            BTreeMap::new();
        for snapshot in &snapshots {
            let (dow, slot) = clock::day_and_slot(snapshot.timestamp);
            buckets
                .entry((snapshot.road, dow, slot))
                .or_default()
                .push(snapshot);
        }

        let mut updated = 0usize;
        for ((road, day_of_week, time_slot), rows) in buckets {
            if (rows.len() as u32) < config.min_samples_for_pattern {
                debug!(%road, day_of_week, time_slot, samples = rows.len(), "bucket below sample floor, skipped");
                continue;
            }

            let n = rows.len() as f64;
            let counts: Vec<f64> = rows.iter().map(|s| f64::from(s.vehicle_count)).collect();
            let avg_vehicle_count = counts.iter().sum::<f64>() / n;
            let variance = counts
                .iter()
                .map(|c| (c - avg_vehicle_count).powi(2))
                .sum::<f64>()
                / n;

            let pattern = TrafficPattern {
                road,
                day_of_week,
                time_slot,
                avg_vehicle_count,
                avg_queue_length: rows.iter().map(|s| s.queue_length).sum::<f64>() / n,
                avg_speed: rows.iter().map(|s| s.avg_speed).sum::<f64>() / n,
                avg_flow_rate: rows.iter().map(|s| s.flow_rate).sum::<f64>() / n,
                min_vehicle_count: counts.iter().copied().fold(f64::INFINITY, f64::min),
                max_vehicle_count: counts.iter().copied().fold(0.0, f64::max),
                stddev_vehicle_count: variance.sqrt(),
                sample_count: rows.len() as u32,
                last_updated: now,
            };
            self.upsert_pattern(&pattern)?;
            updated += 1;
        }

        info!(patterns = updated, "snapshot aggregation complete");
        Ok(updated)
    }

    /// Insert or replace the pattern for its `(road, dow, slot)` key.
    pub fn upsert_pattern(&self, pattern: &TrafficPattern) -> StorageResult<()> {
        self.conn().execute(
            "INSERT INTO traffic_patterns \
             (road_id, day_of_week, time_slot, avg_vehicle_count, avg_queue_length, \
              avg_speed, avg_flow_rate, min_vehicle_count, max_vehicle_count, \
              stddev_vehicle_count, sample_count, last_updated) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
             ON CONFLICT(road_id, day_of_week, time_slot) DO UPDATE SET \
                 avg_vehicle_count = excluded.avg_vehicle_count, \
                 avg_queue_length = excluded.avg_queue_length, \
                 avg_speed = excluded.avg_speed, \
                 avg_flow_rate = excluded.avg_flow_rate, \
                 min_vehicle_count = excluded.min_vehicle_count, \
                 max_vehicle_count = excluded.max_vehicle_count, \
                 stddev_vehicle_count = excluded.stddev_vehicle_count, \
                 sample_count = excluded.sample_count, \
                 last_updated = excluded.last_updated",
            params![
                pattern.road.raw() as i64,
                pattern.day_of_week,
                pattern.time_slot,
                pattern.avg_vehicle_count,
                pattern.avg_queue_length,
                pattern.avg_speed,
                pattern.avg_flow_rate,
                pattern.min_vehicle_count,
                pattern.max_vehicle_count,
                pattern.stddev_vehicle_count,
                pattern.sample_count,
                pattern.last_updated,
            ],
        )?;
        Ok(())
    }

    // ── Pattern queries ───────────────────────────────────────────────────

    /// All patterns for one `(day-of-week, slot)` bucket.
    pub fn patterns_for_slot(
        &self,
        day_of_week: DayOfWeek,
        time_slot: TimeSlot,
    ) -> StorageResult<Vec<TrafficPattern>> {
        self.query_patterns(
            "WHERE day_of_week = ?1 AND time_slot = ?2",
            params![day_of_week, time_slot],
        )
    }

    /// Every pattern known for one road.
    pub fn patterns_for_road(&self, road: RoadId) -> StorageResult<Vec<TrafficPattern>> {
        self.query_patterns("WHERE road_id = ?1", params![road.raw() as i64])
    }

    /// The single pattern for an exact key, if present.
    pub fn pattern(
        &self,
        road: RoadId,
        day_of_week: DayOfWeek,
        time_slot: TimeSlot,
    ) -> StorageResult<Option<TrafficPattern>> {
        Ok(self
            .query_patterns(
                "WHERE road_id = ?1 AND day_of_week = ?2 AND time_slot = ?3",
                params![road.raw() as i64, day_of_week, time_slot],
            )?
            .into_iter()
            .next())
    }

    pub fn all_patterns(&self) -> StorageResult<Vec<TrafficPattern>> {
        self.query_patterns("", params![])
    }

    fn query_patterns(
        &self,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> StorageResult<Vec<TrafficPattern>> {
        let sql = format!(
            "SELECT road_id, day_of_week, time_slot, avg_vehicle_count, avg_queue_length, \
                    avg_speed, avg_flow_rate, min_vehicle_count, max_vehicle_count, \
                    stddev_vehicle_count, sample_count, last_updated \
             FROM traffic_patterns {filter} \
             ORDER BY road_id, day_of_week, time_slot"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(TrafficPattern {
                road: RoadId(row.get::<_, i64>(0)? as u64),
                day_of_week: row.get(1)?,
                time_slot: row.get(2)?,
                avg_vehicle_count: row.get(3)?,
                avg_queue_length: row.get(4)?,
                avg_speed: row.get(5)?,
                avg_flow_rate: row.get(6)?,
                min_vehicle_count: row.get(7)?,
                max_vehicle_count: row.get(8)?,
                stddev_vehicle_count: row.get(9)?,
                sample_count: row.get(10)?,
                last_updated: row.get(11)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    // ── Optimization runs & solutions ─────────────────────────────────────

    /// Persist a run record; the returned id keys its solutions.
    pub fn insert_run(&self, run: &OptimizationRun) -> StorageResult<RunId> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO optimization_runs \
             (status, started_at, completed_at, population_size, generations, \
              simulation_steps, baseline_fitness, best_fitness, improvement_percent) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run.status,
                run.started_at,
                run.completed_at,
                run.population_size,
                run.generations,
                run.simulation_steps,
                run.baseline_fitness,
                run.best_fitness,
                run.improvement_percent,
            ],
        )?;
        Ok(RunId(conn.last_insert_rowid()))
    }

    pub fn run(&self, id: RunId) -> StorageResult<Option<OptimizationRun>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, status, started_at, completed_at, population_size, generations, \
                    simulation_steps, baseline_fitness, best_fitness, improvement_percent \
             FROM optimization_runs WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id.raw()], |row| {
            Ok(OptimizationRun {
                id: RunId(row.get(0)?),
                status: row.get(1)?,
                started_at: row.get(2)?,
                completed_at: row.get(3)?,
                population_size: row.get(4)?,
                generations: row.get(5)?,
                simulation_steps: row.get(6)?,
                baseline_fitness: row.get(7)?,
                best_fitness: row.get(8)?,
                improvement_percent: row.get(9)?,
            })
        })?;
        Ok(rows.next().transpose()?)
    }

    /// Attach a chromosome to a run.
    pub fn insert_solution(
        &self,
        run: RunId,
        fitness: f64,
        chromosome_json: &str,
        light_count: u32,
        is_best: bool,
        created_at: i64,
    ) -> StorageResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO optimization_solutions \
             (run_id, fitness, chromosome_json, light_count, is_best, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run.raw(),
                fitness,
                chromosome_json,
                light_count,
                is_best,
                created_at
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // ── Profiles ──────────────────────────────────────────────────────────

    /// Insert or replace a profile by name.
    pub fn upsert_profile(&self, profile: &TrafficProfile) -> StorageResult<()> {
        self.conn().execute(
            "INSERT INTO traffic_profiles \
             (name, description, spawn_rates_json, light_timings_json, active, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(name) DO UPDATE SET \
                 description = excluded.description, \
                 spawn_rates_json = excluded.spawn_rates_json, \
                 light_timings_json = excluded.light_timings_json, \
                 active = excluded.active, \
                 created_at = excluded.created_at",
            params![
                profile.name,
                profile.description,
                profile.spawn_rates_json,
                profile.light_timings_json,
                profile.active,
                profile.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn profile(&self, name: &str) -> StorageResult<Option<TrafficProfile>> {
        Ok(self
            .query_profiles("WHERE name = ?1", params![name])?
            .into_iter()
            .next())
    }

    pub fn all_profiles(&self) -> StorageResult<Vec<TrafficProfile>> {
        self.query_profiles("", params![])
    }

    /// Flag `name` as the single active profile.
    pub fn activate_profile(&self, name: &str) -> StorageResult<bool> {
        let conn = self.conn();
        conn.execute("UPDATE traffic_profiles SET active = 0", [])?;
        let changed = conn.execute(
            "UPDATE traffic_profiles SET active = 1 WHERE name = ?1",
            params![name],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_profile(&self, name: &str) -> StorageResult<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM traffic_profiles WHERE name = ?1", params![name])?;
        Ok(deleted > 0)
    }

    fn query_profiles(
        &self,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> StorageResult<Vec<TrafficProfile>> {
        let sql = format!(
            "SELECT id, name, description, spawn_rates_json, light_timings_json, \
                    active, created_at \
             FROM traffic_profiles {filter} ORDER BY name"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(TrafficProfile {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                spawn_rates_json: row.get(3)?,
                light_timings_json: row.get(4)?,
                active: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// The best-flagged solution of a run.
    pub fn best_solution(&self, run: RunId) -> StorageResult<Option<StoredSolution>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, run_id, fitness, chromosome_json, light_count, is_best, created_at \
             FROM optimization_solutions \
             WHERE run_id = ?1 AND is_best = 1 ORDER BY fitness LIMIT 1",
        )?;
        let mut rows = stmt.query_map([run.raw()], |row| {
            Ok(StoredSolution {
                id: row.get(0)?,
                run: RunId(row.get(1)?),
                fitness: row.get(2)?,
                chromosome_json: row.get(3)?,
                light_count: row.get(4)?,
                is_best: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        Ok(rows.next().transpose()?)
    }
}
