//! Calendar arithmetic on Unix seconds.
//!
//! # Design
//!
//! Traffic patterns are keyed by `(day_of_week, time_slot)` where a slot is a
//! half-hour bucket (`hour * 2 + minute / 30`, 0–47).  Both values are read
//! off the host's **local** wall clock: a snapshot recorded at 08:10 local
//! time lands in the 08:00–08:30 bucket wherever the simulator runs, which
//! is what "time of day" means for traffic.  The timezone conversion comes
//! from `chrono`; the bucket math itself lives in the `*_at` variants, which
//! take an explicit UTC offset and stay pure integer arithmetic (the epoch
//! fell on a Thursday) for deterministic replay and tests.
//!
//! Recording and prediction agree on the derivation by both calling into
//! this module.
//!
//! Wall-clock time (this module) and monotonic time (`std::time::Instant`,
//! used for timing transitions) are distinct clocks and are never mixed.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Offset, TimeZone};

/// Day of week, 0 = Sunday through 6 = Saturday.
pub type DayOfWeek = u8;

/// Half-hour bucket of the day, 0 = 00:00–00:30 through 47 = 23:30–24:00.
pub type TimeSlot = u8;

const SECS_PER_DAY: i64 = 86_400;

/// Current Unix timestamp in seconds.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The host timezone's UTC offset at `unix`, in seconds (DST-aware).
pub fn local_offset_secs(unix: i64) -> i32 {
    chrono::Local
        .timestamp_opt(unix, 0)
        .single()
        .map_or(0, |dt| dt.offset().fix().local_minus_utc())
}

/// Day of week on the host's local clock (0 = Sunday).
pub fn day_of_week(unix: i64) -> DayOfWeek {
    day_of_week_at(unix, local_offset_secs(unix))
}

/// Half-hour slot of the host's local day.
pub fn time_slot(unix: i64) -> TimeSlot {
    time_slot_at(unix, local_offset_secs(unix))
}

/// Both bucket coordinates at once, on the host's local clock.
pub fn day_and_slot(unix: i64) -> (DayOfWeek, TimeSlot) {
    day_and_slot_at(unix, local_offset_secs(unix))
}

/// Day of week at an explicit UTC offset.
pub fn day_of_week_at(unix: i64, offset_secs: i32) -> DayOfWeek {
    let local = unix + i64::from(offset_secs);
    ((local.div_euclid(SECS_PER_DAY) + 4).rem_euclid(7)) as DayOfWeek
}

/// Half-hour slot at an explicit UTC offset.
pub fn time_slot_at(unix: i64, offset_secs: i32) -> TimeSlot {
    let local = unix + i64::from(offset_secs);
    let secs = local.rem_euclid(SECS_PER_DAY);
    let hour = secs / 3_600;
    let minute = (secs % 3_600) / 60;
    (hour * 2 + minute / 30) as TimeSlot
}

/// Both bucket coordinates at an explicit UTC offset.
#[inline]
pub fn day_and_slot_at(unix: i64, offset_secs: i32) -> (DayOfWeek, TimeSlot) {
    (
        day_of_week_at(unix, offset_secs),
        time_slot_at(unix, offset_secs),
    )
}

/// Human-readable slot range, e.g. `"08:00-08:30"`.
///
/// Returns `"invalid"` for out-of-range slots.
pub fn slot_label(slot: TimeSlot) -> String {
    if slot > 47 {
        return "invalid".to_owned();
    }
    let start_hour = slot / 2;
    let start_min = (slot % 2) * 30;
    let (end_hour, end_min) = if start_min == 30 {
        ((start_hour + 1) % 24, 0)
    } else {
        (start_hour, 30)
    };
    format!("{start_hour:02}:{start_min:02}-{end_hour:02}:{end_min:02}")
}
