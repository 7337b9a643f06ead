//! Strongly typed, zero-cost identifier wrappers.
//!
//! All IDs are `Copy + Ord + Hash` so they can be used as map keys and sorted
//! collection elements without ceremony.  `RoadId` and `VehicleId` are issued
//! from process-wide atomic counters: road updates run on Rayon workers, and
//! a freshly spawned vehicle must never collide with one spawned on another
//! thread.  Allocated ids are never reused within a process.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generate a typed ID wrapper around a primitive integer.
macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        $vis struct $name(pub $inner);

        impl $name {
            /// The raw integer value, for storage rows and wire formats.
            #[inline(always)]
            pub fn raw(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<$inner> for $name {
            #[inline(always)]
            fn from(raw: $inner) -> Self {
                $name(raw)
            }
        }
    };
}

typed_id! {
    /// Identifier of a one-way road segment.  Issued by [`RoadId::next`].
    pub struct RoadId(u64);
}

typed_id! {
    /// Identifier of a vehicle (or sentinel element).  Issued by
    /// [`VehicleId::next`].
    pub struct VehicleId(u64);
}

typed_id! {
    /// Identifier of a registered origin/destination pair.
    pub struct OdPairId(u32);
}

typed_id! {
    /// Row id of a persisted optimization run.
    pub struct RunId(i64);
}

static NEXT_ROAD_ID: AtomicU64 = AtomicU64::new(0);
static NEXT_VEHICLE_ID: AtomicU64 = AtomicU64::new(0);

impl RoadId {
    /// Allocate the next road id from the process-wide counter.
    pub fn next() -> RoadId {
        RoadId(NEXT_ROAD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl VehicleId {
    /// Allocate the next vehicle id from the process-wide counter.
    ///
    /// Safe to call from Rayon workers during the parallel road phase.
    pub fn next() -> VehicleId {
        VehicleId(NEXT_VEHICLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}
