//! Traffic lights — timed cyclic state machines.
//!
//! The cycle is strictly Green → Yellow → Red → Green.  The update is
//! check-then-advance: the counter is compared against the phase duration
//! *before* `dt` is added, so a light holds its phase for one extra tick
//! when `dt` overshoots the nominal duration.  Chromosome fitness is
//! evaluated against exactly these semantics, so the ordering must not
//! change.

use atc_core::SimRng;

/// Current color of a light.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LightPhase {
    Green,
    Yellow,
    Red,
}

impl LightPhase {
    /// The phase that follows this one in the cycle.
    #[inline]
    pub fn next(self) -> LightPhase {
        match self {
            LightPhase::Green => LightPhase::Yellow,
            LightPhase::Yellow => LightPhase::Red,
            LightPhase::Red => LightPhase::Green,
        }
    }

    /// Single-character code used by light-config queries ('G', 'Y', 'R').
    #[inline]
    pub fn code(self) -> char {
        match self {
            LightPhase::Green => 'G',
            LightPhase::Yellow => 'Y',
            LightPhase::Red => 'R',
        }
    }
}

/// One lane's traffic light.
#[derive(Clone, Debug)]
pub struct TrafficLight {
    phase: LightPhase,
    /// Seconds spent in the current phase so far.
    counter: f64,
    /// Durations indexed green, yellow, red.
    durations: [f64; 3],
}

impl TrafficLight {
    /// A light with the given durations, started at a uniformly random point
    /// of its cycle.
    ///
    /// Random phase offsets keep a fleet of lights from ticking in lockstep;
    /// synchronized fleets push the optimizer into a pathological regime, so
    /// this is a correctness requirement rather than cosmetics.
    pub fn new(green: f64, yellow: f64, red: f64, rng: &mut SimRng) -> TrafficLight {
        let cycle = green + yellow + red;
        let offset = if cycle > 0.0 {
            rng.gen_range(0.0..cycle)
        } else {
            0.0
        };
        let (phase, counter) = if offset < green {
            (LightPhase::Green, offset)
        } else if offset < green + yellow {
            (LightPhase::Yellow, offset - green)
        } else {
            (LightPhase::Red, offset - green - yellow)
        };
        TrafficLight {
            phase,
            counter,
            durations: [green, yellow, red],
        }
    }

    /// A light pinned to a known phase and counter (tests, profiles).
    pub fn fixed(green: f64, yellow: f64, red: f64, phase: LightPhase, counter: f64) -> TrafficLight {
        TrafficLight {
            phase,
            counter,
            durations: [green, yellow, red],
        }
    }

    /// Advance by `dt` seconds: check-then-advance (see module docs).
    pub fn update(&mut self, dt: f64) {
        if self.counter >= self.durations[self.phase as usize] {
            self.counter = 0.0;
            self.phase = self.phase.next();
        }
        self.counter += dt;
    }

    /// Install new durations without resetting phase or counter, so the
    /// light runs smoothly through a timing transition.
    pub fn set_timings(&mut self, green: f64, yellow: f64, red: f64) {
        self.durations = [green, yellow, red];
    }

    /// Seconds left before the current phase may advance.
    pub fn remaining_in_phase(&self) -> f64 {
        self.durations[self.phase as usize] - self.counter
    }

    #[inline]
    pub fn phase(&self) -> LightPhase {
        self.phase
    }

    #[inline]
    pub fn is_green(&self) -> bool {
        self.phase == LightPhase::Green
    }

    #[inline]
    pub fn is_yellow(&self) -> bool {
        self.phase == LightPhase::Yellow
    }

    #[inline]
    pub fn is_red(&self) -> bool {
        self.phase == LightPhase::Red
    }

    #[inline]
    pub fn green_time(&self) -> f64 {
        self.durations[0]
    }

    #[inline]
    pub fn yellow_time(&self) -> f64 {
        self.durations[1]
    }

    #[inline]
    pub fn red_time(&self) -> f64 {
        self.durations[2]
    }
}
