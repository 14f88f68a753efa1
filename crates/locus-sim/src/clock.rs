use locus_core::clock::Clock;
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

/// Configuration for generating per-participant simulated clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Base timestamp in milliseconds.
    pub base_millis: i64,
    /// Logical tick size in milliseconds per simulation round.
    pub tick_millis: i64,
    /// Maximum absolute drift in parts-per-million assigned per participant.
    pub max_abs_drift_ppm: i32,
    /// Maximum absolute skew in milliseconds assigned per participant.
    pub max_abs_skew_millis: i64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            base_millis: 1_700_000_000_000,
            tick_millis: 100,
            max_abs_drift_ppm: 100,
            max_abs_skew_millis: 250,
        }
    }
}

impl ClockConfig {
    /// The undrifted, unskewed clock the server runs on.
    #[must_use]
    pub const fn reference(&self) -> ClockSpec {
        ClockSpec {
            base_millis: self.base_millis,
            tick_millis: self.tick_millis,
            drift_ppm: 0,
            skew_millis: 0,
        }
    }

    /// Draw a skewed, drifting clock for a client or remote writer.
    #[must_use]
    pub fn assign(&self, rng: &mut DeterministicRng) -> ClockSpec {
        let drift = rng.next_signed(i64::from(self.max_abs_drift_ppm));
        ClockSpec {
            base_millis: self.base_millis,
            tick_millis: self.tick_millis,
            drift_ppm: i32::try_from(drift).unwrap_or(0),
            skew_millis: rng.next_signed(self.max_abs_skew_millis),
        }
    }
}

/// Concrete clock specification assigned from [`ClockConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSpec {
    pub base_millis: i64,
    pub tick_millis: i64,
    pub drift_ppm: i32,
    /// Constant offset from the reference clock.
    pub skew_millis: i64,
}

/// Simulated wall clock with drift, skew, and freeze controls.
///
/// Time is a function of the current round, which the simulator advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedClock {
    spec: ClockSpec,
    round: u64,
    frozen_at: Option<i64>,
}

impl SimulatedClock {
    #[must_use]
    pub const fn new(spec: ClockSpec) -> Self {
        Self {
            spec,
            round: 0,
            frozen_at: None,
        }
    }

    #[must_use]
    pub const fn spec(&self) -> ClockSpec {
        self.spec
    }

    pub const fn advance_to(&mut self, round: u64) {
        self.round = round;
    }

    /// Wall time in milliseconds at `round`, ignoring any freeze.
    #[must_use]
    pub fn millis_at(&self, round: u64) -> i64 {
        let round_i64 = i64::try_from(round).unwrap_or(i64::MAX);
        let base_progress = self.spec.tick_millis.saturating_mul(round_i64);
        let drift_adjust = base_progress
            .saturating_mul(i64::from(self.spec.drift_ppm))
            .saturating_div(1_000_000);

        self.spec
            .base_millis
            .saturating_add(self.spec.skew_millis)
            .saturating_add(base_progress)
            .saturating_add(drift_adjust)
    }

    /// Stop the clock at its current reading.
    pub fn freeze(&mut self) {
        self.frozen_at = Some(self.millis_at(self.round));
    }

    pub const fn unfreeze(&mut self) {
        self.frozen_at = None;
    }

    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.frozen_at.is_some()
    }
}

impl Clock for SimulatedClock {
    fn now_millis(&self) -> i64 {
        self.frozen_at.unwrap_or_else(|| self.millis_at(self.round))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(drift_ppm: i32, skew_millis: i64) -> ClockSpec {
        ClockSpec {
            base_millis: 1_000_000,
            tick_millis: 100,
            drift_ppm,
            skew_millis,
        }
    }

    #[test]
    fn advances_with_rounds() {
        let mut clock = SimulatedClock::new(spec(0, 0));
        assert_eq!(clock.now_millis(), 1_000_000);
        clock.advance_to(10);
        assert_eq!(clock.now_millis(), 1_001_000);
    }

    #[test]
    fn skew_and_drift_apply() {
        let mut clock = SimulatedClock::new(spec(100_000, -50));
        clock.advance_to(10);
        // 1000ms of progress plus 10% drift, minus 50ms skew.
        assert_eq!(clock.now_millis(), 1_001_050);
    }

    #[test]
    fn frozen_clock_holds_still() {
        let mut clock = SimulatedClock::new(spec(0, 0));
        clock.advance_to(3);
        clock.freeze();
        clock.advance_to(9);
        assert!(clock.is_frozen());
        assert_eq!(clock.now_millis(), 1_000_300);
        clock.unfreeze();
        assert_eq!(clock.now_millis(), 1_000_900);
    }

    #[test]
    fn assigned_specs_stay_in_bounds() {
        let config = ClockConfig::default();
        let mut rng = DeterministicRng::new(11);
        for _ in 0..100 {
            let spec = config.assign(&mut rng);
            assert!(spec.skew_millis.abs() <= config.max_abs_skew_millis);
            assert!(spec.drift_ppm.abs() <= config.max_abs_drift_ppm);
        }
    }
}
