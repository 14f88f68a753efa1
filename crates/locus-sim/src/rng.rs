use serde::{Deserialize, Serialize};

/// Tiny deterministic RNG used by the simulator.
///
/// Reproducible across platforms, so a seed always replays the same run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    /// Derive an independent stream, e.g. one per remote writer.
    #[must_use]
    pub fn fork(&mut self) -> Self {
        Self::new(self.next_u64())
    }

    #[must_use]
    pub const fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.state
    }

    /// Next value in `[0, upper_exclusive)`.
    #[must_use]
    pub const fn next_bounded(&mut self, upper_exclusive: u64) -> u64 {
        if upper_exclusive == 0 {
            return 0;
        }
        (self.next_u64() >> 16) % upper_exclusive
    }

    /// Uniform index into a non-empty slice length.
    #[must_use]
    pub fn next_index(&mut self, len: usize) -> usize {
        let bound = u64::try_from(len).unwrap_or(u64::MAX);
        usize::try_from(self.next_bounded(bound)).unwrap_or(0)
    }

    /// Value in `[-max_abs, max_abs]`.
    #[must_use]
    pub fn next_signed(&mut self, max_abs: i64) -> i64 {
        if max_abs <= 0 {
            return 0;
        }
        let span = max_abs.unsigned_abs().saturating_mul(2).saturating_add(1);
        let offset = i64::try_from(self.next_bounded(span)).unwrap_or(0);
        offset - max_abs
    }

    /// Position value with one decimal place in `[0, 100)`.
    #[must_use]
    pub fn next_pos(&mut self) -> f64 {
        let tenths = u32::try_from(self.next_bounded(1_000)).unwrap_or(0);
        f64::from(tenths) / 10.0
    }

    /// Bernoulli trial with integer percent.
    #[must_use]
    pub fn hit_rate_percent(&mut self, percent: u8) -> bool {
        if percent == 0 {
            return false;
        }
        if percent >= 100 {
            return true;
        }
        self.next_bounded(100) < u64::from(percent)
    }
}
