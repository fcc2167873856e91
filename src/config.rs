//! High-level configuration of the optimiser in terms of allowed digital gains.

use std::ops::RangeInclusive;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimiserConfiguration {
    /// Bitshifts the QT electronics accept, in ascending order.
    pub bitshifts: RangeInclusive<i32>,
    /// Channels currently at one of these bitshifts are never modified.
    pub locked_bitshifts: Vec<i32>,
}

impl Default for OptimiserConfiguration {
    fn default() -> Self {
        Self {
            bitshifts: -5..=5,
            locked_bitshifts: vec![-5],
        }
    }
}

impl OptimiserConfiguration {
    pub fn is_locked(&self, bitshift: i32) -> bool {
        self.locked_bitshifts.contains(&bitshift)
    }

    pub fn min_bitshift(&self) -> i32 {
        *self.bitshifts.start()
    }

    pub fn max_bitshift(&self) -> i32 {
        *self.bitshifts.end()
    }
}
