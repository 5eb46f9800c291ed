//! # Jitter for the backoff plateau.
//!
//! Once the exponential ramp of a [`Backoff`](crate::Backoff) is exhausted,
//! every further wait is drawn from a fixed window so that many agents losing
//! the same database do not reconnect in lockstep.
//!
//! - [`Jitter::None`] always the window floor (predictable, for tests)
//! - [`Jitter::Uniform`] uniform in `[floor, ceiling)`

use rand::Rng;
use std::time::Duration;

/// Randomization applied to plateau waits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Jitter {
    /// No randomization: return `floor`.
    None,
    /// Uniform in `[floor, ceiling)`.
    #[default]
    Uniform,
}

impl Jitter {
    /// Draws a wait from `[floor, ceiling)`.
    ///
    /// An empty or inverted window collapses to `floor`.
    pub fn sample(&self, floor: Duration, ceiling: Duration) -> Duration {
        match self {
            Jitter::None => floor,
            Jitter::Uniform => {
                let lo = floor.as_millis() as u64;
                let hi = ceiling.as_millis() as u64;
                if lo >= hi {
                    return floor;
                }
                Duration::from_millis(rand::rng().random_range(lo..hi))
            }
        }
    }
}
