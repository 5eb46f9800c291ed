//! # Reconnection backoff.
//!
//! [`BackoffPolicy`] holds the tunables, [`Backoff`] the per-connection state.
//! A supervising loop calls [`Backoff::wait`] before every connection attempt
//! and [`Backoff::success`] once a connection is usable.
//!
//! With the default policy the waits are:
//! ```text
//! call:  0    1    2    3    4     5     6     7..
//! wait:  0s   1s   3s   7s   15s   31s   63s   [90s, 180s) jittered
//! ```
//! Call `n` of the ramp waits `2^n − 1` seconds. After the ramp the attempt
//! counter saturates and each wait is drawn from the plateau window.
//!
//! # Reset rule
//! The first success only records its time. A later success resets the
//! counter when at least `reset_after` has elapsed since the recorded one; a
//! flapping endpoint therefore keeps its accumulated backoff.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use dbsentry::{Backoff, BackoffPolicy};
//!
//! let mut backoff = Backoff::new(BackoffPolicy::default());
//! assert_eq!(backoff.wait(), Duration::ZERO);
//! assert_eq!(backoff.wait(), Duration::from_secs(1));
//! assert_eq!(backoff.wait(), Duration::from_secs(3));
//! ```

use std::time::Duration;
use tokio::time::Instant;

use crate::policies::jitter::Jitter;

/// Tunables of a [`Backoff`].
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Number of calls covered by the exponential ramp (call 0 included).
    pub ramp: u32,
    /// Lower bound of the plateau window.
    pub floor: Duration,
    /// Upper bound (exclusive) of the plateau window.
    pub ceiling: Duration,
    /// Randomization of plateau waits.
    pub jitter: Jitter,
    /// Minimum spacing of two successes for the second to reset the counter.
    pub reset_after: Duration,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `ramp = 7` (0s, 1s, 3s, 7s, 15s, 31s, 63s);
    /// - plateau `[90s, 180s)` with uniform jitter;
    /// - `reset_after = 5s`.
    fn default() -> Self {
        Self {
            ramp: 7,
            floor: Duration::from_secs(90),
            ceiling: Duration::from_secs(180),
            jitter: Jitter::Uniform,
            reset_after: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    /// Same policy with a different reset window.
    pub fn with_reset_after(mut self, reset_after: Duration) -> Self {
        self.reset_after = reset_after;
        self
    }
}

/// Per-connection backoff state.
///
/// Owned by exactly one supervising loop; methods take `&mut self` and there
/// is no internal locking.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    last_success: Option<Instant>,
}

impl Backoff {
    /// Creates a fresh state (next wait is zero).
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            last_success: None,
        }
    }

    /// Returns how long to wait before the next attempt and advances the counter.
    pub fn wait(&mut self) -> Duration {
        let ramp = self.policy.ramp.min(63);
        if self.attempt == 0 {
            self.attempt = 1;
            Duration::ZERO
        } else if self.attempt < ramp {
            let secs = (1u64 << self.attempt) - 1;
            self.attempt += 1;
            Duration::from_secs(secs)
        } else {
            self.policy
                .jitter
                .sample(self.policy.floor, self.policy.ceiling)
        }
    }

    /// Records a successful connection.
    pub fn success(&mut self) {
        let now = Instant::now();
        match self.last_success {
            None => self.last_success = Some(now),
            Some(prev) if now.duration_since(prev) >= self.policy.reset_after => {
                self.last_success = Some(now);
                self.attempt = 0;
            }
            Some(_) => {}
        }
    }

    /// Current value of the attempt counter.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The policy this state was built from.
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}
