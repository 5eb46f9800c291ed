//! Retry policies.
//!
//! This module groups the knobs that control **how long** a supervising loop
//! waits between connection attempts.
//!
//! ## Contents
//! - [`BackoffPolicy`] ramp length, plateau window, reset window
//! - [`Backoff`]       per-connection state driven by `wait()` / `success()`
//! - [`Jitter`]        randomization of plateau waits
//!
//! ## Quick wiring
//! ```text
//! CollectorConfig::backoff_policy() ──► Backoff::new(policy)
//!      └─► connector loop:
//!           - backoff.wait() before each open/probe attempt
//!           - backoff.success() once the connection is usable
//! ```

mod backoff;
mod jitter;

pub use backoff::{Backoff, BackoffPolicy};
pub use jitter::Jitter;
