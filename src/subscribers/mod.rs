//! # Restart notification plumbing.
//!
//! This module provides the per-target fan-out used by the
//! [`Registry`](crate::Registry) and the types subscribers hold.
//!
//! ## Architecture
//! ```text
//! Monitor poll loop ── restart detected ──► Registry::notify(t)
//!                                               │
//!                                               ▼
//!                                        Subscribers (of t)
//!                                     ┌─────────┼──────────┐
//!                                     ▼         ▼          ▼
//!                              Subscription  Subscription  global stream
//!                               (direct #1)   (direct #2)   (all targets,
//!                                                            tagged with t)
//! ```
//!
//! ## Contents
//! - [`RestartNotice`] the message, tagged with the target identity
//! - [`Subscription`]  read side of one direct channel
//! - `Subscribers`     crate-private per-target set (direct + global)

mod notice;
mod set;
mod subscription;

pub use notice::RestartNotice;
pub(crate) use set::Subscribers;
pub use subscription::Subscription;
