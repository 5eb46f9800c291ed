//! # Tick source.
//!
//! [`Ticker::spawn`] drives a collector: it sends the current wall-clock time
//! every period. Ticks are offered with `try_send`, so a collector that falls
//! behind loses ticks instead of receiving a burst later.

use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Periodic tick source.
pub struct Ticker;

impl Ticker {
    /// Spawns the source; it ends when `token` is cancelled or the receiver is
    /// dropped.
    pub fn spawn(
        period: Duration,
        capacity: usize,
        token: CancellationToken,
    ) -> mpsc::Receiver<SystemTime> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let period = period.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match tx.try_send(SystemTime::now()) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                tracing::debug!(period = ?period, "tick dropped: receiver behind");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_then_closes_on_cancel() {
        let token = CancellationToken::new();
        let mut ticks = Ticker::spawn(Duration::from_secs(1), 1, token.clone());

        assert!(ticks.recv().await.is_some());
        assert!(ticks.recv().await.is_some());

        token.cancel();
        while ticks.recv().await.is_some() {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagging_receiver_loses_ticks() {
        let token = CancellationToken::new();
        let mut ticks = Ticker::spawn(Duration::from_secs(1), 1, token.clone());

        time::sleep(Duration::from_millis(5500)).await;
        assert!(ticks.try_recv().is_ok());
        assert!(ticks.try_recv().is_err());
        token.cancel();
    }
}
