//! Cancellable fixed-period ticker for live capture.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Background task calling `on_tick` once per period until cancelled.
///
/// The first tick fires one full period after [`PeriodicTicker::spawn`];
/// ticks missed while the runtime was busy are skipped, not replayed.
#[derive(Debug)]
pub struct PeriodicTicker {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PeriodicTicker {
    /// Starts ticking. `on_tick` returning `false` stops the ticker.
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        if !on_tick() {
                            break;
                        }
                    }
                }
            }
        });

        Self { token, task }
    }

    /// Stops future ticks. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the ticker task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PeriodicTicker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
