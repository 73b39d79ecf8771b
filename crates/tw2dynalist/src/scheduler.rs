//! Fixed-interval task runner.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Handle that stops a running [`Scheduler`] from another task.
#[derive(Debug, Clone)]
pub struct StopHandle(CancellationToken);

impl StopHandle {
    pub fn stop(&self) {
        self.0.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Runs a task once immediately and then once per interval.
///
/// The task is awaited inline: a slow run delays the next one instead of
/// overlapping it, and missed ticks are not replayed.
#[derive(Debug)]
pub struct Scheduler {
    interval: Duration,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            cancel: CancellationToken::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.cancel.clone())
    }

    /// Stop the loop. A run in progress finishes first.
    pub fn stop(&self) {
        info!("Stopping scheduler");
        self.cancel.cancel();
    }

    /// Drive `task` until stopped.
    pub async fn run<F, Fut>(&self, mut task: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        info!(interval = ?self.interval, "Scheduler started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            debug!("Scheduler tick");
            task().await;
        }

        info!("Scheduler stopped");
    }
}
