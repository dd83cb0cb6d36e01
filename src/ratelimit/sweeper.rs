//! Background eviction of expired admission records.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::limiter::RateLimiter;

/// Periodic job that calls [`RateLimiter::evict_expired`].
///
/// The job runs until [`Sweeper::shutdown`] is awaited or the handle is dropped.
pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Start sweeping `limiter` every `period`. Must be called inside a tokio runtime.
    pub fn spawn(limiter: Arc<RateLimiter>, period: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(period = ?period, "Eviction sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.evict_expired();
                        debug!(
                            evicted = evicted,
                            active_keys = limiter.active_keys(),
                            "Evicted expired admission records"
                        );
                    }
                    changed = shutdown_rx.changed() => {
                        // A dropped sender also stops the job
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Eviction sweeper stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the job and wait for it to finish its current pass.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}
