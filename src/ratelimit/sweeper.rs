//! Background eviction of idle counter records.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::limiter::RateLimiter;

/// A periodic task that evicts idle records from a [`RateLimiter`].
///
/// Eviction never changes admission decisions; it only bounds memory.
pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn a sweeper on the current tokio runtime.
    ///
    /// Every `interval` the sweeper calls
    /// [`RateLimiter::evict_expired`] with the clock's current time.
    pub fn spawn<C>(limiter: Arc<RateLimiter>, interval: Duration, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(interval = ?interval, "Starting counter sweeper");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.evict_expired(clock.now());
                        debug!(
                            evicted = evicted,
                            live = limiter.counter_count(),
                            "Sweep completed"
                        );
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Counter sweeper stopped");
        });

        Self { shutdown_tx, handle }
    }

    /// Stop the sweeper and wait for it to finish.
    pub async fn shutdown(self) {
        info!("Shutting down counter sweeper");
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Counter sweeper terminated abnormally");
        }
    }
}
