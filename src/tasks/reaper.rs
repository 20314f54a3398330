//! Expiration Reaper
//!
//! Background task that periodically removes expired entries from a store.

use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Something the reaper can sweep.
#[async_trait]
pub trait Reap: Send + Sync + 'static {
    /// Short name used in log lines.
    fn label(&self) -> &'static str;

    /// Removes expired entries, returning how many were removed.
    async fn reap(&self) -> usize;
}

/// Spawns a background task that sweeps `target` every `interval`.
///
/// The task holds only a weak reference, so it never keeps the store alive.
/// It exits when:
/// - `true` is sent on the shutdown channel
/// - the shutdown sender is dropped
/// - the target has been dropped
///
/// # Example
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = spawn_reaper(Arc::downgrade(&shared), Duration::from_secs(1), shutdown_rx);
/// // Later:
/// shutdown_tx.send(true).ok();
/// ```
pub fn spawn_reaper<T: Reap>(
    target: Weak<T>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting expiration reaper with interval of {} ms",
            interval.as_millis()
        );

        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; wait a full interval instead
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(target) = target.upgrade() else {
                        break;
                    };

                    let removed = target.reap().await;
                    if removed > 0 {
                        info!("{} reaper: removed {} expired entries", target.label(), removed);
                    } else {
                        debug!("{} reaper: no expired entries found", target.label());
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("Expiration reaper stopped");
    })
}
