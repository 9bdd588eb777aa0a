//! Background refresh of the cached shot counter.

use crate::protocol::{query_shots_count, QueryTiming};
use crate::LOG_TARGET;
use femtolab_core::serial::SharedPort;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Handle to the polling task.
///
/// Dropping the handle without [`Poller::stop`] also ends the task, since the
/// shutdown sender is dropped with it.
pub(crate) struct Poller {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Poller {
    /// Start polling `C?` every `period`, first tick one period from now.
    pub fn spawn(
        port: SharedPort,
        shots_count: Arc<AtomicI64>,
        timing: QueryTiming,
        period: Duration,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        // A tick always runs to completion; shutdown is only seen between ticks
                        let mut guard = port.lock().await;
                        match query_shots_count(&mut guard, timing).await {
                            Ok(count) => shots_count.store(count, Ordering::Release),
                            Err(e) => tracing::trace!(target: LOG_TARGET, "shot count poll failed: {}", e),
                        }
                    }
                }
            }
            tracing::debug!(target: LOG_TARGET, "shot count poller stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal the task and wait for its current tick to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            tracing::warn!(target: LOG_TARGET, "shot count poller ended abnormally: {}", e);
        }
    }
}
