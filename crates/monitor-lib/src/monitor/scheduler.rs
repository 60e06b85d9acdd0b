//! Monitor loop task
//!
//! Ticks on a fixed period and dispatches one evaluation per monitored model.
//! The loop holds only a weak reference to the service, so dropping the
//! service also ends the loop.

use std::sync::Weak;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::MonitorService;

/// Running loop task and its shutdown channel
pub(crate) struct SchedulerHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal shutdown and wait for the loop to exit
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "Monitor loop task failed");
        }
    }
}

/// Spawn the loop; the first tick fires one period from now
pub(crate) fn spawn(service: Weak<MonitorService>, tick: Duration) -> SchedulerHandle {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(run(service, tick.max(Duration::from_millis(1)), shutdown_rx));
    SchedulerHandle { shutdown_tx, task }
}

async fn run(service: Weak<MonitorService>, tick: Duration, mut shutdown: broadcast::Receiver<()>) {
    info!(tick_ms = tick.as_millis() as u64, "Starting monitor loop");

    let mut ticker = interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick_count = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(service) = service.upgrade() else {
                    debug!("Monitor service dropped, leaving loop");
                    break;
                };

                // Evaluations run detached; a slow model is reported on the next tick
                let tasks = service.dispatch_tick(Utc::now()).await;
                tick_count += 1;
                debug!(tick = tick_count, dispatched = tasks.len(), "Monitor tick dispatched");
            }
            _ = shutdown.recv() => {
                info!(ticks = tick_count, "Shutting down monitor loop");
                break;
            }
        }
    }
}
