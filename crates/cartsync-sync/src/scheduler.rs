//! Periodic timer and service lifecycle around the coordinator.

use std::sync::Arc;
use std::time::Duration;

use cartsync_cdp::RemoteControl;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinator::{SyncCoordinator, Trigger, TriggerOutcome};

/// Default bound on waiting for a running cycle during shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Trigger a cycle every `period` until `cancel` fires.
///
/// The first tick is one full period after start. Ticks missed while a
/// cycle runs are not replayed.
pub async fn run_timer(coordinator: Arc<SyncCoordinator>, period: Duration, cancel: CancellationToken) {
    let mut ticks = time::interval_at(time::Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("sync timer stopped");
                return;
            }
            _ = ticks.tick() => {
                if let TriggerOutcome::Coalesced = coordinator.trigger(Trigger::Timer).await {
                    debug!("timer tick coalesced into running cycle");
                }
            }
        }
    }
}

/// Running sync: the coordinator, its timer and teardown.
pub struct SyncService {
    coordinator: Arc<SyncCoordinator>,
    remote: Arc<dyn RemoteControl>,
    shutdown: CancellationToken,
    timer: JoinHandle<()>,
}

impl SyncService {
    /// Spawn the timer. `shutdown` must be the token the coordinator and the
    /// remote client were built with.
    pub fn start(
        coordinator: Arc<SyncCoordinator>,
        remote: Arc<dyn RemoteControl>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let timer = tokio::spawn(run_timer(Arc::clone(&coordinator), period, shutdown.clone()));
        info!(period_secs = period.as_secs(), "sync timer started");
        Self {
            coordinator,
            remote,
            shutdown,
            timer,
        }
    }

    /// The coordinator driven by this service.
    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    /// Run a cycle now, or coalesce into the running one.
    pub async fn sync_now(&self) -> TriggerOutcome {
        self.coordinator.trigger(Trigger::Manual).await
    }

    /// Fire-and-forget variant of [`Self::sync_now`].
    pub fn request_sync(&self) -> JoinHandle<TriggerOutcome> {
        let coordinator = Arc::clone(&self.coordinator);
        tokio::spawn(async move { coordinator.trigger(Trigger::Manual).await })
    }

    /// Cancel the timer, let a running cycle reach its next checkpoint, then
    /// close the remote connection.
    pub async fn shutdown(self, timeout: Option<Duration>) {
        let Self {
            coordinator,
            remote,
            shutdown,
            timer,
        } = self;
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        shutdown.cancel();

        let drain = async {
            let _ = timer.await;
            coordinator.wait_idle().await;
        };
        if time::timeout(timeout, drain).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, abandoning running cycle");
        }

        remote.disconnect().await;
        info!("sync service stopped");
    }
}
