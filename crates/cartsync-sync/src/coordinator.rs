//! Sync coordinator: one gated entry point running read, reconcile, apply
//! and emit.
//!
//! At most one cycle runs at a time. A trigger that arrives while a cycle is
//! running sets a single re-run flag instead of queueing; the running caller
//! performs that one extra cycle before releasing the gate.
//!
//! Local entries the remote side has already settled (ticked on the page, or
//! completed locally and gone remotely) are cleared before reconciling.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use cartsync_cdp::{ErrorTier, ListAccess, RemoteControl, RemoteError};
use cartsync_core::{FailureKind, ReconcilePlan, Side, Snapshot, SyncFailure, SyncResult, reconcile};
use chrono::Utc;
use metrics::{counter, histogram};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::store::{LocalStore, StoreError, local_snapshot, settle_local};

/// What asked for a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// The periodic timer.
    Timer,
    /// An on-demand "sync now".
    Manual,
    /// The first cycle after start.
    Startup,
    /// A trigger coalesced while another cycle ran.
    Rerun,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timer => "timer",
            Self::Manual => "manual",
            Self::Startup => "startup",
            Self::Rerun => "rerun",
        })
    }
}

/// Coordinator phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No cycle running.
    #[default]
    Idle,
    /// A cycle holds the gate.
    Syncing,
}

/// What a call to [`SyncCoordinator::trigger`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// This caller ran the cycle (plus any coalesced re-run); the last
    /// result is attached.
    Completed(SyncResult),
    /// Another cycle was running; a re-run was requested instead.
    Coalesced,
}

/// Orchestrates sync cycles between the remote list and the local store.
pub struct SyncCoordinator {
    remote: Arc<dyn RemoteControl>,
    list: Arc<dyn ListAccess>,
    store: Arc<dyn LocalStore>,
    gate: Mutex<()>,
    rerun: AtomicBool,
    phase: RwLock<Phase>,
    last: RwLock<Option<SyncResult>>,
    results: broadcast::Sender<SyncResult>,
    cancel: CancellationToken,
}

impl SyncCoordinator {
    /// Create a coordinator over its three collaborators.
    pub fn new(remote: Arc<dyn RemoteControl>, list: Arc<dyn ListAccess>, store: Arc<dyn LocalStore>) -> Self {
        let (results, _) = broadcast::channel(32);
        Self {
            remote,
            list,
            store,
            gate: Mutex::new(()),
            rerun: AtomicBool::new(false),
            phase: RwLock::new(Phase::Idle),
            last: RwLock::new(None),
            results,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` as the teardown signal checked between remote calls.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Receive every emitted [`SyncResult`].
    pub fn subscribe(&self) -> broadcast::Receiver<SyncResult> {
        self.results.subscribe()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        *self.phase.read()
    }

    /// Result of the most recent cycle.
    pub fn last_result(&self) -> Option<SyncResult> {
        self.last.read().clone()
    }

    /// Whether a re-run is pending.
    pub fn rerun_pending(&self) -> bool {
        self.rerun.load(Ordering::SeqCst)
    }

    /// Wait until no cycle holds the gate.
    pub async fn wait_idle(&self) {
        drop(self.gate.lock().await);
    }

    /// Gated entry point shared by the timer and manual requests.
    pub async fn trigger(&self, trigger: Trigger) -> TriggerOutcome {
        let mut current = trigger;
        let mut last = None;
        loop {
            let gate = match self.gate.try_lock() {
                Ok(gate) => gate,
                // A later holder clears the flag when it starts; its cycle
                // covers our pending re-run.
                Err(_) if last.is_some() => break,
                Err(_) => {
                    self.rerun.store(true, Ordering::SeqCst);
                    // The holder may have checked the flag and released the
                    // gate just before the store.
                    match self.gate.try_lock() {
                        Ok(gate) => gate,
                        Err(_) => {
                            counter!("sync_triggers_coalesced_total").increment(1);
                            debug!(%trigger, "cycle in progress, re-run requested");
                            return TriggerOutcome::Coalesced;
                        }
                    }
                }
            };
            self.rerun.store(false, Ordering::SeqCst);
            last = Some(self.run_cycle(current).await);
            drop(gate);

            if self.cancel.is_cancelled() || !self.rerun.load(Ordering::SeqCst) {
                break;
            }
            current = Trigger::Rerun;
        }
        match last {
            Some(result) => TriggerOutcome::Completed(result),
            None => TriggerOutcome::Coalesced,
        }
    }

    async fn run_cycle(&self, trigger: Trigger) -> SyncResult {
        let cycle_id = Uuid::now_v7();
        let span = info_span!("sync_cycle", %cycle_id, %trigger);
        *self.phase.write() = Phase::Syncing;
        let started = Instant::now();

        let result = self.cycle().instrument(span).await;

        *self.phase.write() = Phase::Idle;
        histogram!("sync_cycle_duration_seconds").record(started.elapsed().as_secs_f64());
        let status = if result.success { "success" } else { "failure" };
        counter!("sync_cycles_total", "status" => status).increment(1);

        *self.last.write() = Some(result.clone());
        let _ = self.results.send(result.clone());
        result
    }

    async fn cycle(&self) -> SyncResult {
        info!("sync cycle started");

        // Local first, so a connection failure still reports the local count.
        let entries = match self.store.list_items().await {
            Ok(entries) => entries,
            Err(e) => return self.finish_failed(store_failure(&e), 0, 0),
        };
        let local_count = entries.len();

        if let Err(e) = self.remote.ensure_connected().await {
            return self.finish_failed(remote_failure(&e), 0, local_count);
        }
        if self.cancel.is_cancelled() {
            return self.finish_failed(cancelled(), 0, local_count);
        }

        let (remote, ticked) = match self.list.read_list().await {
            Ok(listed) => (Snapshot::capture(Side::Remote, listed.open), listed.ticked),
            Err(e) => return self.finish_failed(remote_failure(&e), 0, local_count),
        };
        // Entries already done on either side are cleared, never reconciled.
        let (entries, settled) = settle_local(&entries, &remote, &ticked);
        let (local, completed) = local_snapshot(&entries);
        let plan = reconcile(&remote, &local, &completed);
        info!(
            remote = remote.len(),
            ticked = ticked.len(),
            local = local.len(),
            completed = completed.len(),
            settled = settled.len(),
            local_adds = plan.local_adds.len(),
            remote_adds = plan.remote_adds.len(),
            remote_removes = plan.remote_removes.len(),
            "reconciled"
        );

        let changed = !plan.is_empty() || !settled.is_empty();
        let mut outcome = Applied {
            cleared: settled,
            ..Applied::default()
        };
        self.apply_remote(&plan, &mut outcome).await;
        if !outcome.cancelled {
            self.apply_local(&plan, &mut outcome).await;
        }

        let remote_count = self.remote_count_after(&remote, &outcome).await;
        let local_count = match self.store.list_items().await {
            Ok(entries) => entries.len(),
            Err(e) => {
                outcome.fail(store_failure(&e));
                local_count
            }
        };

        let failure = outcome.primary_failure();
        let result = SyncResult {
            success: failure.is_none(),
            changed,
            added: outcome.added,
            removed: outcome.removed,
            remote_count,
            local_count,
            connected: self.remote.state().is_connected(),
            timestamp: Utc::now(),
            error: failure,
        };
        match &result.error {
            None => info!(
                changed = result.changed,
                added = result.added.len(),
                removed = result.removed.len(),
                "sync cycle completed"
            ),
            Some(f) => warn!(
                kind = %f.kind,
                failures = outcome.failures.len(),
                added = result.added.len(),
                removed = result.removed.len(),
                "sync cycle completed with failures"
            ),
        }
        result
    }

    /// Remote adds, then remote removes. Each mutation stands alone; only a
    /// connection loss, a login wall or teardown stops the rest.
    async fn apply_remote(&self, plan: &ReconcilePlan, out: &mut Applied) {
        for name in &plan.remote_adds {
            if self.stop_before_remote_call(out) {
                return;
            }
            match self.list.add_item(name).await {
                Ok(()) => {
                    out.added.push(name.clone());
                    out.added_remote += 1;
                }
                Err(e) => out.remote_error("add", name, &e),
            }
        }
        for name in &plan.remote_removes {
            if self.stop_before_remote_call(out) {
                return;
            }
            match self.list.remove_item(name).await {
                Ok(true) => {
                    out.removed.push(name.clone());
                    out.cleared.push(name.clone());
                }
                Ok(false) => {
                    debug!(item = %name, "already gone from remote list");
                    out.cleared.push(name.clone());
                }
                Err(e) => out.remote_error("remove", name, &e),
            }
        }
    }

    fn stop_before_remote_call(&self, out: &mut Applied) -> bool {
        if self.cancel.is_cancelled() {
            if !out.cancelled {
                out.cancelled = true;
                out.fail(cancelled());
            }
            return true;
        }
        out.remote_halted
    }

    /// Local adds from the remote snapshot, then clearing of settled entries
    /// and of entries whose remote removal went through.
    async fn apply_local(&self, plan: &ReconcilePlan, out: &mut Applied) {
        for name in &plan.local_adds {
            match self.store.add_item(name).await {
                Ok(()) => out.added.push(name.clone()),
                Err(e) => {
                    warn!(item = %name, error = %e, "local add failed");
                    out.fail(store_failure(&e));
                }
            }
        }
        let cleared = std::mem::take(&mut out.cleared);
        for name in &cleared {
            if let Err(e) = self.store.remove_item(name).await {
                warn!(item = %name, error = %e, "clearing completed local entry failed");
                out.fail(store_failure(&e));
            }
        }
    }

    /// Fresh remote count when the page was mutated and is still reachable;
    /// otherwise an estimate from the snapshot.
    async fn remote_count_after(&self, before: &Snapshot, out: &Applied) -> usize {
        let mutated = out.added_remote > 0 || !out.removed.is_empty();
        if mutated && !out.remote_halted && !out.cancelled {
            match self.list.read_items().await {
                Ok(items) => return items.len(),
                Err(e) => debug!(error = %e, "recount failed, estimating"),
            }
        }
        (before.len() + out.added_remote).saturating_sub(out.removed.len())
    }

    fn finish_failed(&self, failure: SyncFailure, remote_count: usize, local_count: usize) -> SyncResult {
        log_failure(&failure);
        SyncResult::failed(failure, remote_count, local_count, self.remote.state().is_connected())
    }
}

/// Mutations that went through during one cycle.
#[derive(Default)]
struct Applied {
    added: Vec<String>,
    added_remote: usize,
    removed: Vec<String>,
    cleared: Vec<String>,
    failures: Vec<SyncFailure>,
    remote_halted: bool,
    cancelled: bool,
}

impl Applied {
    fn fail(&mut self, failure: SyncFailure) {
        self.failures.push(failure);
    }

    fn remote_error(&mut self, op: &str, name: &str, e: &RemoteError) {
        let failure = remote_failure(e);
        match e.tier() {
            ErrorTier::Page => warn!(op, item = %name, error = %e, "remote mutation failed"),
            ErrorTier::Connection | ErrorTier::Authentication => {
                log_failure(&failure);
                self.remote_halted = true;
            }
        }
        self.fail(failure);
    }

    /// The failure reported in the result: a login wall wins, then the first.
    fn primary_failure(&self) -> Option<SyncFailure> {
        self.failures
            .iter()
            .find(|f| f.kind.needs_human())
            .or_else(|| self.failures.first())
            .cloned()
    }
}

fn remote_failure(e: &RemoteError) -> SyncFailure {
    SyncFailure::new(e.kind(), e.to_string())
}

fn store_failure(e: &StoreError) -> SyncFailure {
    SyncFailure::new(FailureKind::LocalStore, e.to_string())
}

fn cancelled() -> SyncFailure {
    SyncFailure::new(FailureKind::Cancelled, "cycle interrupted by shutdown")
}

fn log_failure(failure: &SyncFailure) {
    match failure.kind {
        FailureKind::AuthenticationRequired => error!(
            kind = %failure.kind,
            message = %failure.message,
            "sign-in required on the list page, human action required"
        ),
        FailureKind::Cancelled => info!(message = %failure.message, "sync cycle cancelled"),
        _ => warn!(kind = %failure.kind, message = %failure.message, "sync cycle failed"),
    }
}
