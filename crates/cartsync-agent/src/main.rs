//! # cartsync-agent
//!
//! Daemon binary: wires the remote client, list adapter, local store and
//! coordinator together, runs a startup sync and then the timer. Every
//! [`SyncResult`] is printed to stdout as one JSON line.
//!
//! Signals: `SIGHUP` requests a sync now; `Ctrl-C` / `SIGTERM` shut down.

#![deny(unsafe_code)]

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cartsync_cdp::{AmazonListSelectors, PageListAdapter, RemoteClient};
use cartsync_core::SyncResult;
use cartsync_core::logging::init_subscriber;
use cartsync_settings::{SyncSettings, load_settings_from_path, settings_path};
use cartsync_sync::{JsonFileStore, SyncCoordinator, SyncService, Trigger, TriggerOutcome};
use clap::Parser;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shopping list sync daemon.
#[derive(Parser, Debug)]
#[command(name = "cartsync-agent", about = "Keep a browser shopping list and a local list in sync")]
struct Cli {
    /// Settings file (default `~/.cartsync/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single cycle, print its result and exit.
    #[arg(long)]
    once: bool,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

/// Collaborators wired for one process.
struct App {
    remote: Arc<RemoteClient>,
    coordinator: Arc<SyncCoordinator>,
    shutdown: CancellationToken,
}

fn build(settings: &SyncSettings) -> App {
    let shutdown = CancellationToken::new();
    let remote = Arc::new(RemoteClient::with_cancel(settings.clone(), shutdown.clone()));
    let list = Arc::new(PageListAdapter::from_settings(
        remote.clone(),
        Arc::new(AmazonListSelectors::default()),
        &settings.remote,
    ));
    let store = Arc::new(JsonFileStore::new(&settings.store_path));
    let coordinator = Arc::new(SyncCoordinator::new(remote.clone(), list, store).with_cancel(shutdown.clone()));
    App {
        remote,
        coordinator,
        shutdown,
    }
}

fn print_result(out: &mut impl Write, result: &SyncResult) {
    let written = serde_json::to_string(result)
        .map_err(std::io::Error::from)
        .and_then(|line| writeln!(out, "{line}"));
    if let Err(e) = written {
        warn!(error = %e, "failed to write sync result");
    }
}

/// Write every result as a JSON line until `stop`, then drain whatever was
/// already broadcast.
async fn emit_results<W: Write>(mut rx: broadcast::Receiver<SyncResult>, stop: CancellationToken, mut out: W) -> W {
    loop {
        tokio::select! {
            biased;
            received = rx.recv() => match received {
                Ok(result) => print_result(&mut out, &result),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "result output fell behind"),
                Err(RecvError::Closed) => return out,
            },
            () = stop.cancelled() => break,
        }
    }
    loop {
        match rx.try_recv() {
            Ok(result) => print_result(&mut out, &result),
            Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "result output fell behind"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => return out,
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown(service: &SyncService) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut hup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("Failed to listen for ctrl-c")?;
                info!("interrupt received");
                return Ok(());
            }
            _ = term.recv() => {
                info!("SIGTERM received");
                return Ok(());
            }
            _ = hup.recv() => {
                info!("SIGHUP received, syncing now");
                drop(service.request_sync());
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_service: &SyncService) -> Result<()> {
    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    info!("interrupt received");
    Ok(())
}

async fn run_once(app: App) -> ExitCode {
    let outcome = app.coordinator.trigger(Trigger::Startup).await;
    app.remote.disconnect().await;
    match outcome {
        TriggerOutcome::Completed(result) => {
            print_result(&mut std::io::stdout(), &result);
            if result.success { ExitCode::SUCCESS } else { ExitCode::FAILURE }
        }
        TriggerOutcome::Coalesced => ExitCode::FAILURE,
    }
}

async fn run_daemon(app: App, period: Duration) -> Result<()> {
    let App {
        remote,
        coordinator,
        shutdown,
    } = app;

    let stop_output = CancellationToken::new();
    let printer = tokio::spawn(emit_results(coordinator.subscribe(), stop_output.clone(), std::io::stdout()));
    let service = SyncService::start(coordinator.clone(), remote, period, shutdown);
    let startup = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.trigger(Trigger::Startup).await })
    };

    let waited = wait_for_shutdown(&service).await;

    info!("Shutting down...");
    service.shutdown(None).await;
    startup.abort();
    // Shutdown waited for the last cycle, so its result is already queued.
    stop_output.cancel();
    if let Err(e) = printer.await {
        warn!(error = %e, "result output task failed");
    }
    info!("Shutdown complete");
    waited
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(settings_path);
    let settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    init_subscriber(cli.log_level.as_deref().unwrap_or(&settings.logging.level));

    info!(
        domain = %settings.bare_domain(),
        endpoint = %settings.endpoint,
        interval_minutes = settings.interval_minutes,
        store = %settings.store_path,
        "cartsync starting"
    );

    let app = build(&settings);
    if cli.once {
        return Ok(run_once(app).await);
    }
    run_daemon(app, Duration::from_secs(settings.interval_minutes.saturating_mul(60))).await?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["cartsync-agent"]);
        assert!(cli.config.is_none());
        assert!(!cli.once);
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn cli_flags() {
        let cli = Cli::parse_from([
            "cartsync-agent",
            "--config",
            "/etc/cartsync.json",
            "--once",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/cartsync.json")));
        assert!(cli.once);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    fn result_lines(out: &[u8]) -> Vec<serde_json::Value> {
        std::str::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn results_queued_at_shutdown_are_written() {
        let (tx, rx) = broadcast::channel(8);
        let stop = CancellationToken::new();
        let done = SyncResult::failed(
            cartsync_core::SyncFailure::new(cartsync_core::FailureKind::EndpointUnreachable, "refused"),
            0,
            2,
            false,
        );
        let interrupted = SyncResult::failed(
            cartsync_core::SyncFailure::new(cartsync_core::FailureKind::Cancelled, "cycle interrupted by shutdown"),
            0,
            2,
            true,
        );
        let _ = tx.send(done).unwrap();
        let _ = tx.send(interrupted).unwrap();
        stop.cancel();

        // The sender is still alive: only the stop signal ends the output.
        let out = emit_results(rx, stop, Vec::new()).await;
        let lines = result_lines(&out);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["ha_count"], 2);
        assert_eq!(lines[1]["error"]["kind"], "cancelled");
        drop(tx);
    }

    #[tokio::test]
    async fn output_ends_when_coordinator_is_gone() {
        let (tx, rx) = broadcast::channel(8);
        let writer = tokio::spawn(emit_results(rx, CancellationToken::new(), Vec::new()));
        let _ = tx.send(SyncResult::failed(
            cartsync_core::SyncFailure::new(cartsync_core::FailureKind::Cancelled, "stopped"),
            0,
            0,
            false,
        ))
        .unwrap();
        drop(tx);
        let out = writer.await.unwrap();
        assert_eq!(result_lines(&out).len(), 1);
    }

    #[tokio::test]
    async fn once_against_dead_endpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = SyncSettings::default();
        settings.endpoint = "http://127.0.0.1:1".into();
        settings.store_path = dir.path().join("list.json").display().to_string();
        settings.remote.discovery_timeout_ms = 200;
        settings.reconnect.max_attempts = 1;

        let app = build(&settings);
        let coordinator = app.coordinator.clone();
        assert_eq!(run_once(app).await, ExitCode::FAILURE);
        let last = coordinator.last_result().unwrap();
        assert_eq!(last.failure_kind(), Some(cartsync_core::FailureKind::EndpointUnreachable));
    }
}
