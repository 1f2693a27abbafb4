//! Remote control client: discovery, attach, evaluation and reconnection.
//!
//! [`RemoteClient`] owns the single control channel of the process and the
//! [`ConnectionState`] describing it. Reconnection is bounded: one
//! [`RemoteClient::ensure_connected`] call makes at most
//! `reconnect.max_attempts` attempts and then reports `Degraded`. Retry
//! cadence beyond that is driven by the caller's cycle period.

use std::time::Duration;

use async_trait::async_trait;
use cartsync_core::ConnectionState;
use cartsync_settings::SyncSettings;
use metrics::counter;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::{discover_targets, first_page, select_target};
use crate::error::{ErrorTier, RemoteError};
use crate::session::CdpSession;
use crate::traits::{PageEvaluator, RemoteControl};

/// Connection owner for one remote list page.
pub struct RemoteClient {
    settings: SyncSettings,
    http: reqwest::Client,
    state: RwLock<ConnectionState>,
    session: Mutex<Option<CdpSession>>,
    cancel: CancellationToken,
}

impl RemoteClient {
    /// Create a disconnected client.
    pub fn new(settings: SyncSettings) -> Self {
        Self::with_cancel(settings, CancellationToken::new())
    }

    /// Create a client whose backoff waits end when `cancel` fires.
    pub fn with_cancel(settings: SyncSettings, cancel: CancellationToken) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
            state: RwLock::new(ConnectionState::Disconnected),
            session: Mutex::new(None),
            cancel,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if *state != next {
            debug!(from = %*state, to = %next, "connection state changed");
            *state = next;
        }
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.remote.command_timeout_ms)
    }

    fn settle(&self) -> Duration {
        Duration::from_millis(self.settings.remote.navigate_settle_ms)
    }

    /// Discover, select and attach to the list page.
    ///
    /// Replaces any existing channel. On failure the state is
    /// `Disconnected`.
    pub async fn connect(&self) -> Result<ConnectionState, RemoteError> {
        let mut slot = self.session.lock().await;
        if let Some(old) = slot.take() {
            old.close().await;
        }
        self.set_state(ConnectionState::Connecting);

        match self.attach().await {
            Ok(session) => {
                *slot = Some(session);
                self.set_state(ConnectionState::Connected);
                counter!("cdp_connects_total", "status" => "success").increment(1);
                info!(endpoint = self.settings.endpoint_base(), "connected to list page");
                Ok(ConnectionState::Connected)
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                counter!("cdp_connects_total", "status" => "failure").increment(1);
                Err(e)
            }
        }
    }

    async fn attach(&self) -> Result<CdpSession, RemoteError> {
        let endpoint = self.settings.endpoint_base();
        let timeout = Duration::from_millis(self.settings.remote.discovery_timeout_ms);
        let targets = discover_targets(&self.http, endpoint, timeout).await?;

        let domain = self.settings.bare_domain();
        let path = self.settings.list_path.as_str();
        if let Some(target) = select_target(&targets, &domain, path) {
            let ws_url = target.web_socket_debugger_url.as_deref().unwrap_or_default();
            debug!(target_id = %target.id, url = %target.url, "attaching to list page");
            return CdpSession::attach(ws_url, self.command_timeout()).await;
        }

        let not_found = || RemoteError::TargetNotFound {
            pattern: format!("{domain}{path}"),
        };
        if !self.settings.adopt_any_page {
            return Err(not_found());
        }
        let page = first_page(&targets).ok_or_else(not_found)?;
        let ws_url = page.web_socket_debugger_url.as_deref().unwrap_or_default();
        info!(target_id = %page.id, url = %page.url, "no list page open, adopting page");

        let session = CdpSession::attach(ws_url, self.command_timeout()).await?;
        if let Err(e) = session.navigate(&self.settings.list_url(), self.settle()).await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    /// Connect unless already connected, retrying with bounded backoff.
    ///
    /// After the attempt cap the state becomes `Degraded` and the last error
    /// is returned.
    pub async fn ensure_connected(&self) -> Result<(), RemoteError> {
        if self.state().is_connected() {
            let alive = self.session.lock().await.as_ref().is_some_and(CdpSession::is_alive);
            if alive {
                return Ok(());
            }
            debug!("control channel went away, reconnecting");
            self.set_state(ConnectionState::Disconnected);
        }

        let policy = &self.settings.reconnect;
        let attempts = policy.attempts();
        let mut last_err = RemoteError::Protocol("no connect attempt made".into());

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = policy.delay_for(attempt - 1);
                debug!(attempt, ?delay, "waiting before reconnect");
                tokio::select! {
                    () = self.cancel.cancelled() => {
                        self.set_state(ConnectionState::Disconnected);
                        return Err(RemoteError::Protocol("reconnect cancelled".into()));
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }

            match self.connect().await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!(attempt = attempt + 1, max_attempts = attempts, error = %e, "connect attempt failed");
                    last_err = e;
                }
            }
        }

        self.set_state(ConnectionState::Degraded {
            reason: last_err.to_string(),
        });
        Err(last_err)
    }

    /// Evaluate `script` in the attached page.
    ///
    /// A connection-tier failure drops the channel and marks the client
    /// `Disconnected` so the next `ensure_connected` reattaches.
    pub async fn evaluate(&self, script: &str) -> Result<Value, RemoteError> {
        let mut slot = self.session.lock().await;
        let Some(session) = slot.as_ref() else {
            return Err(RemoteError::Protocol("not connected".into()));
        };

        let result = session.evaluate(script).await;
        match &result {
            Ok(_) => counter!("cdp_evaluations_total", "status" => "success").increment(1),
            Err(e) => {
                counter!("cdp_evaluations_total", "status" => "failure").increment(1);
                if e.tier() == ErrorTier::Connection {
                    warn!(error = %e, "control channel lost");
                    if let Some(dead) = slot.take() {
                        dead.close().await;
                    }
                    self.set_state(ConnectionState::Disconnected);
                }
            }
        }
        result
    }

    /// Navigate the attached page to `url` and wait for it to settle.
    pub async fn navigate(&self, url: &str) -> Result<(), RemoteError> {
        let slot = self.session.lock().await;
        let Some(session) = slot.as_ref() else {
            return Err(RemoteError::Protocol("not connected".into()));
        };
        session.navigate(url, self.settle()).await
    }

    /// Whether the page answers a trivial evaluation. Never errors.
    pub async fn check_connection(&self) -> bool {
        match self.evaluate("document.title").await {
            Ok(title) => {
                debug!(title = %title, "connection check ok");
                true
            }
            Err(e) => {
                debug!(error = %e, "connection check failed");
                false
            }
        }
    }

    /// Close the control channel and mark the client `Disconnected`.
    pub async fn disconnect(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.close().await;
            info!("disconnected from list page");
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

#[async_trait]
impl PageEvaluator for RemoteClient {
    async fn evaluate(&self, script: &str) -> Result<Value, RemoteError> {
        Self::evaluate(self, script).await
    }
}

#[async_trait]
impl RemoteControl for RemoteClient {
    async fn ensure_connected(&self) -> Result<(), RemoteError> {
        Self::ensure_connected(self).await
    }

    fn state(&self) -> ConnectionState {
        Self::state(self)
    }

    async fn disconnect(&self) {
        Self::disconnect(self).await;
    }
}
