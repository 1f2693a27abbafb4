//! CDP page session, a thin client over `tokio-tungstenite`.
//!
//! Only implements the commands the list adapter needs (evaluate, navigate,
//! title probe), not the entire protocol.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::RemoteError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Pending CDP command waiting for its response.
type PendingTx = oneshot::Sender<Result<Value, String>>;

/// Internal CDP command message.
struct CdpCommand {
    method: String,
    params: Value,
    response_tx: PendingTx,
}

/// An attached control channel to one page target.
pub struct CdpSession {
    cmd_tx: mpsc::Sender<CdpCommand>,
    alive: Arc<AtomicBool>,
    command_timeout: Duration,
    handler: JoinHandle<()>,
}

impl CdpSession {
    /// Open the control channel at `ws_url`.
    pub async fn attach(ws_url: &str, command_timeout: Duration) -> Result<Self, RemoteError> {
        let (ws, _) = tokio::time::timeout(command_timeout, connect_async(ws_url))
            .await
            .map_err(|_| RemoteError::Protocol(format!("attach to {ws_url} timed out")))?
            .map_err(|e| RemoteError::Protocol(format!("WebSocket connect: {e}")))?;

        let (cmd_tx, cmd_rx) = mpsc::channel::<CdpCommand>(16);
        let alive = Arc::new(AtomicBool::new(true));
        let handler = tokio::spawn(cdp_handler_loop(ws, cmd_rx, Arc::clone(&alive)));
        tracing::debug!(ws_url, "control channel attached");

        Ok(Self {
            cmd_tx,
            alive,
            command_timeout,
            handler,
        })
    }

    /// Whether the channel is still open.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed) && !self.cmd_tx.is_closed()
    }

    /// Send a raw CDP command and wait for its result.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value, RemoteError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(CdpCommand {
                method: method.into(),
                params,
                response_tx: tx,
            })
            .await
            .map_err(|_| RemoteError::Protocol("handler closed".into()))?;

        let timeout_ms = u64::try_from(self.command_timeout.as_millis()).unwrap_or(u64::MAX);
        let result = tokio::time::timeout(self.command_timeout, rx)
            .await
            .map_err(|_| RemoteError::EvaluationTimeout {
                timeout_ms,
                context: format!("CDP {method}"),
            })?
            .map_err(|_| RemoteError::Protocol("response dropped".into()))?;

        result.map_err(RemoteError::Evaluation)
    }

    /// Evaluate `expression` in the page and return its JSON value.
    ///
    /// Promises are awaited. A thrown exception becomes
    /// [`RemoteError::Evaluation`].
    pub async fn evaluate(&self, expression: &str) -> Result<Value, RemoteError> {
        let result = self
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        if let Some(exception) = result.get("exceptionDetails") {
            let msg = exception["exception"]["description"]
                .as_str()
                .or_else(|| exception["text"].as_str())
                .unwrap_or("evaluation error");
            return Err(RemoteError::Evaluation(msg.into()));
        }
        Ok(result["result"]["value"].clone())
    }

    /// Navigate the page and give it `settle` to render.
    pub async fn navigate(&self, url: &str, settle: Duration) -> Result<(), RemoteError> {
        let result = self.send("Page.navigate", json!({ "url": url })).await?;
        if let Some(err) = result.get("errorText").and_then(Value::as_str) {
            return Err(RemoteError::Evaluation(format!("navigate to {url}: {err}")));
        }
        tokio::time::sleep(settle).await;
        Ok(())
    }

    /// Close the channel. Best effort.
    pub async fn close(self) {
        let Self { cmd_tx, handler, .. } = self;
        drop(cmd_tx);
        let abort = handler.abort_handle();
        if tokio::time::timeout(Duration::from_secs(2), handler).await.is_err() {
            abort.abort();
            tracing::debug!("control channel handler did not stop in time, aborted");
        }
    }
}

/// Register a waiting caller, dropping callers that already gave up.
///
/// A timed-out command's receiver is gone while its entry would otherwise
/// wait for a reply the page may never send.
fn track(pending: &mut HashMap<u64, PendingTx>, id: u64, tx: PendingTx) {
    pending.retain(|_, waiting| !waiting.is_closed());
    let _ = pending.insert(id, tx);
}

/// CDP WebSocket handler loop.
///
/// Receives commands from `CdpSession`, sends them over WS and routes
/// responses back by id. Pending senders are dropped on exit, which the
/// waiting callers observe as [`RemoteError::Protocol`].
async fn cdp_handler_loop(ws: WsStream, mut cmd_rx: mpsc::Receiver<CdpCommand>, alive: Arc<AtomicBool>) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut pending: HashMap<u64, PendingTx> = HashMap::new();
    let next_id = AtomicU64::new(1);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    let _ = ws_tx.close().await;
                    break;
                };
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                let msg = json!({
                    "id": id,
                    "method": cmd.method,
                    "params": cmd.params,
                });
                track(&mut pending, id, cmd.response_tx);
                if ws_tx.send(Message::Text(msg.to_string().into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(val): Result<Value, _> = serde_json::from_str(&text) else {
                    continue;
                };
                // Events carry a method and no id; none are subscribed to.
                if let Some(id) = val.get("id").and_then(Value::as_u64) {
                    if let Some(tx) = pending.remove(&id) {
                        if let Some(err) = val.get("error") {
                            let msg = err["message"].as_str().unwrap_or("CDP error");
                            let _ = tx.send(Err(msg.into()));
                        } else {
                            let _ = tx.send(Ok(val["result"].clone()));
                        }
                    }
                }
            }
        }
    }

    alive.store(false, Ordering::Relaxed);
    tracing::debug!(pending = pending.len(), "control channel closed");
}
