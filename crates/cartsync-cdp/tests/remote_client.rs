//! Remote client against a fake debugging endpoint.
//!
//! `wiremock` serves the `/json` target listing; a local `tokio-tungstenite`
//! acceptor plays the page's control channel.

use std::sync::Arc;

use assert_matches::assert_matches;
use cartsync_cdp::{RemoteClient, RemoteError};
use cartsync_core::{BackoffPolicy, ConnectionState};
use cartsync_settings::SyncSettings;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LIST_URL: &str = "https://www.amazon.com/alexaquantum/sp/alexaShoppingList";

/// What the fake page does with one command.
enum Reply {
    Send(Value),
    Ignore,
    Close,
}

type Responder = Arc<dyn Fn(&str, &Value) -> Reply + Send + Sync>;

/// Start a fake control channel; returns its WebSocket URL.
async fn fake_page(responder: Responder) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let responder = Arc::clone(&responder);
            drop(tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else { continue };
                    let req: Value = serde_json::from_str(&text).unwrap();
                    let method = req["method"].as_str().unwrap_or_default();
                    match responder(method, &req["params"]) {
                        Reply::Send(mut reply) => {
                            reply["id"] = req["id"].clone();
                            ws.send(Message::Text(reply.to_string().into())).await.unwrap();
                        }
                        Reply::Ignore => {}
                        Reply::Close => {
                            let _ = ws.close(None).await;
                            return;
                        }
                    }
                }
            }));
        }
    }));
    format!("ws://{addr}/devtools/page/LIST")
}

fn value_reply(value: Value) -> Reply {
    Reply::Send(json!({"result": {"result": {"type": "object", "value": value}}}))
}

fn listing(url: &str, ws_url: &str) -> Value {
    json!([
        {"id": "SW", "type": "service_worker", "url": url, "webSocketDebuggerUrl": "ws://127.0.0.1:9/none"},
        {"id": "LIST", "type": "page", "title": "Shopping List", "url": url, "webSocketDebuggerUrl": ws_url}
    ])
}

async fn serve_listing(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn settings(endpoint: &str) -> SyncSettings {
    let mut s = SyncSettings::default();
    s.endpoint = endpoint.to_string();
    s.remote.discovery_timeout_ms = 1_000;
    s.remote.command_timeout_ms = 1_000;
    s.remote.navigate_settle_ms = 0;
    s.reconnect = BackoffPolicy {
        max_attempts: 2,
        base_delay_ms: 10,
        max_delay_ms: 20,
        jitter_factor: 0.0,
    };
    s
}

fn title_page() -> Responder {
    Arc::new(|method: &str, params: &Value| match method {
        "Runtime.evaluate" if params["expression"] == "document.title" => value_reply(json!("Shopping List")),
        "Runtime.evaluate" => value_reply(json!({"echo": params["expression"]})),
        _ => Reply::Send(json!({"result": {}})),
    })
}

#[tokio::test]
async fn connects_to_matching_page_and_evaluates() {
    let server = MockServer::start().await;
    let ws_url = fake_page(title_page()).await;
    serve_listing(&server, listing(LIST_URL, &ws_url)).await;

    let client = RemoteClient::new(settings(&server.uri()));
    client.ensure_connected().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    assert_eq!(client.evaluate("document.title").await.unwrap(), json!("Shopping List"));
    assert_eq!(client.evaluate("1 + 1").await.unwrap(), json!({"echo": "1 + 1"}));
    assert!(client.check_connection().await);

    // Already connected: no second discovery round.
    client.ensure_connected().await.unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.check_connection().await);
}

#[tokio::test]
async fn script_exception_is_evaluation_error() {
    let server = MockServer::start().await;
    let ws_url = fake_page(Arc::new(|_: &str, _: &Value| {
        Reply::Send(json!({"result": {
            "result": {"type": "object", "subtype": "error"},
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": {"description": "ReferenceError: list is not defined"}
            }
        }}))
    }))
    .await;
    serve_listing(&server, listing(LIST_URL, &ws_url)).await;

    let client = RemoteClient::new(settings(&server.uri()));
    client.ensure_connected().await.unwrap();
    assert_matches!(
        client.evaluate("list.length").await,
        Err(RemoteError::Evaluation(msg)) if msg.contains("ReferenceError")
    );
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn protocol_error_is_evaluation_error() {
    let server = MockServer::start().await;
    let ws_url = fake_page(Arc::new(|_: &str, _: &Value| {
        Reply::Send(json!({"error": {"code": -32000, "message": "Cannot find context"}}))
    }))
    .await;
    serve_listing(&server, listing(LIST_URL, &ws_url)).await;

    let client = RemoteClient::new(settings(&server.uri()));
    client.ensure_connected().await.unwrap();
    assert_matches!(
        client.evaluate("1").await,
        Err(RemoteError::Evaluation(msg)) if msg == "Cannot find context"
    );
}

#[tokio::test]
async fn silent_page_times_out_without_dropping_channel() {
    let server = MockServer::start().await;
    let ws_url = fake_page(Arc::new(|_: &str, _: &Value| Reply::Ignore)).await;
    serve_listing(&server, listing(LIST_URL, &ws_url)).await;

    let mut s = settings(&server.uri());
    s.remote.command_timeout_ms = 150;
    let client = RemoteClient::new(s);
    client.ensure_connected().await.unwrap();

    assert_matches!(
        client.evaluate("1").await,
        Err(RemoteError::EvaluationTimeout { timeout_ms: 150, .. })
    );
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn no_matching_page_is_target_not_found() {
    let server = MockServer::start().await;
    let ws_url = fake_page(title_page()).await;
    serve_listing(&server, listing("https://example.com/", &ws_url)).await;

    let client = RemoteClient::new(settings(&server.uri()));
    let err = client.ensure_connected().await.unwrap_err();
    assert_matches!(err, RemoteError::TargetNotFound { pattern } if pattern.contains("alexaShoppingList"));
    assert_matches!(client.state(), ConnectionState::Degraded { .. });
}

#[tokio::test]
async fn other_region_does_not_match() {
    let server = MockServer::start().await;
    let ws_url = fake_page(title_page()).await;
    serve_listing(&server, listing(LIST_URL, &ws_url)).await;

    let mut s = settings(&server.uri());
    s.domain = "amazon.de".into();
    let client = RemoteClient::new(s);
    assert_matches!(client.ensure_connected().await, Err(RemoteError::TargetNotFound { .. }));
}

#[tokio::test]
async fn adopts_first_page_and_navigates_when_enabled() {
    let server = MockServer::start().await;
    let navigated = Arc::new(Mutex::new(Vec::<String>::new()));
    let seen = Arc::clone(&navigated);
    let ws_url = fake_page(Arc::new(move |method: &str, params: &Value| {
        if method == "Page.navigate" {
            seen.lock().push(params["url"].as_str().unwrap_or_default().to_string());
            return Reply::Send(json!({"result": {"frameId": "F1", "loaderId": "L1"}}));
        }
        value_reply(json!("ok"))
    }))
    .await;
    serve_listing(&server, listing("about:blank", &ws_url)).await;

    let mut s = settings(&server.uri());
    s.adopt_any_page = true;
    let client = RemoteClient::new(s);
    client.ensure_connected().await.unwrap();

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(
        *navigated.lock(),
        vec!["https://amazon.com/alexaquantum/sp/alexaShoppingList".to_string()]
    );
}

#[tokio::test]
async fn failed_navigation_is_reported() {
    let server = MockServer::start().await;
    let ws_url = fake_page(Arc::new(|_: &str, _: &Value| {
        Reply::Send(json!({"result": {"frameId": "F1", "errorText": "net::ERR_NAME_NOT_RESOLVED"}}))
    }))
    .await;
    serve_listing(&server, listing("about:blank", &ws_url)).await;

    let mut s = settings(&server.uri());
    s.adopt_any_page = true;
    s.reconnect.max_attempts = 1;
    let client = RemoteClient::new(s);
    assert_matches!(
        client.ensure_connected().await,
        Err(RemoteError::Evaluation(msg)) if msg.contains("ERR_NAME_NOT_RESOLVED")
    );
}

#[tokio::test]
async fn unreachable_endpoint_degrades_after_retry_cap() {
    let client = RemoteClient::new(settings("http://127.0.0.1:1"));
    let err = client.ensure_connected().await.unwrap_err();
    assert_matches!(err, RemoteError::EndpointUnreachable { .. });
    assert_matches!(
        client.state(),
        ConnectionState::Degraded { reason } if reason.contains("unreachable")
    );
}

#[tokio::test]
async fn recovers_after_endpoint_comes_back() {
    let server = MockServer::start().await;
    let ws_url = fake_page(title_page()).await;
    Mock::given(method("GET"))
        .and(path("/json"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    serve_listing(&server, listing(LIST_URL, &ws_url)).await;

    let client = RemoteClient::new(settings(&server.uri()));
    assert_matches!(
        client.ensure_connected().await,
        Err(RemoteError::EndpointUnreachable { reason, .. }) if reason.contains("503")
    );
    assert_matches!(client.state(), ConnectionState::Degraded { .. });

    client.ensure_connected().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.evaluate("document.title").await.unwrap(), json!("Shopping List"));
}

#[tokio::test]
async fn dropped_channel_marks_disconnected_and_reattaches() {
    let server = MockServer::start().await;
    let ws_url = fake_page(Arc::new(|method: &str, params: &Value| match method {
        "Runtime.evaluate" if params["expression"] == "crash()" => Reply::Close,
        _ => value_reply(json!("alive")),
    }))
    .await;
    serve_listing(&server, listing(LIST_URL, &ws_url)).await;

    let client = RemoteClient::new(settings(&server.uri()));
    client.ensure_connected().await.unwrap();

    assert_matches!(client.evaluate("crash()").await, Err(RemoteError::Protocol(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.ensure_connected().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.evaluate("ping()").await.unwrap(), json!("alive"));
}
