//! Session manager against a real WebSocket server on loopback.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dndink_core::{BackoffConfig, ObservedState, RenderRequest};
use dndink_session::{SessionConfig, SessionError, SessionManager, WsConnector};
use dndink_settings::AccessToken;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_async, accept_hdr_async};
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);
const TOKEN: &str = "integration-token";
const ENTITY: &str = "input_boolean.dnd_status";

type ServerWs = WebSocketStream<TcpStream>;

fn config(base_url: String) -> SessionConfig {
    SessionConfig {
        base_url,
        token: AccessToken::new(TOKEN),
        entity_id: ENTITY.to_string(),
        ping_interval: None,
        handshake_timeout: TIMEOUT,
        backoff: BackoffConfig {
            base_delay_ms: 50,
            max_delay_ms: 200,
            ..BackoffConfig::default()
        },
    }
}

async fn send_json(ws: &mut ServerWs, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn recv_json(ws: &mut ServerWs) -> Value {
    loop {
        let message = ws.next().await.expect("client hung up").expect("websocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Play the server side of auth + subscribe + get_states. Returns the
/// subscription id.
async fn serve_handshake(ws: &mut ServerWs, entity_state: &str) -> u64 {
    send_json(ws, json!({ "type": "auth_required", "ha_version": "2024.6.0" })).await;

    let auth = recv_json(ws).await;
    assert_eq!(auth["type"], "auth");
    assert_eq!(auth["access_token"], TOKEN);
    send_json(ws, json!({ "type": "auth_ok", "ha_version": "2024.6.0" })).await;

    let subscribe = recv_json(ws).await;
    assert_eq!(subscribe["type"], "subscribe_events");
    assert_eq!(subscribe["event_type"], "state_changed");
    let subscription_id = subscribe["id"].as_u64().unwrap();
    send_json(
        ws,
        json!({ "id": subscription_id, "type": "result", "success": true, "result": null }),
    )
    .await;

    let get_states = recv_json(ws).await;
    assert_eq!(get_states["type"], "get_states");
    assert!(get_states["id"].as_u64().unwrap() > subscription_id);
    send_json(
        ws,
        json!({
            "id": get_states["id"],
            "type": "result",
            "success": true,
            "result": [
                { "entity_id": "sun.sun", "state": "below_horizon" },
                { "entity_id": ENTITY, "state": entity_state },
            ],
        }),
    )
    .await;

    subscription_id
}

fn state_changed(subscription_id: u64, old: &str, new: &str) -> Value {
    json!({
        "id": subscription_id,
        "type": "event",
        "event": {
            "event_type": "state_changed",
            "data": {
                "entity_id": ENTITY,
                "old_state": { "entity_id": ENTITY, "state": old },
                "new_state": { "entity_id": ENTITY, "state": new },
            },
        },
    })
}

/// True if the client sent a close frame before the stream ended.
async fn saw_close_frame(ws: &mut ServerWs) -> bool {
    while let Some(message) = ws.next().await {
        if let Ok(Message::Close(_)) = message {
            return true;
        }
    }
    false
}

async fn next_request(rx: &mut mpsc::UnboundedReceiver<RenderRequest>) -> RenderRequest {
    timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for render request")
        .expect("session dropped the channel")
}

#[tokio::test]
async fn live_session_resyncs_follows_events_and_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut path = String::new();
        let mut ws = accept_hdr_async(
            stream,
            |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                path = req.uri().path().to_owned();
                Ok(resp)
            },
        )
        .await
        .unwrap();

        let subscription_id = serve_handshake(&mut ws, "on").await;
        send_json(&mut ws, state_changed(subscription_id, "on", "off")).await;
        let closed = saw_close_frame(&mut ws).await;
        (path, closed)
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut manager = SessionManager::new(config(format!("http://{addr}/ha")), WsConnector, tx);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { manager.run(shutdown).await }
    });

    assert_eq!(
        next_request(&mut rx).await,
        RenderRequest::resync(Some(ObservedState::Busy))
    );
    assert_eq!(next_request(&mut rx).await, RenderRequest::state(ObservedState::Free));

    shutdown.cancel();
    timeout(TIMEOUT, task).await.unwrap().unwrap().unwrap();

    let (path, closed) = timeout(TIMEOUT, server).await.unwrap().unwrap();
    assert_eq!(path, "/ha/api/websocket");
    assert!(closed, "client must send a close frame on shutdown");
}

#[tokio::test]
async fn server_restart_triggers_reconnect_and_resync() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _ = serve_handshake(&mut ws, "off").await;
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _ = serve_handshake(&mut ws, "on").await;
        saw_close_frame(&mut ws).await
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut manager = SessionManager::new(config(format!("ws://{addr}")), WsConnector, tx);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { manager.run(shutdown).await }
    });

    assert_eq!(
        next_request(&mut rx).await,
        RenderRequest::resync(Some(ObservedState::Free))
    );
    assert_eq!(
        next_request(&mut rx).await,
        RenderRequest::resync(Some(ObservedState::Busy))
    );

    shutdown.cancel();
    timeout(TIMEOUT, task).await.unwrap().unwrap().unwrap();
    assert!(timeout(TIMEOUT, server).await.unwrap().unwrap());
}

#[tokio::test]
async fn rejected_token_surfaces_as_auth_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        send_json(&mut ws, json!({ "type": "auth_required" })).await;
        let _ = recv_json(&mut ws).await;
        send_json(&mut ws, json!({ "type": "auth_invalid", "message": "Invalid access token" })).await;
        let _ = ws.close(None).await;
    });

    let (tx, _rx) = mpsc::unbounded_channel();
    let mut manager = SessionManager::new(config(format!("http://{addr}")), WsConnector, tx);
    let result = timeout(TIMEOUT, manager.resync_once()).await.unwrap();
    match result {
        Err(SessionError::Auth(message)) => assert_eq!(message, "Invalid access token"),
        other => panic!("expected auth error, got {other:?}"),
    }
    timeout(TIMEOUT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn silent_upgrade_times_out_and_is_retried() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    // Accepts TCP and never answers the HTTP upgrade.
    let server = tokio::spawn({
        let accepted = Arc::clone(&accepted);
        async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                let _ = accepted.fetch_add(1, Ordering::SeqCst);
                held.push(stream);
            }
        }
    });

    let (tx, _rx) = mpsc::unbounded_channel();
    let config = SessionConfig {
        handshake_timeout: Duration::from_millis(300),
        ..config(format!("http://{addr}"))
    };
    let mut manager = SessionManager::new(config, WsConnector, tx);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { manager.run(shutdown).await }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    let attempts = accepted.load(Ordering::SeqCst);
    assert!(attempts >= 2, "only {attempts} connection attempt(s)");

    shutdown.cancel();
    timeout(TIMEOUT, task).await.unwrap().unwrap().unwrap();
    server.abort();
}
