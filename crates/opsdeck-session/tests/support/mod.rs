//! In-process opsdeck server for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Path, Query,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use opsdeck_core::{ClientConfig, Endpoint, Envelope, Inbound, envelope, wire};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::mpsc};

pub const TOKEN: &str = "secret";

/// Start the server and return its API root.
pub async fn spawn() -> Endpoint {
    let app = Router::new()
        .route("/api/v1/tasks/ws/{task_id}", get(task_ws))
        .route("/api/v1/terminal/ws/{host}", get(terminal_ws))
        .route("/api/v1/deploy/run", post(deploy_run))
        .route("/api/v1/broken", post(|| async {
            (StatusCode::BAD_REQUEST, Json(json!({ "detail": "bad" })))
        }))
        .route("/api/v1/crash", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/api/v1/moved", post(|| async { Redirect::temporary("/login") }))
        .route("/api/v1/garbled", post(|| async { Json(json!({ "id": 1 })) }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Endpoint::parse(&format!("http://{addr}/api/v1")).unwrap()
}

/// Accept TCP connections but never answer the WebSocket handshake.
pub async fn spawn_silent() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    Endpoint::parse(&format!("http://{addr}/api/v1")).unwrap()
}

/// Config with a fast reconcile loop.
pub fn fast_config() -> ClientConfig {
    ClientConfig {
        reconcile_interval_ms: 10,
        close_timeout_ms: 200,
        ..ClientConfig::default()
    }
}

/// Receive from `rx`, failing the test after five seconds.
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for callback")
        .expect("callback channel closed")
}

async fn send(socket: &mut WebSocket, frame: &str) {
    let _ = socket.send(Message::Text(frame.into())).await;
}

async fn send_envelope(socket: &mut WebSocket, envelope: &Envelope) {
    send(socket, &envelope.encode()).await;
}

async fn task_ws(Path(task_id): Path<String>, ws: WebSocketUpgrade) -> Response {
    if task_id == "expired" {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| task_script(socket, task_id))
}

async fn task_script(mut socket: WebSocket, task_id: String) {
    match task_id.as_str() {
        "deploy-1" => {
            send(&mut socket, r#"{"type":"output","data":"line one"}"#).await;
            send(&mut socket, r#"{"type":"output","data":"line two"}"#).await;
            send(&mut socket, r#"{"type":"status","status":"success","exit_code":0}"#).await;
        }
        "disk-full" => {
            send(&mut socket, r#"{"type":"output","data":"starting"}"#).await;
            send(&mut socket, r#"{"type":"error","message":"disk full"}"#).await;
        }
        "raw" => {
            send(&mut socket, "hello").await;
            send(&mut socket, r#"{"type":"heartbeat"}"#).await;
            send(&mut socket, r#"{"type":"status","status":"success"}"#).await;
        }
        "late" => {
            send(&mut socket, r#"{"type":"output","data":"a"}"#).await;
            send(&mut socket, r#"{"type":"status","status":"failed","exit_code":2}"#).await;
            send(&mut socket, r#"{"type":"output","data":"late"}"#).await;
        }
        "dropped" => {
            send(&mut socket, r#"{"type":"output","data":"partial"}"#).await;
            let _ = socket.send(Message::Close(None)).await;
        }
        _ => send(&mut socket, r#"{"type":"status","status":"unknown"}"#).await,
    }
}

#[derive(Debug, Deserialize)]
struct TerminalQuery {
    cols: u16,
    rows: u16,
}

async fn terminal_ws(
    Path(host): Path<String>,
    Query(size): Query<TerminalQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| terminal_script(socket, host, size))
}

/// Greets, reports the requested size, echoes input and answers resizes.
async fn terminal_script(mut socket: WebSocket, host: String, size: TerminalQuery) {
    match host.as_str() {
        "down" => {
            send(&mut socket, r#"{"type":"error","message":"host unreachable"}"#).await;
            return;
        }
        "brief" => {
            send(&mut socket, r#"{"type":"heartbeat"}"#).await;
            send_envelope(&mut socket, &Envelope::Connected).await;
            send(&mut socket, r#"{"type":"heartbeat","seq":1}"#).await;
            send_envelope(&mut socket, &Envelope::output_bytes(b"Hi")).await;
            send(&mut socket, r#"{"type":"closed"}"#).await;
            while socket.recv().await.is_some() {}
            return;
        }
        _ => {}
    }

    send_envelope(&mut socket, &Envelope::Connected).await;
    send_envelope(&mut socket, &Envelope::output_bytes(b"Hi")).await;
    let greeting = format!("size {}x{}", size.cols, size.rows);
    send_envelope(&mut socket, &Envelope::output_bytes(greeting.as_bytes())).await;

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        match envelope::decode(text.as_str()) {
            Inbound::Envelope(Envelope::Input { data }) => {
                send_envelope(&mut socket, &Envelope::Output { data }).await;
            }
            Inbound::Envelope(Envelope::Resize { cols, rows }) => {
                let reply = wire::to_wire(format!("size {cols}x{rows}").as_bytes());
                send_envelope(&mut socket, &Envelope::Output { data: reply }).await;
            }
            _ => {}
        }
    }
}

async fn deploy_run(headers: HeaderMap, body: Bytes) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {TOKEN}"));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let task_id = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|body| body.get("task")?.as_str().map(str::to_owned))
        .unwrap_or_else(|| "deploy-1".to_owned());
    Json(json!({ "task_id": task_id })).into_response()
}
