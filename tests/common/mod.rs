//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use waf_proxy::config::GateConfig;
use waf_proxy::storage::Database;
use waf_proxy::{HttpServer, Shutdown};

/// What the mock origin saw.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct CapturedRequest {
    pub method: String,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Clone)]
struct OriginState {
    status: StatusCode,
    body: &'static str,
    delay: Duration,
    seen: Arc<Mutex<Vec<CapturedRequest>>>,
}

async fn origin_handler(State(state): State<OriginState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    state.seen.lock().unwrap().push(CapturedRequest {
        method: parts.method.to_string(),
        uri: parts.uri.to_string(),
        headers: parts.headers,
        body: body.to_vec(),
    });

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    (state.status, [("x-origin", "mock")], state.body).into_response()
}

/// Start a mock origin that records every request and answers with a fixed response.
#[allow(dead_code)]
pub async fn start_origin(
    status: u16,
    body: &'static str,
    delay: Duration,
) -> (SocketAddr, Arc<Mutex<Vec<CapturedRequest>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let state = OriginState {
        status: StatusCode::from_u16(status).unwrap(),
        body,
        delay,
        seen: seen.clone(),
    };
    let app = Router::new().fallback(origin_handler).with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (addr, seen)
}

/// An address with nothing listening on it.
#[allow(dead_code)]
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Run the gate on an ephemeral port in front of `upstream`.
pub async fn start_gate(mut config: GateConfig, upstream: SocketAddr, db: &Database) -> (SocketAddr, Shutdown) {
    config.upstream.address = upstream.to_string();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, db).unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
