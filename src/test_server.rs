//! In-process fake Alpaca server for exercising the client end-to-end.

use axum::Router;
use axum::extract::State;
use axum::http::{Method, Uri, header};
use axum::response::IntoResponse;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};

#[ctor::ctor]
fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Successful envelope carrying a `Value`.
pub(crate) fn ok_value(value: serde_json::Value) -> String {
    json!({
        "ServerTransactionID": 1,
        "ErrorNumber": 0,
        "ErrorMessage": "",
        "Value": value,
    })
    .to_string()
}

/// Successful envelope of a void PUT: no `Value` at all.
pub(crate) fn ok_void() -> String {
    json!({
        "ServerTransactionID": 1,
        "ErrorNumber": 0,
        "ErrorMessage": "",
    })
    .to_string()
}

/// Envelope reporting a protocol error.
pub(crate) fn device_error(code: i32, message: &str) -> String {
    json!({
        "ServerTransactionID": 1,
        "ErrorNumber": code,
        "ErrorMessage": message,
    })
    .to_string()
}

#[derive(Clone, Default)]
struct FakeState {
    responses: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

/// A scripted Alpaca server listening on an ephemeral loopback port.
///
/// Responses are queued per `"{METHOD} {member}"` key; the last queued
/// response keeps repeating. Unstubbed members answer with a NotImplemented
/// envelope, mirroring what a real device would do.
pub(crate) struct FakeServer {
    pub(crate) addr: SocketAddr,
    state: FakeState,
}

impl FakeServer {
    pub(crate) async fn start() -> eyre::Result<Self> {
        let state = FakeState::default();
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        drop(tokio::spawn(async move { axum::serve(listener, app).await }));
        Ok(Self { addr, state })
    }

    /// Queue a canned response body for the given method and member name.
    pub(crate) fn stub(&self, method: &str, member: &str, body: String) {
        let _ = lock(&self.state.responses)
            .entry(format!("{method} {member}"))
            .or_default()
            .push_back(body);
    }

    /// Every request seen so far, as `"{METHOD} {member} {query-or-body}"`.
    pub(crate) fn requests(&self) -> Vec<String> {
        lock(&self.state.requests).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("fake server lock poisoned")
}

async fn handle(
    State(state): State<FakeState>,
    method: Method,
    uri: Uri,
    body: String,
) -> impl IntoResponse {
    let member = uri.path().rsplit('/').next().unwrap_or_default();
    let key = format!("{method} {member}");
    let payload = if body.is_empty() {
        uri.query().unwrap_or_default().to_owned()
    } else {
        body
    };
    lock(&state.requests).push(format!("{key} {payload}"));

    let canned = lock(&state.responses).get_mut(&key).and_then(|queue| {
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    });
    let body =
        canned.unwrap_or_else(|| device_error(0x400, "Property or method not implemented"));
    ([(header::CONTENT_TYPE, "application/json")], body)
}
