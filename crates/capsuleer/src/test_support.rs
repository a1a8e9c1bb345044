// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: scripted poller seams, a mock backend, and
//! assertion helpers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::finalize::{DataRefresh, FinalizeApi};

/// Ordered record of calls made against test doubles.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<String>>,
}

impl CallLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, call: impl Into<String>) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call.into());
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.snapshot().iter().filter(|c| c.as_str() == call).count()
    }
}

/// Pick the response for call `idx`, repeating the last one when the script
/// runs out.
fn scripted<T: Clone>(script: &[T], idx: usize, fallback: T) -> T {
    script.get(idx).or_else(|| script.last()).cloned().unwrap_or(fallback)
}

/// [`FinalizeApi`] that answers from a script of successes and failures.
pub struct ScriptedFinalize {
    script: Vec<bool>,
    calls: AtomicU32,
    delay: Option<Duration>,
    log: Arc<CallLog>,
}

impl ScriptedFinalize {
    pub fn new(script: Vec<bool>, log: Arc<CallLog>) -> Self {
        Self { script, calls: AtomicU32::new(0), delay: None, log }
    }

    /// Sleep this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FinalizeApi for ScriptedFinalize {
    fn finalize<'a>(&'a self, _state: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        async move {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.log.push("finalize");
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if scripted(&self.script, idx, false) {
                Ok(())
            } else {
                anyhow::bail!("finalize not ready")
            }
        }
        .boxed()
    }
}

/// [`DataRefresh`] answering from a script. `None` entries are transport
/// errors, `Some(visible)` successful fetches.
pub struct ScriptedRefresh {
    script: Vec<Option<bool>>,
    calls: AtomicU32,
    log: Arc<CallLog>,
}

impl ScriptedRefresh {
    pub fn new(script: Vec<Option<bool>>, log: Arc<CallLog>) -> Self {
        Self { script, calls: AtomicU32::new(0), log }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DataRefresh for ScriptedRefresh {
    fn refresh(&self) -> BoxFuture<'_, anyhow::Result<bool>> {
        async move {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.log.push("refresh");
            match scripted(&self.script, idx, Some(false)) {
                Some(visible) => Ok(visible),
                None => anyhow::bail!("connection refused"),
            }
        }
        .boxed()
    }
}

/// Canned responses for [`spawn_mock_backend`].
#[derive(Debug, Clone)]
pub struct MockBackendConfig {
    /// Status and body for `/api/login` and `/api/add-character`.
    pub initiate: (u16, Value),
    /// Status codes for successive `/api/finalize-login` calls.
    pub finalize: Vec<u16>,
    /// Status and body for successive `/api/app-data-no-cache` calls.
    pub app_data: Vec<(u16, Value)>,
    /// Status for `/api/logout`.
    pub logout: u16,
}

impl Default for MockBackendConfig {
    fn default() -> Self {
        Self {
            initiate: (
                200,
                json!({ "redirectURL": "https://login.example/sso?state=abc123", "state": "abc123" }),
            ),
            finalize: vec![200],
            app_data: vec![(200, app_data_with_characters(1))],
            logout: 200,
        }
    }
}

/// App data body with one account holding `n` characters.
pub fn app_data_with_characters(n: usize) -> Value {
    let characters: Vec<Value> = (0..n)
        .map(|i| json!({ "characterId": 90_000_000 + i as i64, "characterName": format!("Pilot {i}") }))
        .collect();
    json!({
        "accounts": [{ "name": "main", "characters": characters }],
        "unassignedCharacters": [],
        "skillPlans": {}
    })
}

struct MockState {
    config: MockBackendConfig,
    finalize_calls: AtomicU32,
    app_data_calls: AtomicU32,
    log: Arc<CallLog>,
}

/// A backend served by axum on an ephemeral port.
pub struct MockBackend {
    pub addr: SocketAddr,
    pub log: Arc<CallLog>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Start a mock backend. Calls are recorded as `login:<account>`,
/// `add_character:<account>`, `finalize:<state>`, `app_data`, `logout`.
pub async fn spawn_mock_backend(config: MockBackendConfig) -> anyhow::Result<MockBackend> {
    let log = CallLog::new();
    let state = Arc::new(MockState {
        config,
        finalize_calls: AtomicU32::new(0),
        app_data_calls: AtomicU32::new(0),
        log: Arc::clone(&log),
    });

    let app = Router::new()
        .route(
            "/api/login",
            post(|State(s): State<Arc<MockState>>, Json(body): Json<Value>| async move {
                s.log.push(format!("login:{}", body["account"].as_str().unwrap_or_default()));
                let (code, body) = s.config.initiate.clone();
                (status(code), Json(body))
            }),
        )
        .route(
            "/api/add-character",
            post(|State(s): State<Arc<MockState>>, Json(body): Json<Value>| async move {
                s.log
                    .push(format!("add_character:{}", body["account"].as_str().unwrap_or_default()));
                let (code, body) = s.config.initiate.clone();
                (status(code), Json(body))
            }),
        )
        .route(
            "/api/finalize-login",
            post(
                |State(s): State<Arc<MockState>>,
                 Query(q): Query<HashMap<String, String>>| async move {
                    let state = q.get("state").cloned().unwrap_or_default();
                    s.log.push(format!("finalize:{state}"));
                    let idx = s.finalize_calls.fetch_add(1, Ordering::SeqCst) as usize;
                    status(scripted(&s.config.finalize, idx, 500))
                },
            ),
        )
        .route(
            "/api/app-data-no-cache",
            get(|State(s): State<Arc<MockState>>| async move {
                s.log.push("app_data");
                let idx = s.app_data_calls.fetch_add(1, Ordering::SeqCst) as usize;
                let (code, body) = scripted(&s.config.app_data, idx, (500, Value::Null));
                (status(code), Json(body))
            }),
        )
        .route(
            "/api/logout",
            post(|State(s): State<Arc<MockState>>| async move {
                s.log.push("logout");
                status(s.config.logout)
            }),
        )
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok(MockBackend { addr, log })
}

/// Serve the control API on an ephemeral port.
pub async fn spawn_api_server(
    state: Arc<crate::state::AppState>,
) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let router = crate::transport::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((addr, handle))
}

/// Convert any `Display` error into `anyhow::Error`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
