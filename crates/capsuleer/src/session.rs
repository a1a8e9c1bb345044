// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication flags shared by the pollers and the local API.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::events::AuthEvent;

/// Session flags as seen by the renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub logged_out: bool,
}

/// Owner of [`SessionState`]. All writes go through here so transitions are
/// broadcast exactly once.
pub struct SessionStore {
    state: RwLock<SessionState>,
    event_tx: broadcast::Sender<AuthEvent>,
}

impl SessionStore {
    pub fn new(event_tx: broadcast::Sender<AuthEvent>) -> Arc<Self> {
        Arc::new(Self { state: RwLock::new(SessionState::default()), event_tx })
    }

    pub async fn snapshot(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated
    }

    /// Mark the session authenticated. Emits `LoggedIn` on the transition.
    pub async fn mark_authenticated(&self) {
        let mut state = self.state.write().await;
        let changed = !state.is_authenticated;
        state.is_authenticated = true;
        state.logged_out = false;
        drop(state);
        if changed {
            tracing::info!("session authenticated");
            let _ = self.event_tx.send(AuthEvent::LoggedIn);
        }
    }

    /// Mark the session logged out. Emits `LoggedOut` on the transition.
    pub async fn mark_logged_out(&self) {
        let mut state = self.state.write().await;
        let changed = !state.logged_out;
        state.is_authenticated = false;
        state.logged_out = true;
        drop(state);
        if changed {
            tracing::info!("session logged out");
            let _ = self.event_tx.send(AuthEvent::LoggedOut);
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
