// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow manager: initiates authorizations and owns the single active poller.
//!
//! Only one flow runs at a time. Starting another cancels the current one
//! before the new poller is spawned, so login and add-character never race
//! on the session flags.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::appdata::{AppDataStore, RefreshProbe};
use crate::backend::BackendClient;
use crate::events::AuthEvent;
use crate::finalize::{run_finalization, FlowKind, Outcome, PollPolicy, SuccessAction};
use crate::session::SessionStore;

/// Returned to whoever started a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowTicket {
    pub flow_id: Uuid,
    pub kind: FlowKind,
    pub redirect_url: String,
}

/// Public view of the running flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowInfo {
    pub flow_id: Uuid,
    pub kind: FlowKind,
    pub started_at_ms: u64,
}

struct ActiveFlow {
    info: FlowInfo,
    cancel: CancellationToken,
}

pub struct FlowManager {
    backend: Arc<BackendClient>,
    session: Arc<SessionStore>,
    data: Arc<AppDataStore>,
    policy: PollPolicy,
    active: Mutex<Option<ActiveFlow>>,
    event_tx: broadcast::Sender<AuthEvent>,
    shutdown: CancellationToken,
}

impl FlowManager {
    /// Every poller runs under a child of `shutdown`.
    pub fn new(
        backend: Arc<BackendClient>,
        policy: PollPolicy,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            session: SessionStore::new(event_tx.clone()),
            data: AppDataStore::new(Arc::clone(&backend)),
            backend,
            policy,
            active: Mutex::new(None),
            event_tx,
            shutdown,
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn app_data(&self) -> &Arc<AppDataStore> {
        &self.data
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.event_tx.subscribe()
    }

    pub async fn active_flow(&self) -> Option<FlowInfo> {
        self.active.lock().await.as_ref().map(|f| f.info.clone())
    }

    /// Mark the session authenticated if the backend already serves data for
    /// at least one account.
    pub async fn restore_session(&self) -> bool {
        match self.data.refresh().await {
            Ok(data) if !data.accounts.is_empty() => {
                self.session.mark_authenticated().await;
                true
            }
            Ok(_) => false,
            Err(e) => {
                debug!(err = %e, "no session to restore");
                false
            }
        }
    }

    /// Initiate an authorization with the backend and start polling for it.
    pub async fn begin(self: &Arc<Self>, kind: FlowKind, account: &str) -> anyhow::Result<FlowTicket> {
        if kind == FlowKind::AddCharacter && self.data.snapshot().await.is_none() {
            // Baseline for detecting the new character.
            if let Err(e) = self.data.refresh().await {
                debug!(err = %e, "could not prime app data before add-character");
            }
        }

        let auth = self
            .backend
            .begin_authorization(kind, account)
            .await
            .with_context(|| format!("{kind} request failed"))?;

        let flow_id = self.launch(kind, auth.state, Some(auth.redirect_url.clone())).await?;
        info!(%flow_id, %kind, url = %auth.redirect_url, "please authenticate in your browser");
        Ok(FlowTicket { flow_id, kind, redirect_url: auth.redirect_url })
    }

    /// Start polling for a `state` obtained elsewhere.
    pub async fn start_finalization(
        self: &Arc<Self>,
        kind: FlowKind,
        state: String,
    ) -> anyhow::Result<Uuid> {
        self.launch(kind, state, None).await
    }

    async fn launch(
        self: &Arc<Self>,
        kind: FlowKind,
        state: String,
        redirect_url: Option<String>,
    ) -> anyhow::Result<Uuid> {
        if state.trim().is_empty() {
            anyhow::bail!("authorization state must not be empty");
        }

        let probe = RefreshProbe::for_flow(kind, Arc::clone(&self.data)).await;
        let flow_id = Uuid::new_v4();
        let cancel = self.shutdown.child_token();

        {
            let mut active = self.active.lock().await;
            if let Some(prev) = active.take() {
                info!(flow_id = %prev.info.flow_id, kind = %prev.info.kind, "superseding running flow");
                prev.cancel.cancel();
            }
            *active = Some(ActiveFlow {
                info: FlowInfo { flow_id, kind, started_at_ms: epoch_ms() },
                cancel: cancel.clone(),
            });
            let _ = self.event_tx.send(AuthEvent::FlowStarted { flow_id, kind, redirect_url });
        }

        let manager = Arc::clone(self);
        tokio::spawn(
            async move {
                let action = SuccessAction::for_flow(kind, &manager.session);
                let outcome = run_finalization(
                    &state,
                    manager.backend.as_ref(),
                    &probe,
                    manager.policy,
                    &action,
                    &cancel,
                )
                .await;
                manager.finish(flow_id, kind, outcome).await;
            }
            .instrument(tracing::info_span!("finalize", %flow_id, %kind)),
        );

        Ok(flow_id)
    }

    async fn finish(&self, flow_id: Uuid, kind: FlowKind, outcome: Outcome) {
        {
            let mut active = self.active.lock().await;
            if active.as_ref().is_some_and(|f| f.info.flow_id == flow_id) {
                *active = None;
            }
        }

        let event = match outcome {
            Outcome::Done { attempts } => AuthEvent::FlowCompleted { flow_id, kind, attempts },
            Outcome::Abandoned { attempts, finalized } => {
                AuthEvent::FlowAbandoned { flow_id, kind, attempts, finalized }
            }
            Outcome::Cancelled { attempts } => {
                debug!(attempts, "flow cancelled");
                AuthEvent::FlowCancelled { flow_id, kind, attempts }
            }
        };
        let _ = self.event_tx.send(event);
    }

    /// Cancel the running flow, if any.
    pub async fn cancel(&self) -> bool {
        let prev = self.active.lock().await.take();
        match prev {
            Some(flow) => {
                info!(flow_id = %flow.info.flow_id, kind = %flow.info.kind, "cancelling flow");
                flow.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel any flow, log out of the backend, and drop cached data.
    ///
    /// Local state is cleared even when the backend call fails; the return
    /// value reports whether the backend acknowledged the logout.
    pub async fn logout(&self) -> bool {
        self.cancel().await;
        let acknowledged = match self.backend.logout().await {
            Ok(()) => true,
            Err(e) => {
                warn!(err = %e, "backend logout failed");
                false
            }
        };
        self.data.clear().await;
        self.session.mark_logged_out().await;
        acknowledged
    }
}

/// Wait for the terminal event of `flow_id`. Returns `None` if the channel
/// closes first.
///
/// Subscribe before starting the flow, or the event may already be gone.
pub async fn wait_for_terminal(
    rx: &mut broadcast::Receiver<AuthEvent>,
    flow_id: Uuid,
) -> Option<AuthEvent> {
    loop {
        match rx.recv().await {
            Ok(event) if event.is_terminal() && event.flow_id() == Some(flow_id) => {
                return Some(event)
            }
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "flow_tests.rs"]
mod tests;
