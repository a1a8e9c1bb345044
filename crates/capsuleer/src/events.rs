// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization flow events broadcast to local observers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::finalize::FlowKind;

/// Events emitted by the flow manager and session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    /// Polling started. When this process initiated the authorization the
    /// user should now finish it at `redirect_url`.
    FlowStarted {
        flow_id: Uuid,
        kind: FlowKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        redirect_url: Option<String>,
    },
    /// The backend finalized the authorization and the new data is visible.
    FlowCompleted { flow_id: Uuid, kind: FlowKind, attempts: u32 },
    /// The attempt budget ran out before the flow completed.
    FlowAbandoned { flow_id: Uuid, kind: FlowKind, attempts: u32, finalized: bool },
    /// The flow was cancelled (superseded, torn down, logout, or shutdown).
    FlowCancelled { flow_id: Uuid, kind: FlowKind, attempts: u32 },
    /// The session became authenticated.
    LoggedIn,
    /// The session was logged out.
    LoggedOut,
}

impl AuthEvent {
    /// Flow this event belongs to, if any.
    pub fn flow_id(&self) -> Option<Uuid> {
        match self {
            Self::FlowStarted { flow_id, .. }
            | Self::FlowCompleted { flow_id, .. }
            | Self::FlowAbandoned { flow_id, .. }
            | Self::FlowCancelled { flow_id, .. } => Some(*flow_id),
            Self::LoggedIn | Self::LoggedOut => None,
        }
    }

    /// Whether this event ends a flow.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::FlowCompleted { .. } | Self::FlowAbandoned { .. } | Self::FlowCancelled { .. }
        )
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
