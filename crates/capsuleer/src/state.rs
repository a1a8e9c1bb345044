// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::flow::FlowManager;

/// Shared state for the local control API.
pub struct AppState {
    pub flows: Arc<FlowManager>,
    /// Bearer token for the local API. `None` disables auth.
    pub auth_token: Option<String>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        flows: Arc<FlowManager>,
        auth_token: Option<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self { flows, auth_token, shutdown }
    }
}
