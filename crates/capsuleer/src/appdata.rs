// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cached application snapshot and the refresh probe the poller uses.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::backend::BackendClient;
use crate::finalize::{DataRefresh, FlowKind};

/// Application snapshot from `/api/app-data-no-cache`.
///
/// Only accounts and characters are interpreted; everything else (skill
/// plans, sync settings, ...) is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub unassigned_characters: Vec<Character>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub name: String,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    #[serde(default)]
    pub character_id: i64,
    #[serde(default)]
    pub character_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AppData {
    /// Characters across all accounts plus unassigned ones.
    pub fn character_count(&self) -> usize {
        self.accounts.iter().map(|a| a.characters.len()).sum::<usize>()
            + self.unassigned_characters.len()
    }
}

/// Latest snapshot fetched from the backend.
pub struct AppDataStore {
    backend: Arc<BackendClient>,
    snapshot: RwLock<Option<AppData>>,
}

impl AppDataStore {
    pub fn new(backend: Arc<BackendClient>) -> Arc<Self> {
        Arc::new(Self { backend, snapshot: RwLock::new(None) })
    }

    /// Fetch a fresh snapshot and cache it.
    pub async fn refresh(&self) -> anyhow::Result<AppData> {
        let data = self.backend.fetch_app_data().await?;
        *self.snapshot.write().await = Some(data.clone());
        Ok(data)
    }

    pub async fn snapshot(&self) -> Option<AppData> {
        self.snapshot.read().await.clone()
    }

    pub async fn clear(&self) {
        *self.snapshot.write().await = None;
    }
}

/// When a refreshed snapshot counts as reflecting the authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// Any successfully fetched snapshot.
    AnyData,
    /// More characters than the given baseline.
    CharactersAbove(usize),
}

impl Expectation {
    pub fn is_met(&self, data: &AppData) -> bool {
        match self {
            Self::AnyData => true,
            Self::CharactersAbove(baseline) => data.character_count() > *baseline,
        }
    }
}

/// [`DataRefresh`] over an [`AppDataStore`] with a flow-specific expectation.
pub struct RefreshProbe {
    store: Arc<AppDataStore>,
    expect: Expectation,
}

impl RefreshProbe {
    pub fn new(store: Arc<AppDataStore>, expect: Expectation) -> Self {
        Self { store, expect }
    }

    /// Build the probe for `kind`.
    ///
    /// Adding a character needs a baseline count; without a cached snapshot
    /// one is fetched first (a failed fetch counts as zero characters).
    pub async fn for_flow(kind: FlowKind, store: Arc<AppDataStore>) -> Self {
        let expect = match kind {
            FlowKind::Login => Expectation::AnyData,
            FlowKind::AddCharacter => {
                let baseline = match store.snapshot().await {
                    Some(data) => data.character_count(),
                    None => match store.refresh().await {
                        Ok(data) => data.character_count(),
                        Err(e) => {
                            tracing::debug!(err = %e, "baseline fetch failed");
                            0
                        }
                    },
                };
                Expectation::CharactersAbove(baseline)
            }
        };
        Self::new(store, expect)
    }

    pub fn expectation(&self) -> Expectation {
        self.expect
    }
}

impl DataRefresh for RefreshProbe {
    fn refresh(&self) -> BoxFuture<'_, anyhow::Result<bool>> {
        async move {
            let data = self.store.refresh().await?;
            Ok(self.expect.is_met(&data))
        }
        .boxed()
    }
}

#[cfg(test)]
#[path = "appdata_tests.rs"]
mod tests;
