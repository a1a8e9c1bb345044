// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Finalization poller for browser-completed OAuth authorizations.
//!
//! After `/api/login` or `/api/add-character` hands out a `state` token the
//! user finishes SSO in a browser we cannot observe. The poller ticks on a
//! fixed interval and walks a two-phase state machine:
//!
//! ```text
//! NotFinalized --finalize ok--> FinalizedPendingData --refresh ok--> Done
//!      |                               |
//!      +--------- budget spent --------+--> Abandoned
//! ```
//!
//! Finalize is only issued until it first succeeds; after that only the data
//! refresh is retried. Errors of either call are retry signals, never
//! surfaced to the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::SessionStore;

/// Which authorization flow a poller is finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Login,
    AddCharacter,
}

impl FlowKind {
    /// Backend endpoint that starts this flow.
    pub fn initiate_path(&self) -> &'static str {
        match self {
            Self::Login => "/api/login",
            Self::AddCharacter => "/api/add-character",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::AddCharacter => "add_character",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completes the server-side token exchange for a `state` token.
pub trait FinalizeApi: Send + Sync {
    fn finalize<'a>(&'a self, state: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Re-fetches application data. `Ok(true)` means the authorized
/// account or character is now visible.
pub trait DataRefresh: Send + Sync {
    fn refresh(&self) -> BoxFuture<'_, anyhow::Result<bool>>;
}

/// Pacing and budget for one poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Time between ticks. The first tick fires one interval after start.
    pub interval: Duration,
    /// Ticks allowed before giving up.
    pub max_attempts: u32,
    /// Run one unconditional refresh when giving up before finalization.
    pub final_refresh: bool,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self { interval: Duration::from_secs(5), max_attempts: 5, final_refresh: true }
    }
}

/// Position in the finalization state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NotFinalized,
    FinalizedPendingData,
    Done,
    Abandoned,
}

/// Progress of one poller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollAttempt {
    pub attempt_number: u32,
    pub finalized: bool,
    pub data_fetched: bool,
}

/// What a completed flow changes besides the refreshed data.
pub enum SuccessAction {
    /// Mark the session authenticated (login).
    Authenticate(Arc<SessionStore>),
    /// Nothing; the refresh already carried the new data (add character).
    RefreshOnly,
}

impl SuccessAction {
    pub fn for_flow(kind: FlowKind, session: &Arc<SessionStore>) -> Self {
        match kind {
            FlowKind::Login => Self::Authenticate(Arc::clone(session)),
            FlowKind::AddCharacter => Self::RefreshOnly,
        }
    }

    async fn apply(&self) {
        match self {
            Self::Authenticate(session) => session.mark_authenticated().await,
            Self::RefreshOnly => {}
        }
    }
}

/// How a poller ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done { attempts: u32 },
    Abandoned { attempts: u32, finalized: bool },
    Cancelled { attempts: u32 },
}

impl Outcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Done { attempts }
            | Self::Abandoned { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}

/// The finalization state machine, advanced one tick at a time.
pub struct FinalizationPoll<'a> {
    state: &'a str,
    finalize: &'a dyn FinalizeApi,
    refresh: &'a dyn DataRefresh,
    attempt: PollAttempt,
    abandoned: bool,
}

impl<'a> FinalizationPoll<'a> {
    pub fn new(state: &'a str, finalize: &'a dyn FinalizeApi, refresh: &'a dyn DataRefresh) -> Self {
        Self { state, finalize, refresh, attempt: PollAttempt::default(), abandoned: false }
    }

    pub fn attempt(&self) -> PollAttempt {
        self.attempt
    }

    pub fn phase(&self) -> Phase {
        if self.attempt.data_fetched {
            Phase::Done
        } else if self.abandoned {
            Phase::Abandoned
        } else if self.attempt.finalized {
            Phase::FinalizedPendingData
        } else {
            Phase::NotFinalized
        }
    }

    /// Run one tick: finalize if still needed, then refresh once finalized.
    pub async fn tick(&mut self) -> Phase {
        if matches!(self.phase(), Phase::Done | Phase::Abandoned) {
            return self.phase();
        }
        self.attempt.attempt_number += 1;
        let attempt = self.attempt.attempt_number;

        if !self.attempt.finalized {
            match self.finalize.finalize(self.state).await {
                Ok(()) => {
                    info!(attempt, "authorization finalized");
                    self.attempt.finalized = true;
                }
                Err(e) => {
                    debug!(attempt, err = %e, "authorization not finalized yet");
                    return self.phase();
                }
            }
        }

        match self.refresh.refresh().await {
            Ok(true) => self.attempt.data_fetched = true,
            Ok(false) => debug!(attempt, "refreshed data does not reflect authorization yet"),
            Err(e) => debug!(attempt, err = %e, "data refresh failed"),
        }
        self.phase()
    }

    /// Stop the machine unless it already completed.
    fn abandon(&mut self) {
        if !self.attempt.data_fetched {
            self.abandoned = true;
        }
    }
}

/// Drive a [`FinalizationPoll`] on `policy.interval` until it completes, the
/// budget runs out, or `cancel` fires. A zero interval is abandoned without
/// any backend call.
///
/// Ticks run back to back inside this future, so a slow request delays the
/// next tick instead of overlapping with it. Cancellation interrupts an
/// in-flight request.
pub async fn run_finalization(
    state: &str,
    finalize: &dyn FinalizeApi,
    refresh: &dyn DataRefresh,
    policy: PollPolicy,
    on_success: &SuccessAction,
    cancel: &CancellationToken,
) -> Outcome {
    if policy.interval.is_zero() {
        // tokio intervals reject a zero period.
        warn!("poll interval is zero, giving up on authorization");
        return Outcome::Abandoned { attempts: 0, finalized: false };
    }

    let mut poll = FinalizationPoll::new(state, finalize, refresh);
    let mut ticker = tokio::time::interval_at(Instant::now() + policy.interval, policy.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Outcome::Cancelled { attempts: poll.attempt().attempt_number };
            }
            _ = ticker.tick() => {}
        }

        let phase = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            phase = poll.tick() => Some(phase),
        };
        let attempt = poll.attempt();
        let Some(phase) = phase else {
            return Outcome::Cancelled { attempts: attempt.attempt_number };
        };

        if phase == Phase::Done {
            on_success.apply().await;
            info!(attempts = attempt.attempt_number, "authorization complete");
            return Outcome::Done { attempts: attempt.attempt_number };
        }

        if attempt.attempt_number >= policy.max_attempts {
            poll.abandon();
            if !attempt.finalized && policy.final_refresh {
                let last = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    r = refresh.refresh() => Some(r),
                };
                if let Some(Err(e)) = last {
                    debug!(err = %e, "final data refresh failed");
                }
            }
            warn!(
                attempts = attempt.attempt_number,
                finalized = attempt.finalized,
                "giving up on authorization"
            );
            return Outcome::Abandoned {
                attempts: attempt.attempt_number,
                finalized: attempt.finalized,
            };
        }
    }
}

#[cfg(test)]
#[path = "finalize_tests.rs"]
mod tests;
