// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capsuleer: completes the login and add-character authorization flows of
//! an EVE tool backend by polling until the session is usable.

pub mod appdata;
pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod finalize;
pub mod flow;
pub mod session;
pub mod state;
pub mod transport;

#[doc(hidden)]
pub mod test_support;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::backend::BackendClient;
use crate::config::{Cli, Command, ServeConfig};
use crate::events::AuthEvent;
use crate::finalize::FlowKind;
use crate::flow::{wait_for_terminal, FlowManager};
use crate::state::AppState;
use crate::transport::build_router;

/// Exit code for a flow that completed.
pub const EXIT_DONE: i32 = 0;
/// Exit code for a fatal error.
pub const EXIT_FAILED: i32 = 1;
/// Exit code for a flow that was abandoned or cancelled.
pub const EXIT_INCOMPLETE: i32 = 2;

/// Install the process-wide rustls crypto provider. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Run the parsed command line. Returns the process exit code.
pub async fn run(cli: Cli) -> anyhow::Result<i32> {
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let backend = Arc::new(BackendClient::from_config(&cli.backend));
    let flows = FlowManager::new(backend, cli.poll.policy(), shutdown.clone());

    match cli.command {
        Command::Serve(config) => {
            serve(flows, config, shutdown).await?;
            Ok(EXIT_DONE)
        }
        Command::Login(args) => run_flow(&flows, FlowKind::Login, &args.account).await,
        Command::AddCharacter(args) => {
            // Adding a character needs a live session.
            flows.restore_session().await;
            run_flow(&flows, FlowKind::AddCharacter, &args.account).await
        }
        Command::Logout => {
            if flows.logout().await {
                println!("logged out");
                Ok(EXIT_DONE)
            } else {
                println!("logged out locally; backend did not acknowledge");
                Ok(EXIT_FAILED)
            }
        }
    }
}

/// Serve the local control API until `shutdown` is cancelled.
pub async fn serve(
    flows: Arc<FlowManager>,
    config: ServeConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    if flows.restore_session().await {
        info!("restored existing backend session");
    }

    let state = Arc::new(AppState::new(flows, config.auth_token, shutdown.clone()));
    let router = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("capsuleer listening on {addr}");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;
    Ok(())
}

/// Initiate a flow, print the browser URL, and wait for it to end.
pub async fn run_flow(flows: &Arc<FlowManager>, kind: FlowKind, account: &str) -> anyhow::Result<i32> {
    let mut rx = flows.subscribe();
    let ticket = flows.begin(kind, account).await?;
    println!("{}", ticket.redirect_url);

    let code = match wait_for_terminal(&mut rx, ticket.flow_id).await {
        Some(AuthEvent::FlowCompleted { attempts, .. }) => {
            info!(attempts, "{kind} complete");
            EXIT_DONE
        }
        Some(_) => EXIT_INCOMPLETE,
        None => anyhow::bail!("event channel closed before {kind} finished"),
    };
    Ok(code)
}

/// Cancel `shutdown` on SIGTERM or SIGINT.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();
    });
}
