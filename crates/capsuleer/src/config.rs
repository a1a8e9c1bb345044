// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::finalize::PollPolicy;

/// Login and character authorization agent for the capsuleer backend.
#[derive(Debug, Parser)]
#[command(name = "capsuleer", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub backend: BackendConfig,

    #[command(flatten)]
    pub poll: PollConfig,

    /// Log format (json or text).
    #[arg(long, env = "CAPSULEER_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "CAPSULEER_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the local control API for a renderer process.
    Serve(ServeConfig),
    /// Log in with an account and wait for the browser authorization to finish.
    Login(AccountArgs),
    /// Authorize an additional character and wait until it shows up.
    AddCharacter(AccountArgs),
    /// Log out of the backend.
    Logout,
}

#[derive(Debug, Clone, clap::Args)]
pub struct AccountArgs {
    /// Account the authorization is attached to.
    #[arg(long)]
    pub account: String,
}

/// Where the backend lives and how to talk to it.
#[derive(Debug, Clone, clap::Args)]
pub struct BackendConfig {
    /// Base URL of the backend REST API.
    #[arg(long, env = "CAPSULEER_BACKEND_URL", default_value = "http://127.0.0.1:8080", global = true)]
    pub backend_url: String,

    /// Bearer token for backend requests.
    #[arg(long, env = "CAPSULEER_BACKEND_TOKEN", global = true)]
    pub backend_token: Option<String>,

    /// Per-request timeout in milliseconds.
    #[arg(long, env = "CAPSULEER_REQUEST_TIMEOUT_MS", default_value_t = 10_000, global = true)]
    pub request_timeout_ms: u64,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Finalization poller tuning.
#[derive(Debug, Clone, clap::Args)]
pub struct PollConfig {
    /// Interval between finalization attempts in milliseconds.
    #[arg(long, env = "CAPSULEER_POLL_INTERVAL_MS", default_value_t = 5_000, global = true)]
    pub poll_interval_ms: u64,

    /// Attempts before a pending authorization is abandoned.
    #[arg(long, env = "CAPSULEER_MAX_ATTEMPTS", default_value_t = 5, global = true)]
    pub max_attempts: u32,

    /// Skip the last data refresh when an authorization is abandoned.
    #[arg(long, env = "CAPSULEER_NO_FINAL_REFRESH", global = true)]
    pub no_final_refresh: bool,
}

impl PollConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.poll_interval(),
            max_attempts: self.max_attempts,
            final_refresh: !self.no_final_refresh,
        }
    }
}

/// Local control API listener.
#[derive(Debug, Clone, clap::Args)]
pub struct ServeConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "CAPSULEER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9810, env = "CAPSULEER_PORT")]
    pub port: u16,

    /// Bearer token for the local API. If unset, auth is disabled.
    #[arg(long, env = "CAPSULEER_AUTH_TOKEN")]
    pub auth_token: Option<String>,
}

impl Cli {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        let url = self.backend.backend_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("--backend-url must be an http(s) URL, got {url:?}");
        }
        if self.poll.poll_interval_ms == 0 {
            anyhow::bail!("--poll-interval-ms must be greater than zero");
        }
        if self.backend.request_timeout_ms == 0 {
            anyhow::bail!("--request-timeout-ms must be greater than zero");
        }
        if self.poll.max_attempts == 0 {
            anyhow::bail!("--max-attempts must be at least 1");
        }
        if let Command::Login(ref args) | Command::AddCharacter(ref args) = self.command {
            if args.account.trim().is_empty() {
                anyhow::bail!("--account must not be empty");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
