// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! harness - terminal multiplexer for AI coding agents.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use harness_cli::commands::gateway;
use harness_cli::exit_error::ExitError;
use harness_cli::settings::{GatewayFlags, Settings, SettingsError};

#[derive(Parser)]
#[command(name = "harness", version, about = "Terminal multiplexer for AI coding agents")]
struct Cli {
    /// Scope runtime state under a named session
    #[arg(long, global = true, value_name = "name")]
    session: Option<String>,

    #[command(subcommand)]
    command: Option<TopCommand>,
}

#[derive(Subcommand)]
enum TopCommand {
    /// Gateway daemon control
    Gateway {
        #[command(subcommand)]
        command: GatewayCommand,
    },
}

#[derive(Args, Clone, Default)]
struct StartFlags {
    /// Listen host (loopback unless an auth token is set)
    #[arg(long)]
    host: Option<String>,
    /// Listen port (ephemeral when omitted)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,
    /// Token clients must present; required for non-loopback hosts
    #[arg(long)]
    auth_token: Option<String>,
    /// Control-plane database path
    #[arg(long)]
    state_db_path: Option<PathBuf>,
}

impl From<&StartFlags> for GatewayFlags {
    fn from(flags: &StartFlags) -> Self {
        Self {
            host: flags.host.clone(),
            port: flags.port,
            auth_token: flags.auth_token.clone(),
            state_db_path: flags.state_db_path.clone(),
        }
    }
}

#[derive(Subcommand)]
enum GatewayCommand {
    /// Start the gateway daemon in the background
    Start(StartFlags),
    /// Run the gateway daemon in the foreground
    Run(StartFlags),
    /// Stop the gateway daemon
    Stop {
        /// Escalate to SIGKILL when the daemon does not exit in time
        #[arg(long)]
        force: bool,
        /// Exit-wait deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Reap orphaned helper processes after stopping (default)
        #[arg(long, overrides_with = "no_cleanup_orphans")]
        cleanup_orphans: bool,
        /// Skip orphan cleanup
        #[arg(long, overrides_with = "cleanup_orphans")]
        no_cleanup_orphans: bool,
    },
    /// Show gateway reachability and session counts
    Status,
    /// Forced stop followed by start on the same port
    Restart(StartFlags),
    /// Remove dead week-old named-session directories
    Gc,
    /// One-shot RPC against the running gateway
    Call {
        /// Stream command as JSON, e.g. '{"type":"session.list"}'
        #[arg(long)]
        json: String,
    },
    /// Print the tail of the gateway log
    Logs {
        /// Number of trailing lines
        #[arg(short = 'n', long, default_value = "200")]
        limit: usize,
    },
}

fn resolve_settings(
    session: Option<&str>,
    flags: &GatewayFlags,
) -> Result<Settings, ExitError> {
    Settings::resolve(session, flags).map_err(|err| match err {
        SettingsError::Paths(_) | SettingsError::InvalidPort(_) => {
            ExitError::usage(err.to_string())
        }
        other => ExitError::failure(other.to_string()),
    })
}

async fn dispatch(cli: Cli) -> Result<(), ExitError> {
    let session = cli.session.as_deref();
    match cli.command {
        Some(TopCommand::Gateway { command }) => match command {
            GatewayCommand::Start(flags) => {
                let settings = resolve_settings(session, &(&flags).into())?;
                gateway::start(&settings).await
            }
            GatewayCommand::Run(flags) => {
                let settings = resolve_settings(session, &(&flags).into())?;
                gateway::run(&settings).await
            }
            GatewayCommand::Stop { force, timeout_ms, cleanup_orphans: _, no_cleanup_orphans } => {
                let settings = resolve_settings(session, &GatewayFlags::default())?;
                gateway::stop(&settings, force, timeout_ms, !no_cleanup_orphans).await
            }
            GatewayCommand::Status => {
                let settings = resolve_settings(session, &GatewayFlags::default())?;
                gateway::status(&settings).await
            }
            GatewayCommand::Restart(flags) => {
                let settings = resolve_settings(session, &(&flags).into())?;
                gateway::restart(&settings).await
            }
            GatewayCommand::Gc => {
                // gc sweeps the whole workspace's sessions tree; a session
                // scope has no meaning here and is not part of the surface.
                if session.is_some() {
                    return Err(ExitError::usage(
                        "--session is not accepted by 'gateway gc'",
                    ));
                }
                let settings = resolve_settings(None, &GatewayFlags::default())?;
                gateway::gc(&settings)
            }
            GatewayCommand::Call { json } => {
                let settings = resolve_settings(session, &GatewayFlags::default())?;
                gateway::call(&settings, &json).await
            }
            GatewayCommand::Logs { limit } => {
                let settings = resolve_settings(session, &GatewayFlags::default())?;
                gateway::logs(&settings, limit)
            }
        },
        None => {
            // Bare invocation: make sure the workspace gateway is up, the
            // way the mux client does before attaching.
            let settings = resolve_settings(session, &GatewayFlags::default())?;
            gateway::start(&settings).await?;
            println!("attach a harness client to use the terminal UI");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("harness: {err}");
            std::process::ExitCode::from(err.code)
        }
    }
}
