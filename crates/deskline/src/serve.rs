// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `deskline serve` command implementation.
//!
//! Opens SQLite storage, wires the gateway client, pairing manager, ticket
//! router, auto-reply engine and synchronizer, then serves the API until
//! SIGINT or SIGTERM.

use std::sync::Arc;

use deskline_api::{ApiState, Engine};
use deskline_config::DesklineConfig;
use deskline_core::DesklineError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs the `deskline serve` command.
pub async fn run_serve(config: DesklineConfig) -> Result<(), DesklineError> {
    init_tracing(&config.service.log_level);

    info!(name = %config.service.name, "starting deskline serve");

    let engine = Arc::new(Engine::from_config(&config).await?);

    // Attempts interrupted by a restart can never complete.
    let recovered = engine.pairing.recover_stale().await?;
    if recovered > 0 {
        info!(count = recovered, "stale pairing attempts marked failed");
    }

    let cancel = install_signal_handler();
    let served = deskline_api::serve(&config.api, ApiState::new(engine.clone()), cancel).await;

    info!("draining background work");
    let drained = engine.shutdown().await;

    served?;
    drained?;
    info!("deskline serve shutdown complete");
    Ok(())
}

/// Installs handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            info!("received SIGINT (Ctrl+C), initiating shutdown");
                        }
                        _ = sigterm.recv() => {
                            info!("received SIGTERM, initiating shutdown");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler, only Ctrl+C will stop the server");
                    let _ = ctrl_c.await;
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("deskline={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
