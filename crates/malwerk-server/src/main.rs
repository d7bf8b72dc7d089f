// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Malwerk contributors
//
// Malwerk — coloring-book line-art service
//
// Entry point. Initialises logging, reads the environment configuration, and
// runs the HTTP server until interrupted.

use malwerk_core::config::AppConfig;
use malwerk_server::ArtServer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Malwerk starting");

    let config = AppConfig::from_env();
    let mut server = ArtServer::new(config);

    if let Err(e) = server.start().await {
        tracing::error!(error = %e, "failed to start the art server");
        std::process::exit(1);
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
    }

    if let Err(e) = server.stop().await {
        tracing::error!(error = %e, "error during shutdown");
    }
}
