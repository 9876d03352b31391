//! Tasklane API Server
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tasklane_api::{create_router, routes::with_http_layers, state::AppState};
use tasklane_core::AppConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::load().context("invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.logging.level)));
    if config.logging.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    if config.auth.jwt_secret.is_none() {
        tracing::warn!("JWT_SECRET not set; tokens will not survive a restart");
    }

    // Open the document store
    let store = tasklane_store::connect(&config)
        .await
        .context("failed to open document store")?;

    // Create application state
    let state = Arc::new(AppState::build(config.clone(), store)?);

    let shutdown = CancellationToken::new();
    let housekeeping = state
        .sessions
        .spawn_housekeeping(config.housekeeping_interval(), shutdown.clone());

    // Create router
    let app = with_http_layers(create_router(Arc::clone(&state)), &config.server);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Tasklane API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(state, shutdown.clone()))
    .await?;

    shutdown.cancel();
    housekeeping.await?;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>, shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        }
        _ = shutdown.cancelled() => {}
    }

    tracing::info!("Shutdown requested, draining connections");
    state.set_ready(false);
    shutdown.cancel();
}
