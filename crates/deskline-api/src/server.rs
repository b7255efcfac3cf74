// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! API HTTP server built on axum.
//!
//! Sets up routes, middleware and shared state.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    routing::{get, post, put},
};
use deskline_config::model::ApiConfig;
use deskline_core::DesklineError;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::handlers;
use crate::ws;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<Engine>,
    /// Process start time for uptime calculation.
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            started_at: Instant::now(),
        }
    }
}

/// Builds the full route table.
pub fn router(state: ApiState) -> Router {
    let tickets = Router::new()
        .route("/v1/tenants/{tenant}/tickets", get(handlers::list_tickets))
        .route("/v1/tickets/{id}", get(handlers::get_ticket))
        .route("/v1/tickets/{id}/claim", post(handlers::claim_ticket))
        .route(
            "/v1/tickets/{id}/transfer-queue",
            post(handlers::transfer_to_queue),
        )
        .route(
            "/v1/tickets/{id}/transfer-agent",
            post(handlers::transfer_to_agent),
        )
        .route("/v1/tickets/{id}/resolve", post(handlers::resolve_ticket))
        .route(
            "/v1/tickets/{id}/return-to-queue",
            post(handlers::return_to_queue),
        )
        .route("/v1/tickets/{id}/read", post(handlers::acknowledge_read))
        .route(
            "/v1/tickets/{id}/messages",
            post(handlers::send_message).get(handlers::list_messages),
        )
        .route("/v1/tickets/{id}/stream", get(ws::stream_ticket))
        .route("/v1/messages/{id}/status", post(handlers::post_receipt))
        .route("/v1/inbound", post(handlers::post_inbound));

    let instances = Router::new()
        .route(
            "/v1/tenants/{tenant}/instances",
            post(handlers::create_instance).get(handlers::list_instances),
        )
        .route(
            "/v1/instances/{id}",
            get(handlers::get_instance).delete(handlers::delete_instance),
        )
        .route("/v1/instances/{id}/pair", post(handlers::pair_instance))
        .route(
            "/v1/instances/{id}/disconnect",
            post(handlers::disconnect_instance),
        )
        .route("/v1/instances/{id}/events", post(handlers::post_gateway_event));

    let tenants = Router::new()
        .route(
            "/v1/tenants/{tenant}/queues",
            post(handlers::create_queue).get(handlers::list_queues),
        )
        .route(
            "/v1/queues/{id}",
            axum::routing::delete(handlers::delete_queue),
        )
        .route(
            "/v1/tenants/{tenant}/agents",
            post(handlers::register_agent).get(handlers::list_agents),
        )
        .route("/v1/agents/{id}/presence", put(handlers::set_presence))
        .route(
            "/v1/tenants/{tenant}/auto-reply",
            get(handlers::get_auto_reply).put(handlers::put_auto_reply),
        )
        .route(
            "/v1/tenants/{tenant}/settings",
            get(handlers::get_tenant_settings).put(handlers::put_tenant_settings),
        );

    Router::new()
        .route("/health", get(handlers::get_health))
        .merge(tickets)
        .merge(instances)
        .merge(tenants)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Binds `config.host:config.port` and serves until `shutdown` is cancelled.
pub async fn serve(
    config: &ApiConfig,
    state: ApiState,
    shutdown: CancellationToken,
) -> Result<(), DesklineError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DesklineError::Internal(format!("failed to bind API to {addr}: {e}")))?;

    tracing::info!("API server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| DesklineError::Internal(format!("API server error: {e}")))?;

    tracing::info!("API server stopped");
    Ok(())
}
