// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::{Router, middleware as axum_middleware, routing::get};
use deskline_core::{AgentDirectory, Authenticator, DeskDirectory, DesklineError};
use deskline_storage::Database;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::connection::ConnectionLimits;
use crate::handlers;
use crate::relay::Relay;
use crate::ws;

/// Health state for the unauthenticated health endpoint.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    pub db: Database,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub relay: Arc<Relay>,
    pub desks: Arc<dyn DeskDirectory>,
    pub agents: Arc<dyn AgentDirectory>,
    pub auth: Arc<dyn Authenticator>,
    pub visitor_limits: ConnectionLimits,
    pub agent_limits: ConnectionLimits,
    pub health: HealthState,
}

/// Listener address.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Builds the router:
/// - GET /health (public)
/// - GET /v1/sessions/{session_id} (bearer)
/// - GET /v1/sessions/{session_id}/messages (bearer)
/// - GET /ws/visitor (origin gate during handshake)
/// - GET /ws/agent (bearer header or `?token=` during handshake)
pub fn build_router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/sessions/{session_id}", get(handlers::get_session))
        .route(
            "/v1/sessions/{session_id}/messages",
            get(handlers::get_session_messages),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    let ws_routes = Router::new()
        .route("/ws/visitor", get(ws::visitor_ws_handler))
        .route("/ws/agent", get(ws::agent_ws_handler))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(ws_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Binds `host:port` and serves until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), DesklineError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DesklineError::connection(format!("failed to bind gateway to {addr}"), e))?;
    serve(listener, state, cancel).await
}

/// Serves on an already-bound listener until `cancel` fires, then closes
/// every live socket.
pub async fn serve(
    listener: TcpListener,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), DesklineError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "gateway listening");
    }

    let relay = state.relay.clone();
    let app = build_router(state);
    let shutdown = cancel.clone();

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            relay.shutdown();
        })
        .await
        .map_err(|e| DesklineError::connection("gateway server error", e));

    tracing::info!("gateway stopped");
    result
}
