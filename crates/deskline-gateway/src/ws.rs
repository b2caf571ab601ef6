// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket upgrade handlers for visitors and agents.
//!
//! Both sides exchange the frames described in [`crate::frames`]. Checks run
//! before the upgrade so a rejected caller gets a plain HTTP status. Once
//! upgraded, each socket gets a read loop and a write loop sharing one
//! cancellation token; the handler deregisters the socket after both end.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        Query, State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use deskline_core::{DesklineError, Role, keys};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::request_token;
use crate::connection::{ConnectionLimits, TextHandler, run_read_loop, run_write_loop};
use crate::frames::InboundFrame;
use crate::origin::origin_allowed;
use crate::registry::ConnectionHandle;
use crate::relay::{Relay, VisitorContext};
use crate::server::GatewayState;

/// Query parameters of `/ws/visitor`.
#[derive(Debug, Default, Deserialize)]
pub struct VisitorParams {
    #[serde(default)]
    pub visitor_id: String,
    #[serde(default)]
    pub app_id: String,
}

/// Query parameters of `/ws/agent`.
#[derive(Debug, Default, Deserialize)]
pub struct AgentParams {
    #[serde(default)]
    pub token: Option<String>,
}

/// GET /ws/visitor?visitor_id=..&app_id=..
pub async fn visitor_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Query(params): Query<VisitorParams>,
    headers: HeaderMap,
) -> Response {
    let VisitorParams { visitor_id, app_id } = params;
    if visitor_id.is_empty() || app_id.is_empty() {
        warn!("visitor connect without visitor_id or app_id");
        return StatusCode::BAD_REQUEST.into_response();
    }
    if let Err(e) = keys::validate_component("visitor_id", &visitor_id)
        .and_then(|()| keys::validate_component("app_id", &app_id))
    {
        warn!(error = %e, "rejecting visitor connect");
        return StatusCode::BAD_REQUEST.into_response();
    }

    let desk = match state.desks.desk(&app_id).await {
        Ok(Some(desk)) => desk,
        Ok(None) => {
            warn!(app_id = %app_id, "visitor connect for unknown desk");
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(e) => {
            tracing::error!(app_id = %app_id, error = %e, "desk lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if !desk.enabled {
        warn!(app_id = %app_id, "visitor connect for disabled desk");
        return StatusCode::FORBIDDEN.into_response();
    }
    if !origin_allowed(&headers, &desk.allowed_domains) {
        warn!(app_id = %app_id, visitor_id = %visitor_id, "origin not allowed");
        return StatusCode::FORBIDDEN.into_response();
    }

    let limits = state.visitor_limits;
    let cancel = CancellationToken::new();
    let (handle, rx) = ConnectionHandle::new(limits.queue_capacity, cancel.clone());
    let ctx = match state.relay.connect_visitor(&visitor_id, &app_id, handle).await {
        Ok(ctx) => ctx,
        Err(e) => return reject(e),
    };

    let relay = state.relay.clone();
    let failed_relay = state.relay.clone();
    let failed_ctx = ctx.clone();
    ws.on_failed_upgrade(move |e| {
        warn!(error = %e, "visitor upgrade failed");
        failed_relay.disconnect_visitor(&failed_ctx);
    })
    .on_upgrade(move |socket| async move {
        let mut session = VisitorSession { relay, ctx };
        run_socket(socket, rx, limits, cancel, &mut session).await;
        session.relay.disconnect_visitor(&session.ctx);
    })
}

/// GET /ws/agent, bearer header or `?token=`.
pub async fn agent_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Query(params): Query<AgentParams>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = request_token(&headers, params.token.as_deref()) else {
        warn!("agent connect without credentials");
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let principal = match state.auth.authenticate(token).await {
        Ok(principal) => principal,
        Err(e) => {
            warn!(error = %e, "agent authentication failed");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    match state.agents.agent(&principal.id).await {
        Ok(Some(record)) if record.role == Role::Agent && record.active => {}
        Ok(_) => {
            warn!(agent_id = %principal.id, "not an active agent account");
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Err(e) => {
            tracing::error!(agent_id = %principal.id, error = %e, "agent lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let agent_id = principal.id;
    let limits = state.agent_limits;
    let cancel = CancellationToken::new();
    let (handle, rx) = ConnectionHandle::new(limits.queue_capacity, cancel.clone());
    let connection_id = handle.id();
    state.relay.connect_agent(&agent_id, handle);

    let relay = state.relay.clone();
    let failed_relay = state.relay.clone();
    let failed_agent = agent_id.clone();
    ws.on_failed_upgrade(move |e| {
        warn!(error = %e, "agent upgrade failed");
        failed_relay.disconnect_agent(&failed_agent, connection_id);
    })
    .on_upgrade(move |socket| async move {
        let mut session = AgentSession { relay, agent_id };
        run_socket(socket, rx, limits, cancel, &mut session).await;
        session
            .relay
            .disconnect_agent(&session.agent_id, connection_id);
    })
}

fn reject(err: DesklineError) -> Response {
    let status = match err {
        DesklineError::Validation(_) => StatusCode::BAD_REQUEST,
        DesklineError::Unauthorized(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(error = %err, %status, "rejecting socket");
    status.into_response()
}

/// Runs both loops of an upgraded socket until either ends.
async fn run_socket<H: TextHandler>(
    socket: WebSocket,
    rx: mpsc::Receiver<String>,
    limits: ConnectionLimits,
    cancel: CancellationToken,
    handler: &mut H,
) {
    let (sink, stream) = socket.split();
    let writer = tokio::spawn(run_write_loop(sink, rx, limits, cancel.clone()));
    let read_exit = run_read_loop(stream, limits, cancel.clone(), handler).await;
    cancel.cancel();
    let write_exit = writer.await;
    debug!(?read_exit, ?write_exit, "socket loops finished");
}

struct VisitorSession {
    relay: Arc<Relay>,
    ctx: VisitorContext,
}

#[async_trait]
impl TextHandler for VisitorSession {
    async fn on_text(&mut self, text: String) {
        let frame = match InboundFrame::parse(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(session_id = %self.ctx.session_id, error = %e, "dropping visitor frame");
                return;
            }
        };
        match self.relay.handle_visitor_frame(&mut self.ctx, frame).await {
            Ok(outcome) => debug!(
                session_id = %outcome.session_id,
                message_id = %outcome.message_id,
                push = ?outcome.push,
                "visitor frame relayed"
            ),
            Err(e) => log_frame_error(&e, &self.ctx.session_id, None),
        }
    }
}

struct AgentSession {
    relay: Arc<Relay>,
    agent_id: String,
}

#[async_trait]
impl TextHandler for AgentSession {
    async fn on_text(&mut self, text: String) {
        let frame = match InboundFrame::parse(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(agent_id = %self.agent_id, error = %e, "dropping agent frame");
                return;
            }
        };
        let session_id = frame.session_id.clone();
        match self.relay.handle_agent_frame(&self.agent_id, frame).await {
            Ok(outcome) => debug!(session_id = %session_id, agent_id = %self.agent_id, ?outcome, "agent frame handled"),
            Err(e) => log_frame_error(&e, &session_id, Some(&self.agent_id)),
        }
    }
}

/// Frame errors never close the socket.
fn log_frame_error(err: &DesklineError, session_id: &str, agent_id: Option<&str>) {
    let agent_id = agent_id.unwrap_or("");
    match err {
        DesklineError::Storage { .. } | DesklineError::Internal(_) => {
            tracing::error!(session_id, agent_id, error = %err, "frame failed");
        }
        _ => warn!(session_id, agent_id, error = %err, "frame dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visitor_params_default_to_empty() {
        let params: VisitorParams = serde_json::from_str("{}").unwrap();
        assert!(params.visitor_id.is_empty());
        assert!(params.app_id.is_empty());
    }

    #[test]
    fn reject_maps_errors_to_status() {
        assert_eq!(
            reject(DesklineError::Validation("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            reject(DesklineError::storage_msg("x")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
