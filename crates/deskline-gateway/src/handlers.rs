// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.
//!
//! Handles GET /health, GET /v1/sessions/{id}, GET /v1/sessions/{id}/messages.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use deskline_core::{DesklineError, HealthStatus, Message, Principal, Role, Session, SessionStatus};
use deskline_storage::message_log::DEFAULT_FETCH_LIMIT;
use serde::{Deserialize, Serialize};

use crate::server::GatewayState;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub visitors_online: usize,
    pub agents_online: usize,
}

/// Response body for GET /v1/sessions/{id}.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: Session,
    pub status: SessionStatus,
}

/// Query for GET /v1/sessions/{id}/messages.
#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Response body for GET /v1/sessions/{id}/messages.
#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub session_id: String,
    pub messages: Vec<Message>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned by handlers, rendered as JSON with a status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }
}

impl From<DesklineError> for ApiError {
    fn from(err: DesklineError) -> Self {
        let status = match &err {
            DesklineError::Validation(_) => StatusCode::BAD_REQUEST,
            DesklineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DesklineError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "request failed");
            return Self {
                status,
                message: "internal error".to_string(),
            };
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// GET /health
///
/// Unauthenticated. 503 when storage is unhealthy.
pub async fn get_health(State(state): State<GatewayState>) -> Response {
    let (code, status) = match state.health.db.health_check().await {
        HealthStatus::Healthy => (StatusCode::OK, "healthy".to_string()),
        HealthStatus::Unhealthy(reason) => {
            (StatusCode::SERVICE_UNAVAILABLE, format!("unhealthy: {reason}"))
        }
    };
    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: state.health.start_time.elapsed().as_secs(),
            visitors_online: state.relay.visitors().len(),
            agents_online: state.relay.agents().len(),
        }),
    )
        .into_response()
}

/// Loads a session the principal may see. Admins see every session, agents
/// only the ones assigned to them.
async fn authorized_session(
    state: &GatewayState,
    principal: &Principal,
    session_id: &str,
) -> Result<Session, ApiError> {
    let session = state.relay.session(session_id).await?;
    match principal.role {
        Role::Admin => Ok(session),
        Role::Agent if session.is_assigned_to(&principal.id) => Ok(session),
        Role::Agent => {
            tracing::warn!(
                session_id,
                agent_id = %principal.id,
                "agent requested a session assigned to someone else"
            );
            Err(ApiError::forbidden("session is not assigned to you"))
        }
    }
}

/// GET /v1/sessions/{session_id}
pub async fn get_session(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = authorized_session(&state, &principal, &session_id).await?;
    let status = session.status();
    Ok(Json(SessionResponse { session, status }))
}

/// GET /v1/sessions/{session_id}/messages?limit=N
pub async fn get_session_messages(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let session = authorized_session(&state, &principal, &session_id).await?;
    let limit = query.limit.unwrap_or(DEFAULT_FETCH_LIMIT as i64);
    let messages = state.relay.messages().fetch_recent(&session.id, limit).await?;
    Ok(Json(MessagesResponse {
        session_id: session.id,
        messages,
    }))
}
