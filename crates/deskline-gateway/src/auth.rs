// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer authentication for agents and admins.
//!
//! Tokens are HS256 JWTs carrying `{sub, role, iat, exp}`. They are read from
//! `Authorization: Bearer <token>` or, for WebSocket upgrades where browsers
//! cannot set headers, from the `token` query parameter.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use deskline_core::{Authenticator, DesklineError, Principal, Role};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Claims carried by a Deskline token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Agent username.
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 tokens with a shared secret.
#[derive(Clone)]
pub struct JwtAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
}

impl std::fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticator")
            .field("secret", &"[redacted]")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl JwtAuthenticator {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        }
    }

    /// Mints a token for `username` valid for the configured lifetime.
    pub fn issue(&self, username: &str, role: Role) -> Result<String, DesklineError> {
        let now = chrono::Utc::now().timestamp();
        self.encode_claims(&Claims {
            sub: username.to_string(),
            role,
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        })
    }

    pub fn encode_claims(&self, claims: &Claims) -> Result<String, DesklineError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| DesklineError::Internal(format!("failed to encode token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, DesklineError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map_err(|e| DesklineError::Unauthorized(format!("invalid token: {e}")))?;
        Ok(data.claims)
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Principal, DesklineError> {
        let claims = self.verify(token)?;
        if claims.sub.is_empty() {
            return Err(DesklineError::Unauthorized("token has no subject".into()));
        }
        Ok(Principal {
            id: claims.sub,
            role: claims.role,
        })
    }
}

/// Token from the `Authorization: Bearer` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Header token first, then the `?token=` fallback.
pub fn request_token<'a>(headers: &'a HeaderMap, query_token: Option<&'a str>) -> Option<&'a str> {
    bearer_token(headers).or_else(|| query_token.map(str::trim).filter(|t| !t.is_empty()))
}

/// Middleware that authenticates the bearer header and stores the resulting
/// [`Principal`] in request extensions. Missing or invalid tokens get 401.
pub async fn auth_middleware(
    State(auth): State<Arc<dyn Authenticator>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(token) = bearer_token(request.headers()) else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    match auth.authenticate(token).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            Ok(next.run(request).await)
        }
        Err(e) => {
            tracing::debug!(error = %e, "bearer authentication failed");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
