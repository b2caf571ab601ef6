// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Deskline relay.

use thiserror::Error;

/// The error type shared by every Deskline crate.
#[derive(Debug, Error)]
pub enum DesklineError {
    /// Malformed frame, identifier or request parameter.
    #[error("validation error: {0}")]
    Validation(String),

    /// Caller is not allowed to perform the operation (bad credential,
    /// disallowed origin, session assigned to another agent).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Socket read or write failure. Tears down the affected connection only.
    #[error("connection error: {message}")]
    Connection {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DesklineError {
    /// Wraps any error as a [`DesklineError::Storage`].
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(err),
        }
    }

    /// Builds a [`DesklineError::Storage`] from a plain message.
    pub fn storage_msg(message: impl Into<String>) -> Self {
        Self::Storage {
            source: message.into().into(),
        }
    }

    /// Builds a [`DesklineError::Connection`] with an underlying cause.
    pub fn connection<E>(message: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(err)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
