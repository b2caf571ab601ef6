// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer credential verification.

use async_trait::async_trait;

use crate::error::DesklineError;
use crate::types::Principal;

/// Resolves a bearer credential to a verified principal.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Fails with [`DesklineError::Unauthorized`] on a bad or expired token.
    async fn authenticate(&self, token: &str) -> Result<Principal, DesklineError>;
}
