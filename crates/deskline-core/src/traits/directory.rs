// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lookups of desk configuration and agent accounts.

use async_trait::async_trait;

use crate::error::DesklineError;
use crate::types::{AgentRecord, DeskConfig, DutyStatus, Role};

/// Resolves support-desk configuration by app id.
#[async_trait]
pub trait DeskDirectory: Send + Sync {
    async fn desk(&self, app_id: &str) -> Result<Option<DeskConfig>, DesklineError>;
}

/// Queries agent accounts.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Lists agents matching role, duty status and active flag.
    async fn list_agents(
        &self,
        role: Role,
        status: DutyStatus,
        active: bool,
    ) -> Result<Vec<AgentRecord>, DesklineError>;

    async fn agent(&self, username: &str) -> Result<Option<AgentRecord>, DesklineError>;
}
