// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory desk and agent directory.
//!
//! `MemoryDirectory` implements both [`DeskDirectory`] and [`AgentDirectory`]
//! over plain maps, so tests can put an agent away or disable a desk while a
//! gateway is serving.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use deskline_core::{AgentDirectory, AgentRecord, DeskConfig, DeskDirectory, DesklineError};
use deskline_core::{DutyStatus, Role};

/// Desk and agent records held in memory.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    desks: Arc<RwLock<BTreeMap<String, DeskConfig>>>,
    agents: Arc<RwLock<BTreeMap<String, AgentRecord>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a desk, keyed by app id.
    pub async fn put_desk(&self, desk: DeskConfig) {
        self.desks.write().await.insert(desk.app_id.clone(), desk);
    }

    /// Adds or replaces an agent, keyed by username.
    pub async fn put_agent(&self, agent: AgentRecord) {
        self.agents
            .write()
            .await
            .insert(agent.username.clone(), agent);
    }

    /// Changes an agent's duty status. Returns false for an unknown agent.
    pub async fn set_status(&self, username: &str, status: DutyStatus) -> bool {
        match self.agents.write().await.get_mut(username) {
            Some(agent) => {
                agent.status = status;
                true
            }
            None => false,
        }
    }

    /// Enables or disables a desk. Returns false for an unknown desk.
    pub async fn set_desk_enabled(&self, app_id: &str, enabled: bool) -> bool {
        match self.desks.write().await.get_mut(app_id) {
            Some(desk) => {
                desk.enabled = enabled;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl DeskDirectory for MemoryDirectory {
    async fn desk(&self, app_id: &str) -> Result<Option<DeskConfig>, DesklineError> {
        Ok(self.desks.read().await.get(app_id).cloned())
    }
}

#[async_trait]
impl AgentDirectory for MemoryDirectory {
    async fn list_agents(
        &self,
        role: Role,
        status: DutyStatus,
        active: bool,
    ) -> Result<Vec<AgentRecord>, DesklineError> {
        Ok(self
            .agents
            .read()
            .await
            .values()
            .filter(|a| a.role == role && a.status == status && a.active == active)
            .cloned()
            .collect())
    }

    async fn agent(&self, username: &str) -> Result<Option<AgentRecord>, DesklineError> {
        Ok(self.agents.read().await.get(username).cloned())
    }
}

/// A desk with the given allowed domains, enabled.
pub fn desk(app_id: &str, allowed_domains: &[&str]) -> DeskConfig {
    DeskConfig {
        app_id: app_id.to_string(),
        name: app_id.to_string(),
        logo: String::new(),
        allowed_domains: allowed_domains.iter().map(|d| d.to_string()).collect(),
        welcome_msg: String::new(),
        contact: String::new(),
        enabled: true,
    }
}

/// An active, on-duty agent serving `apps`.
pub fn agent(username: &str, apps: &[&str]) -> AgentRecord {
    AgentRecord {
        username: username.to_string(),
        role: Role::Agent,
        status: DutyStatus::OnDuty,
        active: true,
        apps: apps.iter().map(|a| a.to_string()).collect(),
    }
}
