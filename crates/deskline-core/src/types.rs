// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the storage, gateway and binary crates.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Wildcard entry in an agent's app list meaning "serves every desk".
pub const ALL_APPS: &str = "all";

/// A chat message. Immutable once appended to the message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Composite message id, empty until appended.
    #[serde(default)]
    pub id: String,
    /// Free-form tag such as `message.req` or `message.rsp`.
    #[serde(rename = "type")]
    pub msg_type: String,
    pub content: String,
    /// Unix seconds.
    pub timestamp: i64,
}

impl Message {
    pub fn new(msg_type: impl Into<String>, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: String::new(),
            msg_type: msg_type.into(),
            content: content.into(),
            timestamp,
        }
    }
}

/// Role of an authenticated principal or agent account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Agent,
    Admin,
}

/// Whether an agent is currently taking new sessions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DutyStatus {
    OnDuty,
    Away,
}

/// Authenticated caller resolved from a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

/// A support agent account as seen by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub username: String,
    pub role: Role,
    pub status: DutyStatus,
    pub active: bool,
    /// App ids this agent serves; `all` matches any desk.
    #[serde(default)]
    pub apps: Vec<String>,
}

impl AgentRecord {
    /// Case-insensitive exact match on the agent's app list.
    pub fn serves_app(&self, app_id: &str) -> bool {
        self.apps.iter().any(|a| a.eq_ignore_ascii_case(app_id))
    }

    pub fn serves_all(&self) -> bool {
        self.apps.iter().any(|a| a.eq_ignore_ascii_case(ALL_APPS))
    }

    /// True if the record may take new sessions.
    pub fn is_available(&self) -> bool {
        self.role == Role::Agent && self.status == DutyStatus::OnDuty && self.active
    }
}

/// Support desk configuration resolved by app id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeskConfig {
    pub app_id: String,
    pub name: String,
    #[serde(default)]
    pub logo: String,
    /// Hosts allowed to embed the visitor widget. Exact names or `*.suffix`.
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub welcome_msg: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Health status reported by storage and directory health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}
