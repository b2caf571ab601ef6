// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Deskline relay.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use deskline_core::{AgentRecord, DeskConfig, DutyStatus, Role};
use serde::{Deserialize, Serialize};

/// Top-level Deskline configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DesklineConfig {
    /// HTTP/WebSocket listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session lifecycle and connection settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Bearer token settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Support desks seeded into the directory at startup.
    #[serde(default)]
    pub desks: Vec<DeskEntry>,

    /// Agent accounts seeded into the directory at startup.
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Seconds between sweeps that delete expired messages.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("deskline").join("deskline.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("deskline.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_purge_interval_secs() -> u64 {
    3600
}

/// Relay configuration: session timeout, retention and per-connection limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Idle seconds after which a visitor's session is closed and replaced.
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_message_ttl_days")]
    pub message_ttl_days: u64,

    /// Outbound queue slots per visitor connection.
    #[serde(default = "default_visitor_queue_capacity")]
    pub visitor_queue_capacity: usize,

    /// Outbound queue slots per agent connection.
    #[serde(default = "default_agent_queue_capacity")]
    pub agent_queue_capacity: usize,

    /// A connection with no inbound frame for this long is closed.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,

    /// Keepalive ping period. Must be shorter than `read_timeout_secs`.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout_secs(),
            message_ttl_days: default_message_ttl_days(),
            visitor_queue_capacity: default_visitor_queue_capacity(),
            agent_queue_capacity: default_agent_queue_capacity(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

impl RelayConfig {
    pub fn message_ttl(&self) -> Duration {
        Duration::from_secs(self.message_ttl_days.saturating_mul(24 * 60 * 60))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

fn default_session_timeout_secs() -> u64 {
    24 * 60 * 60
}

fn default_message_ttl_days() -> u64 {
    30
}

fn default_visitor_queue_capacity() -> usize {
    128
}

fn default_agent_queue_capacity() -> usize {
    256
}

fn default_read_timeout_secs() -> u64 {
    60
}

fn default_write_timeout_secs() -> u64 {
    10
}

fn default_ping_interval_secs() -> u64 {
    25
}

/// Bearer token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// HMAC secret for HS256 tokens. Usually supplied via
    /// `DESKLINE_AUTH_JWT_SECRET` rather than a file.
    #[serde(default)]
    pub jwt_secret: String,

    /// Lifetime of tokens minted by `deskline token`.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

fn default_token_ttl_secs() -> u64 {
    24 * 60 * 60
}

/// Logging configuration. `RUST_LOG` overrides `level`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A `[[desks]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeskEntry {
    pub app_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub logo: String,

    /// Hosts allowed to open visitor sockets: exact names or `*.suffix`.
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    #[serde(default)]
    pub welcome_msg: String,

    #[serde(default)]
    pub contact: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl DeskEntry {
    pub fn to_desk_config(&self) -> DeskConfig {
        DeskConfig {
            app_id: self.app_id.clone(),
            name: if self.name.is_empty() {
                self.app_id.clone()
            } else {
                self.name.clone()
            },
            logo: self.logo.clone(),
            allowed_domains: self.allowed_domains.clone(),
            welcome_msg: self.welcome_msg.clone(),
            contact: self.contact.clone(),
            enabled: self.enabled,
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// An `[[agents]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentEntry {
    pub username: String,

    #[serde(default = "default_role")]
    pub role: Role,

    #[serde(default = "default_duty_status")]
    pub status: DutyStatus,

    #[serde(default = "default_enabled")]
    pub active: bool,

    /// App ids served by this agent; `"all"` matches every desk.
    #[serde(default)]
    pub apps: Vec<String>,
}

impl AgentEntry {
    pub fn to_agent_record(&self) -> AgentRecord {
        AgentRecord {
            username: self.username.clone(),
            role: self.role,
            status: self.status,
            active: self.active,
            apps: self.apps.clone(),
        }
    }
}

fn default_role() -> Role {
    Role::Agent
}

fn default_duty_status() -> DutyStatus {
    DutyStatus::OnDuty
}
