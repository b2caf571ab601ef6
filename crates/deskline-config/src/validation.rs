// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as valid bind addresses, non-empty paths and non-zero limits.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::DesklineConfig;

/// A century; longer retention is almost certainly a unit mistake.
pub const MAX_MESSAGE_TTL_DAYS: u64 = 36_500;

fn invalid(errors: &mut Vec<ConfigError>, message: String) {
    errors.push(ConfigError::Validation { message });
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &DesklineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.server.host.trim();
    if host.is_empty() {
        invalid(&mut errors, "server.host must not be empty".to_string());
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
        if !is_valid_ip && !is_valid_hostname {
            invalid(
                &mut errors,
                format!("server.host `{host}` is not a valid IP address or hostname"),
            );
        }
    }

    if config.storage.database_path.trim().is_empty() {
        invalid(&mut errors, "storage.database_path must not be empty".to_string());
    }
    if config.storage.purge_interval_secs == 0 {
        invalid(&mut errors, "storage.purge_interval_secs must be greater than 0".to_string());
    }

    let relay = &config.relay;
    for (name, value) in [
        ("relay.session_timeout_secs", relay.session_timeout_secs),
        ("relay.message_ttl_days", relay.message_ttl_days),
        ("relay.visitor_queue_capacity", relay.visitor_queue_capacity as u64),
        ("relay.agent_queue_capacity", relay.agent_queue_capacity as u64),
        ("relay.read_timeout_secs", relay.read_timeout_secs),
        ("relay.write_timeout_secs", relay.write_timeout_secs),
        ("relay.ping_interval_secs", relay.ping_interval_secs),
    ] {
        if value == 0 {
            invalid(&mut errors, format!("{name} must be greater than 0"));
        }
    }
    if relay.message_ttl_days > MAX_MESSAGE_TTL_DAYS {
        invalid(
            &mut errors,
            format!("relay.message_ttl_days must be at most {MAX_MESSAGE_TTL_DAYS}"),
        );
    }
    if relay.ping_interval_secs >= relay.read_timeout_secs && relay.ping_interval_secs > 0 {
        invalid(
            &mut errors,
            format!(
                "relay.ping_interval_secs ({}) must be shorter than relay.read_timeout_secs ({})",
                relay.ping_interval_secs, relay.read_timeout_secs
            ),
        );
    }

    if config.auth.jwt_secret.trim().is_empty() {
        invalid(
            &mut errors,
            "auth.jwt_secret must not be empty (set DESKLINE_AUTH_JWT_SECRET)".to_string(),
        );
    }
    if config.auth.token_ttl_secs == 0 {
        invalid(&mut errors, "auth.token_ttl_secs must be greater than 0".to_string());
    }

    let mut seen_desks = HashSet::new();
    for (i, desk) in config.desks.iter().enumerate() {
        let app_id = desk.app_id.trim();
        if app_id.is_empty() {
            invalid(&mut errors, format!("desks[{i}].app_id must not be empty"));
        } else if app_id.contains(':') {
            invalid(
                &mut errors,
                format!("desks[{i}].app_id `{app_id}` must not contain ':'"),
            );
        }
        if !seen_desks.insert(app_id.to_ascii_lowercase()) {
            invalid(
                &mut errors,
                format!("duplicate desk app_id `{app_id}` in [[desks]] array"),
            );
        }
    }

    let mut seen_agents = HashSet::new();
    for (i, agent) in config.agents.iter().enumerate() {
        if agent.username.trim().is_empty() {
            invalid(&mut errors, format!("agents[{i}].username must not be empty"));
        }
        if !seen_agents.insert(&agent.username) {
            invalid(
                &mut errors,
                format!(
                    "duplicate agent username `{}` in [[agents]] array",
                    agent.username
                ),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
