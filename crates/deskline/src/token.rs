// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `deskline token` command: mints a bearer token signed with `auth.jwt_secret`.

use deskline_config::DesklineConfig;
use deskline_core::{DesklineError, Role};
use deskline_gateway::JwtAuthenticator;

/// Mints a token for `username`. The account does not have to exist in
/// `[[agents]]` (it may live only in the database), but a mismatch is noted.
pub fn run_token(
    config: &DesklineConfig,
    username: &str,
    role: Role,
) -> Result<String, DesklineError> {
    if username.trim().is_empty() {
        return Err(DesklineError::Validation("username must not be empty".into()));
    }

    match config.agents.iter().find(|a| a.username == username) {
        Some(entry) if entry.role != role => eprintln!(
            "deskline: note: `{username}` is configured with role `{}`, token carries `{role}`",
            entry.role
        ),
        Some(_) => {}
        None => eprintln!("deskline: note: `{username}` is not listed in [[agents]]"),
    }

    JwtAuthenticator::new(&config.auth.jwt_secret, config.auth.token_ttl_secs).issue(username, role)
}
