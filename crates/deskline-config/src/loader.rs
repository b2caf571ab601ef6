// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./deskline.toml` > `~/.config/deskline/deskline.toml` >
//! `/etc/deskline/deskline.toml` with environment variable overrides via `DESKLINE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::DesklineConfig;

/// Scalar sections that environment variables may target.
pub(crate) const ENV_SECTIONS: &[&str] = &["server", "storage", "relay", "auth", "logging"];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/deskline/deskline.toml` (system-wide)
/// 3. `~/.config/deskline/deskline.toml` (user XDG config)
/// 4. `./deskline.toml` (local directory)
/// 5. `DESKLINE_*` environment variables
pub fn load_config() -> Result<DesklineConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<DesklineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DesklineConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DesklineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DesklineConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(DesklineConfig::default()))
        .merge(Toml::file("/etc/deskline/deskline.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("deskline/deskline.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("deskline.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` because key names contain
/// underscores: `DESKLINE_RELAY_READ_TIMEOUT_SECS` must map to
/// `relay.read_timeout_secs`, not `relay.read.timeout.secs`.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("DESKLINE_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a prefix-stripped env var name to a dotted config path.
///
/// figment hands the name to `Env::map` before lowercasing it, so the match
/// is done on a lowercased copy.
pub(crate) fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
            .filter(|r| !r.is_empty())
        {
            return format!("{section}.{rest}");
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(map_env_key("auth_jwt_secret"), "auth.jwt_secret");
        assert_eq!(
            map_env_key("relay_read_timeout_secs"),
            "relay.read_timeout_secs"
        );
        assert_eq!(map_env_key("storage_database_path"), "storage.database_path");
        assert_eq!(map_env_key("server_port"), "server.port");
        assert_eq!(map_env_key("unknown_thing"), "unknown_thing");
        assert_eq!(map_env_key("server_"), "server_");
        assert_eq!(map_env_key("AUTH_JWT_SECRET"), "auth.jwt_secret");
    }

    #[test]
    fn env_vars_override_sections() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("DESKLINE_AUTH_JWT_SECRET", "from-env");
            jail.set_env("DESKLINE_RELAY_READ_TIMEOUT_SECS", "90");
            jail.set_env("DESKLINE_SERVER_PORT", "9100");

            let config: DesklineConfig = Figment::new()
                .merge(Serialized::defaults(DesklineConfig::default()))
                .merge(env_provider())
                .extract()?;
            assert_eq!(config.auth.jwt_secret, "from-env");
            assert_eq!(config.relay.read_timeout_secs, 90);
            assert_eq!(config.server.port, 9100);
            Ok(())
        });
    }

    #[test]
    fn env_vars_apply_over_explicit_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("deskline.toml", "[logging]\nlevel = \"debug\"\n")?;
            jail.set_env("DESKLINE_LOGGING_LEVEL", "trace");

            let config = load_config_from_path(Path::new("deskline.toml"))?;
            assert_eq!(config.logging.level, "trace");
            Ok(())
        });
    }
}
