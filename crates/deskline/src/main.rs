// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deskline - live customer-support chat relay.
//!
//! This is the binary entry point for the Deskline server.

mod serve;
mod shutdown;
mod token;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use deskline_config::{ConfigError, DesklineConfig};
use deskline_core::Role;

/// Deskline - live customer-support chat relay.
#[derive(Parser, Debug)]
#[command(name = "deskline", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the relay server.
    Serve,
    /// Mint a bearer token for an agent or admin.
    Token {
        /// Agent username (token subject).
        username: String,
        /// Role claim: `agent` or `admin`.
        #[arg(long, default_value = "agent", value_parser = parse_role)]
        role: Role,
    },
    /// Validate configuration and exit.
    CheckConfig,
}

fn parse_role(s: &str) -> Result<Role, String> {
    s.parse::<Role>()
        .map_err(|_| format!("unknown role `{s}` (expected `agent` or `admin`)"))
}

fn load_config(path: Option<&PathBuf>) -> Result<DesklineConfig, Vec<ConfigError>> {
    match path {
        Some(path) => deskline_config::load_and_validate_path(path),
        None => deskline_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            deskline_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Token { username, role }) => {
            match token::run_token(&config, &username, role) {
                Ok(token) => println!("{token}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::CheckConfig) => {
            eprintln!(
                "deskline: config ok ({} desk(s), {} agent(s), listening on {}:{})",
                config.desks.len(),
                config.agents.len(),
                config.server.host,
                config.server.port
            );
        }
        None => {
            println!("deskline: use --help for available commands");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn token_command_parses_role() {
        let cli = Cli::try_parse_from(["deskline", "token", "bob", "--role", "admin"]).unwrap();
        match cli.command {
            Some(Commands::Token { username, role }) => {
                assert_eq!(username, "bob");
                assert_eq!(role, Role::Admin);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["deskline", "token", "bob", "--role", "root"]).is_err());
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["deskline", "serve", "--config", "/tmp/d.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/d.toml")));
    }
}
