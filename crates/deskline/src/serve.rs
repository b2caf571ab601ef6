// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `deskline serve` command implementation.
//!
//! Opens the SQLite store, seeds the desk and agent directory from config,
//! builds the relay and serves the gateway until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use deskline_config::DesklineConfig;
use deskline_config::model::{LoggingConfig, RelayConfig};
use deskline_core::{AgentRecord, DeskConfig, DesklineError};
use deskline_gateway::{
    ConnectionLimits, GatewayState, HealthState, JwtAuthenticator, Relay, ServerConfig,
};
use deskline_storage::{Database, LogStore, Stores};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::shutdown;

/// Runs the `deskline serve` command.
pub async fn run_serve(config: DesklineConfig) -> Result<(), DesklineError> {
    init_tracing(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "starting deskline serve");

    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
    info!(path = %config.storage.database_path, "storage opened");

    let session_timeout = i64::try_from(config.relay.session_timeout_secs)
        .map_err(|_| DesklineError::Config("relay.session_timeout_secs is too large".into()))?;
    let stores = Stores::new(db.clone(), session_timeout, config.relay.message_ttl());

    let desks: Vec<DeskConfig> = config.desks.iter().map(|d| d.to_desk_config()).collect();
    let agents: Vec<AgentRecord> = config.agents.iter().map(|a| a.to_agent_record()).collect();
    stores.directory.seed(&desks, &agents).await?;

    let directory = Arc::new(stores.directory.clone());
    let relay = Arc::new(Relay::new(
        stores.sessions.clone(),
        stores.messages.clone(),
        directory.clone(),
    ));

    let state = GatewayState {
        relay,
        desks: directory.clone(),
        agents: directory,
        auth: Arc::new(JwtAuthenticator::new(
            &config.auth.jwt_secret,
            config.auth.token_ttl_secs,
        )),
        visitor_limits: connection_limits(&config.relay, config.relay.visitor_queue_capacity),
        agent_limits: connection_limits(&config.relay, config.relay.agent_queue_capacity),
        health: HealthState {
            start_time: std::time::Instant::now(),
            db: db.clone(),
        },
    };

    let cancel = shutdown::install_signal_handler();

    let purge = tokio::spawn(purge_expired_loop(
        stores.kv.clone(),
        Duration::from_secs(config.storage.purge_interval_secs),
        cancel.clone(),
    ));

    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    let served = deskline_gateway::start_server(&server_config, state, cancel.clone()).await;

    cancel.cancel();
    let _ = purge.await;
    if let Err(e) = db.close().await {
        warn!(error = %e, "failed to checkpoint database on shutdown");
    }

    served?;
    info!("deskline serve shutdown complete");
    Ok(())
}

fn connection_limits(relay: &RelayConfig, queue_capacity: usize) -> ConnectionLimits {
    ConnectionLimits {
        read_timeout: relay.read_timeout(),
        write_timeout: relay.write_timeout(),
        ping_interval: relay.ping_interval(),
        queue_capacity,
    }
}

/// Deletes expired log entries every `interval` until cancelled.
async fn purge_expired_loop(store: LogStore, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    // Skip the first immediate tick.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.purge_expired().await {
                    Ok(0) => debug!("no expired entries"),
                    Ok(purged) => info!(purged, "purged expired entries"),
                    Err(e) => tracing::error!(error = %e, "purge of expired entries failed"),
                }
            }
            _ = cancel.cancelled() => {
                debug!("purge task shutting down");
                break;
            }
        }
    }
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(logging: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "deskline={level},deskline_gateway={level},deskline_storage={level},tower_http=warn,warn",
            level = logging.level
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false);

    let result = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("deskline: tracing already initialized: {e}");
    }
}
