// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` runs a complete gateway on `127.0.0.1:0` over a temp SQLite
//! database and a [`MemoryDirectory`]. Tests connect to it with any
//! WebSocket or HTTP client using the URL helpers.

use std::net::SocketAddr;
use std::sync::Arc;

use deskline_core::{AgentRecord, DeskConfig, DesklineError, Role};
use deskline_gateway::{
    ConnectionLimits, GatewayState, HealthState, JwtAuthenticator, Relay,
};
use deskline_storage::{Database, Stores};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::directory::MemoryDirectory;

/// Secret used to sign harness tokens.
pub const TEST_SECRET: &str = "deskline-test-secret";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    desks: Vec<DeskConfig>,
    agents: Vec<AgentRecord>,
    limits: ConnectionLimits,
    session_timeout_secs: i64,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            desks: Vec::new(),
            agents: Vec::new(),
            limits: ConnectionLimits::default(),
            session_timeout_secs: 24 * 60 * 60,
        }
    }

    pub fn with_desk(mut self, desk: DeskConfig) -> Self {
        self.desks.push(desk);
        self
    }

    pub fn with_agent(mut self, agent: AgentRecord) -> Self {
        self.agents.push(agent);
        self
    }

    /// Limits applied to both visitor and agent sockets.
    pub fn with_limits(mut self, limits: ConnectionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_session_timeout(mut self, secs: i64) -> Self {
        self.session_timeout_secs = secs;
        self
    }

    /// Opens the database, binds an ephemeral port and starts serving.
    pub async fn build(self) -> Result<TestHarness, DesklineError> {
        let temp_dir = tempfile::TempDir::new().map_err(DesklineError::storage)?;
        let db_path = temp_dir.path().join("test.db");
        let db = Database::open(&db_path.to_string_lossy()).await?;
        let stores = Stores::new(
            db.clone(),
            self.session_timeout_secs,
            std::time::Duration::from_secs(24 * 60 * 60),
        );

        let directory = Arc::new(MemoryDirectory::new());
        for desk in self.desks {
            directory.put_desk(desk).await;
        }
        for agent in self.agents {
            directory.put_agent(agent).await;
        }

        let relay = Arc::new(Relay::new(
            stores.sessions.clone(),
            stores.messages.clone(),
            directory.clone(),
        ));
        let auth = Arc::new(JwtAuthenticator::new(TEST_SECRET, 3600));

        let state = GatewayState {
            relay: relay.clone(),
            desks: directory.clone(),
            agents: directory.clone(),
            auth: auth.clone(),
            visitor_limits: self.limits,
            agent_limits: self.limits,
            health: HealthState {
                start_time: std::time::Instant::now(),
                db,
            },
        };

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| DesklineError::connection("failed to bind test listener", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| DesklineError::connection("failed to read test listener address", e))?;

        let cancel = CancellationToken::new();
        let server = tokio::spawn(deskline_gateway::serve(listener, state, cancel.clone()));

        Ok(TestHarness {
            addr,
            auth,
            relay,
            directory,
            stores,
            cancel,
            server: Some(server),
            _temp_dir: temp_dir,
        })
    }
}

/// A live gateway with temp storage.
pub struct TestHarness {
    /// Bound address of the gateway.
    pub addr: SocketAddr,
    /// Authenticator sharing the server's secret.
    pub auth: Arc<JwtAuthenticator>,
    pub relay: Arc<Relay>,
    /// Directory the server reads desks and agents from.
    pub directory: Arc<MemoryDirectory>,
    pub stores: Stores,
    pub cancel: CancellationToken,
    server: Option<JoinHandle<Result<(), DesklineError>>>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// `ws://` URL of the visitor endpoint.
    pub fn visitor_url(&self, visitor_id: &str, app_id: &str) -> String {
        format!(
            "ws://{}/ws/visitor?visitor_id={visitor_id}&app_id={app_id}",
            self.addr
        )
    }

    /// `ws://` URL of the agent endpoint carrying `token` in the query.
    pub fn agent_url(&self, token: &str) -> String {
        format!("ws://{}/ws/agent?token={token}", self.addr)
    }

    /// `http://` URL of `path` on the gateway.
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Mints a token the gateway accepts.
    pub fn token(&self, username: &str, role: Role) -> Result<String, DesklineError> {
        self.auth.issue(username, role)
    }

    /// Stops the server and waits for it to finish.
    pub async fn shutdown(mut self) -> Result<(), DesklineError> {
        self.cancel.cancel();
        match self.server.take() {
            Some(server) => server
                .await
                .map_err(|e| DesklineError::Internal(format!("server task failed: {e}")))?,
            None => Ok(()),
        }
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
