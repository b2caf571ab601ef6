// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relay router between visitor and agent connections.
//!
//! Every inbound frame is validated against the session, persisted, applied
//! to the session state and then pushed to the counterpart registry. The
//! read-modify-write of one visitor/app pair runs under an async lock so two
//! frames for the same session cannot lose an update. Pushes happen after the
//! lock is released and never wait on the recipient.

use std::sync::Arc;

use dashmap::DashMap;
use deskline_core::keys::{self, parse_session_id};
use deskline_core::{AgentDirectory, AgentRecord, DesklineError, DutyStatus, Message, Role, Session};
use deskline_storage::{MessageLog, SessionStore};
use rand::seq::SliceRandom;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frames::{
    AgentFrameKind, AgentPush, InboundFrame, VisitorFrameKind, VisitorPush, encode,
};
use crate::registry::{ConnectionHandle, ConnectionRegistry, PushOutcome};

/// Source of "now" in unix seconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp())
}

/// Identity and current registration of one visitor socket.
#[derive(Debug, Clone)]
pub struct VisitorContext {
    pub visitor_id: String,
    pub app_id: String,
    /// Session id the socket is registered under. Changes on rollover.
    pub session_id: String,
    pub connection_id: Uuid,
}

/// What happened to an accepted visitor frame.
#[derive(Debug, Clone)]
pub struct VisitorOutcome {
    pub session_id: String,
    pub message_id: String,
    /// Agent now owning the session, if any.
    pub agent_id: Option<String>,
    /// True when the frame landed in a newer session than the socket was on.
    pub rolled_over: bool,
    /// Delivery to the agent, `None` when the session is unassigned.
    pub push: Option<PushOutcome>,
}

/// What happened to an accepted agent frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    Replied {
        message_id: String,
        push: PushOutcome,
    },
    Closed,
    FollowUp,
    Read,
    Ignored(String),
}

/// Async lock per key, removed from the map once nobody holds or waits on it.
#[derive(Default)]
struct SessionLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SessionLocks {
    async fn lock(&self, key: String) -> SessionGuard<'_> {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        SessionGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    fn len(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Owns both connection registries and routes frames between them.
pub struct Relay {
    sessions: SessionStore,
    messages: MessageLog,
    agents: Arc<dyn AgentDirectory>,
    visitors: ConnectionRegistry,
    agent_connections: ConnectionRegistry,
    locks: SessionLocks,
    clock: Clock,
}

impl Relay {
    pub fn new(
        sessions: SessionStore,
        messages: MessageLog,
        agents: Arc<dyn AgentDirectory>,
    ) -> Self {
        Self {
            sessions,
            messages,
            agents,
            visitors: ConnectionRegistry::new("visitor"),
            agent_connections: ConnectionRegistry::new("agent"),
            locks: SessionLocks::default(),
            clock: system_clock(),
        }
    }

    /// Replaces the wall clock, for tests that need to move time.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    pub fn visitors(&self) -> &ConnectionRegistry {
        &self.visitors
    }

    pub fn agents(&self) -> &ConnectionRegistry {
        &self.agent_connections
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Resolves the visitor's current session, registers the socket under it
    /// and pushes a `session.update` so the widget learns the id.
    pub async fn connect_visitor(
        &self,
        visitor_id: &str,
        app_id: &str,
        handle: ConnectionHandle,
    ) -> Result<VisitorContext, DesklineError> {
        keys::validate_component("visitor_id", visitor_id)?;
        keys::validate_component("app_id", app_id)?;

        let session = {
            let _guard = self.locks.lock(keys::session_prefix(visitor_id, app_id)).await;
            self.sessions
                .get_or_create(visitor_id, app_id, self.now())
                .await?
        };

        let ctx = VisitorContext {
            visitor_id: visitor_id.to_string(),
            app_id: app_id.to_string(),
            session_id: session.id.clone(),
            connection_id: handle.id(),
        };
        self.visitors.register(&session.id, handle);
        self.push_session_update(&session.id);
        info!(session_id = %session.id, visitor_id, app_id, "visitor connected");
        Ok(ctx)
    }

    /// Removes the visitor socket unless a newer socket took its key.
    pub fn disconnect_visitor(&self, ctx: &VisitorContext) {
        if self
            .visitors
            .unregister_if_same(&ctx.session_id, ctx.connection_id)
        {
            info!(session_id = %ctx.session_id, visitor_id = %ctx.visitor_id, "visitor disconnected");
        }
    }

    pub fn connect_agent(&self, agent_id: &str, handle: ConnectionHandle) {
        self.agent_connections.register(agent_id, handle);
        info!(agent_id, "agent connected");
    }

    pub fn disconnect_agent(&self, agent_id: &str, connection_id: Uuid) {
        if self
            .agent_connections
            .unregister_if_same(agent_id, connection_id)
        {
            info!(agent_id, "agent disconnected");
        }
    }

    /// Handles one frame from a visitor socket.
    ///
    /// The frame's own `session_id` is ignored; the visitor always writes to
    /// its current open session, which may roll over to a new one.
    pub async fn handle_visitor_frame(
        &self,
        ctx: &mut VisitorContext,
        frame: InboundFrame,
    ) -> Result<VisitorOutcome, DesklineError> {
        if frame.msg_type.is_empty() {
            return Err(DesklineError::Validation("frame type is empty".into()));
        }
        if frame.payload.is_empty() {
            return Err(DesklineError::Validation("frame payload is empty".into()));
        }
        if let VisitorFrameKind::Unknown(kind) = VisitorFrameKind::from_type(&frame.msg_type) {
            debug!(visitor_id = %ctx.visitor_id, kind = %kind, "relaying custom visitor frame type");
        }

        let guard = self
            .locks
            .lock(keys::session_prefix(&ctx.visitor_id, &ctx.app_id))
            .await;
        let now = self.now();

        let mut session = self
            .sessions
            .get_or_create(&ctx.visitor_id, &ctx.app_id, now)
            .await?;

        let rolled_over = session.id != ctx.session_id;
        if rolled_over {
            self.visitors
                .rekey(&ctx.session_id, &session.id, ctx.connection_id);
            info!(
                old_session_id = %ctx.session_id,
                session_id = %session.id,
                "visitor moved to new session"
            );
            ctx.session_id = session.id.clone();
        }

        let mut message = Message::new(frame.msg_type, frame.payload, now);
        let message_id = self
            .messages
            .append(&ctx.visitor_id, &ctx.app_id, session.seq, &mut message)
            .await?;

        session.on_visitor_message(now);
        if !session.is_assigned() {
            if let Some(agent_id) = self.pick_agent(&session.app_id).await {
                session.assign_agent(&agent_id, now);
                info!(session_id = %session.id, agent_id = %agent_id, "session assigned");
            }
        }
        self.sessions.save(&session).await?;
        drop(guard);

        if rolled_over {
            self.push_session_update(&session.id);
        }

        let agent_id = session.is_assigned().then(|| session.cur_agent_id.clone());
        let push = match &agent_id {
            Some(agent_id) => {
                let payload = encode(&AgentPush::message_req(&session.id, &message))?;
                Some(self.agent_connections.push(agent_id, payload))
            }
            None => {
                debug!(session_id = %session.id, "no agent available, message stored only");
                None
            }
        };

        Ok(VisitorOutcome {
            session_id: session.id,
            message_id,
            agent_id,
            rolled_over,
            push,
        })
    }

    /// Handles one frame from an agent socket.
    ///
    /// The agent must be the session's assigned agent; otherwise nothing is
    /// written and an `Unauthorized` error is returned.
    pub async fn handle_agent_frame(
        &self,
        agent_id: &str,
        frame: InboundFrame,
    ) -> Result<AgentOutcome, DesklineError> {
        if frame.session_id.is_empty() {
            return Err(DesklineError::Validation("agent frame has no session_id".into()));
        }
        let key = parse_session_id(&frame.session_id)?;

        let guard = self
            .locks
            .lock(keys::session_prefix(&key.visitor_id, &key.app_id))
            .await;

        let Some(mut session) = self.sessions.get(&frame.session_id).await? else {
            return Err(DesklineError::NotFound(format!(
                "session {}",
                frame.session_id
            )));
        };

        if !session.is_assigned_to(agent_id) {
            warn!(
                session_id = %session.id,
                agent_id,
                assigned = %session.cur_agent_id,
                "agent is not assigned to session"
            );
            return Err(DesklineError::Unauthorized(format!(
                "agent {agent_id} is not assigned to session {}",
                session.id
            )));
        }

        let now = self.now();
        match AgentFrameKind::from_type(&frame.msg_type) {
            AgentFrameKind::Reply => {
                if session.closed {
                    return Err(DesklineError::Validation(format!(
                        "session {} is closed",
                        session.id
                    )));
                }
                if frame.payload.is_empty() {
                    return Err(DesklineError::Validation("reply payload is empty".into()));
                }
                let mut message = Message::new(frame.msg_type, frame.payload, now);
                let message_id = self
                    .messages
                    .append(&session.visitor_id, &session.app_id, session.seq, &mut message)
                    .await?;
                session.on_agent_reply(now);
                self.sessions.save(&session).await?;
                drop(guard);

                let payload = encode(&VisitorPush::from_message(&message))?;
                let push = self.visitors.push(&session.id, payload);
                debug!(session_id = %session.id, agent_id, ?push, "agent reply relayed");
                Ok(AgentOutcome::Replied { message_id, push })
            }
            AgentFrameKind::Close => {
                session.close();
                self.sessions.save(&session).await?;
                info!(session_id = %session.id, agent_id, "session closed by agent");
                Ok(AgentOutcome::Closed)
            }
            AgentFrameKind::FollowUp => {
                session.mark_follow_up();
                self.sessions.save(&session).await?;
                debug!(session_id = %session.id, agent_id, "session marked for follow-up");
                Ok(AgentOutcome::FollowUp)
            }
            AgentFrameKind::MarkRead => {
                session.mark_read(now);
                self.sessions.save(&session).await?;
                Ok(AgentOutcome::Read)
            }
            AgentFrameKind::Unknown(kind) => {
                debug!(session_id = %session.id, agent_id, kind = %kind, "ignoring agent frame");
                Ok(AgentOutcome::Ignored(kind))
            }
        }
    }

    /// Picks an on-duty agent for `app_id`.
    ///
    /// Candidates are shuffled, then the first serving the app exactly wins,
    /// then the first serving `all`. Directory failures leave the session
    /// unassigned until the next visitor message.
    async fn pick_agent(&self, app_id: &str) -> Option<String> {
        let mut candidates = match self
            .agents
            .list_agents(Role::Agent, DutyStatus::OnDuty, true)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(app_id, error = %e, "agent lookup failed, leaving session unassigned");
                return None;
            }
        };
        candidates.retain(AgentRecord::is_available);
        candidates.shuffle(&mut rand::thread_rng());

        candidates
            .iter()
            .find(|agent| agent.serves_app(app_id))
            .or_else(|| candidates.iter().find(|agent| agent.serves_all()))
            .map(|agent| agent.username.clone())
    }

    fn push_session_update(&self, session_id: &str) {
        match encode(&VisitorPush::session_update(session_id)) {
            Ok(payload) => {
                self.visitors.push(session_id, payload);
            }
            Err(e) => warn!(session_id, error = %e, "failed to encode session update"),
        }
    }

    /// Loads a session, mapping absence to `NotFound`.
    pub async fn session(&self, session_id: &str) -> Result<Session, DesklineError> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or_else(|| DesklineError::NotFound(format!("session {session_id}")))
    }

    /// Cancels every live socket.
    pub fn shutdown(&self) {
        self.visitors.close_all();
        self.agent_connections.close_all();
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.len()
    }
}
