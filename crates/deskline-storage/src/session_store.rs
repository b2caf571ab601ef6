// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence of session records and the resolve-or-create policy.

use deskline_core::keys::{self, parse_session_id};
use deskline_core::{DesklineError, Session};
use tracing::{debug, info, warn};

use crate::kv::LogStore;
use crate::sequence::SequenceGenerator;

/// Idle time after which an open session is closed and replaced.
pub const DEFAULT_SESSION_TIMEOUT_SECS: i64 = 24 * 60 * 60;

#[derive(Clone)]
pub struct SessionStore {
    store: LogStore,
    seq: SequenceGenerator,
    timeout_secs: i64,
}

impl SessionStore {
    pub fn new(store: LogStore, seq: SequenceGenerator) -> Self {
        Self::with_timeout(store, seq, DEFAULT_SESSION_TIMEOUT_SECS)
    }

    pub fn with_timeout(store: LogStore, seq: SequenceGenerator, timeout_secs: i64) -> Self {
        Self {
            store,
            seq,
            timeout_secs,
        }
    }

    pub fn timeout_secs(&self) -> i64 {
        self.timeout_secs
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<Session>, DesklineError> {
        parse_session_id(session_id)?;
        let Some(raw) = self.store.get(session_id).await? else {
            return Ok(None);
        };
        let session = serde_json::from_slice(&raw).map_err(DesklineError::storage)?;
        Ok(Some(session))
    }

    pub async fn save(&self, session: &Session) -> Result<(), DesklineError> {
        let value = serde_json::to_vec(session).map_err(DesklineError::storage)?;
        self.store.put(&session.id, value, None).await
    }

    /// Newest session of the visitor/app pair, open or closed.
    pub async fn latest(
        &self,
        visitor_id: &str,
        app_id: &str,
    ) -> Result<Option<Session>, DesklineError> {
        Ok(self
            .list_for_visitor(visitor_id, app_id, 1)
            .await?
            .into_iter()
            .next())
    }

    /// Sessions of the visitor/app pair, newest first.
    pub async fn list_for_visitor(
        &self,
        visitor_id: &str,
        app_id: &str,
        limit: usize,
    ) -> Result<Vec<Session>, DesklineError> {
        keys::validate_component("visitor_id", visitor_id)?;
        keys::validate_component("app_id", app_id)?;

        let prefix = keys::session_prefix(visitor_id, app_id);
        let entries = self.store.scan(&prefix, true, Some(limit)).await?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_slice::<Session>(&entry.value) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!(key = %entry.key, error = %e, "skipping undecodable session");
                    None
                }
            })
            .collect())
    }

    /// Creates and persists a new session with a fresh sequence number.
    pub async fn create(
        &self,
        visitor_id: &str,
        app_id: &str,
        now: i64,
    ) -> Result<Session, DesklineError> {
        let seq = self.seq.next_session_seq().await?;
        let session = Session::new(visitor_id, app_id, seq, now);
        self.save(&session).await?;
        info!(session_id = %session.id, visitor_id, app_id, "session created");
        Ok(session)
    }

    /// Returns the visitor's current open session, rolling over to a new one
    /// when the latest is closed or idle past the timeout.
    pub async fn get_or_create(
        &self,
        visitor_id: &str,
        app_id: &str,
        now: i64,
    ) -> Result<Session, DesklineError> {
        match self.latest(visitor_id, app_id).await? {
            Some(mut session) if !session.closed => {
                if !session.is_stale(now, self.timeout_secs) {
                    debug!(session_id = %session.id, "reusing open session");
                    return Ok(session);
                }
                session.close();
                self.save(&session).await?;
                info!(
                    session_id = %session.id,
                    idle_secs = now - session.last_activity(),
                    "closed idle session"
                );
                self.create(visitor_id, app_id, now).await
            }
            _ => self.create(visitor_id, app_id, now).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use deskline_core::SessionStatus;
    use tempfile::tempdir;

    async fn setup() -> (SessionStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let store = LogStore::new(db);
        let sessions = SessionStore::new(store.clone(), SequenceGenerator::new(store));
        (sessions, dir)
    }

    const T0: i64 = 1_700_000_000;

    #[tokio::test]
    async fn first_call_creates_session() {
        let (sessions, _dir) = setup().await;
        let s = sessions.get_or_create("alice", "shop1", T0).await.unwrap();
        assert_eq!(s.id, "s:alice:shop1:0000000001");
        assert_eq!(s.status(), SessionStatus::Unassigned);
        assert_eq!(sessions.get(&s.id).await.unwrap().unwrap(), s);
    }

    #[tokio::test]
    async fn open_session_is_reused() {
        let (sessions, _dir) = setup().await;
        let mut s = sessions.get_or_create("alice", "shop1", T0).await.unwrap();
        s.on_visitor_message(T0 + 10);
        sessions.save(&s).await.unwrap();

        let again = sessions
            .get_or_create("alice", "shop1", T0 + 3_600)
            .await
            .unwrap();
        assert_eq!(again, s);
    }

    #[tokio::test]
    async fn idle_session_rolls_over() {
        let (sessions, _dir) = setup().await;
        let mut s = sessions.get_or_create("alice", "shop1", T0).await.unwrap();
        s.on_visitor_message(T0 + 5);
        sessions.save(&s).await.unwrap();

        let later = T0 + 5 + DEFAULT_SESSION_TIMEOUT_SECS + 1;
        let next = sessions.get_or_create("alice", "shop1", later).await.unwrap();
        assert!(next.seq > s.seq);
        assert!(!next.closed);

        let old = sessions.get(&s.id).await.unwrap().unwrap();
        assert!(old.closed);
        assert_eq!(old.status(), SessionStatus::Closed);
    }

    #[tokio::test]
    async fn closed_session_is_not_reused() {
        let (sessions, _dir) = setup().await;
        let mut s = sessions.get_or_create("alice", "shop1", T0).await.unwrap();
        s.close();
        sessions.save(&s).await.unwrap();

        let next = sessions.get_or_create("alice", "shop1", T0 + 1).await.unwrap();
        assert_ne!(next.id, s.id);
        assert!(next.seq > s.seq);
    }

    #[tokio::test]
    async fn pairs_are_isolated_and_listed_newest_first() {
        let (sessions, _dir) = setup().await;
        let a1 = sessions.create("alice", "shop1", T0).await.unwrap();
        let b1 = sessions.create("bob", "shop1", T0).await.unwrap();
        let a2 = sessions.create("alice", "shop1", T0 + 1).await.unwrap();

        let listed = sessions.list_for_visitor("alice", "shop1", 10).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![a2.id.clone(), a1.id.clone()]);

        let latest = sessions.latest("bob", "shop1").await.unwrap().unwrap();
        assert_eq!(latest.id, b1.id);
        assert!(sessions.latest("carol", "shop1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_ids_are_rejected() {
        let (sessions, _dir) = setup().await;
        assert!(matches!(
            sessions.get("bogus").await,
            Err(DesklineError::Validation(_))
        ));
        assert!(matches!(
            sessions.get_or_create("a:b", "shop1", T0).await,
            Err(DesklineError::Validation(_))
        ));
    }
}
