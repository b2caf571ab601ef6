// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only chat message log.
//!
//! Messages of one session share the key prefix
//! `m:{visitor}:{app}:{session_seq}:` and sort by message sequence, so the
//! latest N are a bounded reverse scan.

use std::time::Duration;

use deskline_core::keys::{self, parse_message_id, parse_session_id};
use deskline_core::{DesklineError, Message};
use tracing::{debug, warn};

use crate::kv::LogStore;
use crate::sequence::SequenceGenerator;

/// Default page size for [`MessageLog::fetch_recent`].
pub const DEFAULT_FETCH_LIMIT: usize = 50;

/// Largest page [`MessageLog::fetch_recent`] accepts.
pub const MAX_FETCH_LIMIT: usize = 100;

/// Retention of appended messages.
pub const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Clone)]
pub struct MessageLog {
    store: LogStore,
    seq: SequenceGenerator,
    ttl: Duration,
}

impl MessageLog {
    pub fn new(store: LogStore, seq: SequenceGenerator) -> Self {
        Self::with_ttl(store, seq, DEFAULT_MESSAGE_TTL)
    }

    pub fn with_ttl(store: LogStore, seq: SequenceGenerator, ttl: Duration) -> Self {
        Self { store, seq, ttl }
    }

    /// Appends `message` to the session and writes the new id back onto it.
    pub async fn append(
        &self,
        visitor_id: &str,
        app_id: &str,
        session_seq: u32,
        message: &mut Message,
    ) -> Result<String, DesklineError> {
        keys::validate_component("visitor_id", visitor_id)?;
        keys::validate_component("app_id", app_id)?;

        let msg_seq = self.seq.next_message_seq().await?;
        let id = keys::message_id(visitor_id, app_id, session_seq, msg_seq);
        message.id = id.clone();

        let value = serde_json::to_vec(message).map_err(DesklineError::storage)?;
        self.store.put(&id, value, Some(self.ttl)).await?;
        debug!(message_id = %id, msg_type = %message.msg_type, "message appended");
        Ok(id)
    }

    /// Latest messages of a session in chronological order. A `limit` outside
    /// `1..=100` falls back to 50.
    pub async fn fetch_recent(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<Message>, DesklineError> {
        let key = parse_session_id(session_id)?;
        let limit = clamp_limit(limit);

        let entries = self
            .store
            .scan(&key.message_prefix(), true, Some(limit))
            .await?;

        let mut messages: Vec<Message> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_slice::<Message>(&entry.value) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!(key = %entry.key, error = %e, "skipping undecodable message");
                    None
                }
            })
            .collect();
        messages.reverse();
        Ok(messages)
    }

    /// Loads one message by id. Unknown or expired ids are `None`.
    pub async fn get(&self, message_id: &str) -> Result<Option<Message>, DesklineError> {
        parse_message_id(message_id)?;
        let Some(raw) = self.store.get(message_id).await? else {
            return Ok(None);
        };
        let message = serde_json::from_slice(&raw).map_err(DesklineError::storage)?;
        Ok(Some(message))
    }
}

fn clamp_limit(limit: i64) -> usize {
    if limit <= 0 || limit > MAX_FETCH_LIMIT as i64 {
        DEFAULT_FETCH_LIMIT
    } else {
        limit as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use tempfile::tempdir;

    async fn setup() -> (MessageLog, LogStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let store = LogStore::new(db);
        let log = MessageLog::new(store.clone(), SequenceGenerator::new(store.clone()));
        (log, store, dir)
    }

    #[test]
    fn limit_clamping() {
        assert_eq!(clamp_limit(0), 50);
        assert_eq!(clamp_limit(-3), 50);
        assert_eq!(clamp_limit(101), 50);
        assert_eq!(clamp_limit(1), 1);
        assert_eq!(clamp_limit(100), 100);
    }

    #[tokio::test]
    async fn append_assigns_id() {
        let (log, _store, _dir) = setup().await;
        let mut msg = Message::new("message.req", "hello", 100);
        let id = log.append("alice", "shop1", 1, &mut msg).await.unwrap();
        assert_eq!(id, "m:alice:shop1:0000000001:0000000001");
        assert_eq!(msg.id, id);

        let loaded = log.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded, msg);
        assert!(
            log.get("m:alice:shop1:0000000001:0000000009")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn fetch_recent_is_chronological_and_bounded() {
        let (log, _store, _dir) = setup().await;
        for i in 0..120 {
            let mut msg = Message::new("message.req", format!("m{i}"), 1_000 + i);
            log.append("alice", "shop1", 1, &mut msg).await.unwrap();
        }
        // Another session of the same pair must not leak in.
        let mut other = Message::new("message.req", "other", 5_000);
        log.append("alice", "shop1", 2, &mut other).await.unwrap();

        let recent = log
            .fetch_recent("s:alice:shop1:0000000001", 10)
            .await
            .unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent.first().unwrap().content, "m110");
        assert_eq!(recent.last().unwrap().content, "m119");
        assert!(recent.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let clamped = log
            .fetch_recent("s:alice:shop1:0000000001", 500)
            .await
            .unwrap();
        assert_eq!(clamped.len(), DEFAULT_FETCH_LIMIT);
        assert_eq!(clamped.last().unwrap().content, "m119");
    }

    #[tokio::test]
    async fn fetch_recent_rejects_malformed_id() {
        let (log, _store, _dir) = setup().await;
        let err = log
            .fetch_recent("m:alice:shop1:0000000001", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, DesklineError::Validation(_)));
    }

    #[tokio::test]
    async fn undecodable_entries_are_skipped() {
        let (log, store, _dir) = setup().await;
        let mut msg = Message::new("message.req", "ok", 10);
        log.append("alice", "shop1", 3, &mut msg).await.unwrap();
        store
            .put("m:alice:shop1:0000000003:9999999999", b"not json".to_vec(), None)
            .await
            .unwrap();

        let recent = log
            .fetch_recent("s:alice:shop1:0000000003", 10)
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "ok");
    }
}
