// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyed registries of live socket connections.
//!
//! Visitors are keyed by their current session id, agents by username. Each
//! key holds at most one handle. Pushes never block: a missing key drops the
//! payload, a full queue drops it with a warning.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Sending side of one live connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
    dropped: Arc<AtomicU64>,
}

impl ConnectionHandle {
    /// Creates a handle and the receiver its write loop drains.
    pub fn new(capacity: usize, cancel: CancellationToken) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            tx,
            cancel,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (handle, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Token shared by the connection's read and write loops.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Payloads dropped because the queue was full or closed.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn try_push(&self, payload: String) -> PushOutcome {
        if self.cancel.is_cancelled() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return PushOutcome::Closed;
        }
        match self.tx.try_send(payload) {
            Ok(()) => PushOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::QueueFull
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Closed
            }
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("dropped", &self.drop_count())
            .finish()
    }
}

/// Result of a non-blocking push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// No connection registered under the key.
    Offline,
    QueueFull,
    /// The connection is shutting down.
    Closed,
}

impl PushOutcome {
    pub fn is_queued(self) -> bool {
        self == PushOutcome::Queued
    }
}

/// Concurrent map from key to live connection.
pub struct ConnectionRegistry {
    kind: &'static str,
    connections: DashMap<String, ConnectionHandle>,
}

impl ConnectionRegistry {
    /// `kind` labels log lines ("visitor", "agent").
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            connections: DashMap::new(),
        }
    }

    /// Registers `handle` under `key`, replacing any previous handle.
    ///
    /// The replaced connection is not closed; its own teardown will find the
    /// entry no longer matches and leave it alone.
    pub fn register(&self, key: &str, handle: ConnectionHandle) {
        if let Some(previous) = self.connections.insert(key.to_string(), handle) {
            tracing::debug!(
                registry = self.kind,
                key,
                replaced = %previous.id,
                "connection replaced"
            );
        }
    }

    /// Removes `key` only if it still maps to the handle with `id`.
    pub fn unregister_if_same(&self, key: &str, id: Uuid) -> bool {
        self.connections
            .remove_if(key, |_, handle| handle.id == id)
            .is_some()
    }

    /// Moves the handle with `id` from `old_key` to `new_key`.
    ///
    /// Returns false if `old_key` no longer holds that handle.
    pub fn rekey(&self, old_key: &str, new_key: &str, id: Uuid) -> bool {
        match self.connections.remove_if(old_key, |_, handle| handle.id == id) {
            Some((_, handle)) => {
                self.register(new_key, handle);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<ConnectionHandle> {
        self.connections.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.connections.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Enqueues `payload` for `key` without waiting.
    ///
    /// The handle is cloned out of the map before sending, so no shard lock
    /// is held across the send. A connection that goes away between lookup
    /// and send simply loses the payload.
    pub fn push(&self, key: &str, payload: String) -> PushOutcome {
        let Some(handle) = self.get(key) else {
            tracing::debug!(registry = self.kind, key, "recipient offline, dropping");
            return PushOutcome::Offline;
        };
        let outcome = handle.try_push(payload);
        match outcome {
            PushOutcome::QueueFull => {
                tracing::warn!(
                    registry = self.kind,
                    key,
                    dropped = handle.drop_count(),
                    "send queue full, dropping"
                );
            }
            PushOutcome::Closed => {
                tracing::debug!(registry = self.kind, key, "connection closing, dropping");
            }
            _ => {}
        }
        outcome
    }

    /// Cancels every registered connection.
    pub fn close_all(&self) {
        for entry in self.connections.iter() {
            entry.value().cancel.cancel();
        }
    }
}
