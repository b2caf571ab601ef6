// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Deskline relay.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and a
//! single-writer concurrency model via `tokio-rusqlite`. On top of it sit an
//! ordered key-value log store, global sequence counters, the append-only
//! message log, the session store and the desk/agent directory tables.

pub mod database;
pub mod directory;
pub mod kv;
pub mod message_log;
pub mod migrations;
pub mod sequence;
pub mod session_store;

pub use database::Database;
pub use directory::SqliteDirectory;
pub use kv::{Entry, LogStore};
pub use message_log::MessageLog;
pub use sequence::SequenceGenerator;
pub use session_store::SessionStore;

/// Every store of one database, built over a single connection.
#[derive(Clone)]
pub struct Stores {
    pub db: Database,
    pub kv: LogStore,
    pub sessions: SessionStore,
    pub messages: MessageLog,
    pub directory: SqliteDirectory,
}

impl Stores {
    /// Builds all stores with the given session timeout and message TTL.
    pub fn new(db: Database, session_timeout_secs: i64, message_ttl: std::time::Duration) -> Self {
        let kv = LogStore::new(db.clone());
        let seq = SequenceGenerator::new(kv.clone());
        Self {
            sessions: SessionStore::with_timeout(kv.clone(), seq.clone(), session_timeout_secs),
            messages: MessageLog::with_ttl(kv.clone(), seq, message_ttl),
            directory: SqliteDirectory::new(db.clone()),
            kv,
            db,
        }
    }
}
