// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered key-value log store on the `kv` table.
//!
//! Every operation runs as one closure on the storage thread, so each call is
//! transactionally isolated. Expired rows are invisible to reads and are
//! physically removed by [`LogStore::purge_expired`].

use std::time::Duration;

use deskline_core::DesklineError;
use rusqlite::{OptionalExtension, TransactionBehavior, params};
use tracing::{debug, warn};

use crate::database::{Database, map_tr_err};

/// One row returned by a prefix scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: Vec<u8>,
}

/// Handle to the key-value log store.
#[derive(Clone)]
pub struct LogStore {
    db: Database,
}

impl LogStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Writes `value` under `key`, replacing any previous value.
    pub async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), DesklineError> {
        let expires_at = ttl.map(|ttl| expiry_after(now(), ttl));
        self.put_until(key, value, expires_at).await
    }

    /// Writes `value` under `key` with an absolute expiry in Unix seconds.
    pub async fn put_until(
        &self,
        key: &str,
        value: Vec<u8>,
        expires_at: Option<i64>,
    ) -> Result<(), DesklineError> {
        let key = key.as_bytes().to_vec();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                    expires_at = excluded.expires_at",
                    params![key, value, expires_at],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Reads the live value under `key`. A missing or expired key is `None`.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DesklineError> {
        let key = key.as_bytes().to_vec();
        let now = now();
        self.db
            .connection()
            .call(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM kv
                         WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                        params![key, now],
                        |row| row.get::<_, Vec<u8>>(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Iterates live entries whose key starts with `prefix`, in key order or
    /// reversed. `limit` of `None` returns every match.
    pub async fn scan(
        &self,
        prefix: &str,
        reverse: bool,
        limit: Option<usize>,
    ) -> Result<Vec<Entry>, DesklineError> {
        let lower = prefix.as_bytes().to_vec();
        let upper = prefix_upper_bound(&lower);
        let limit = limit.map_or(-1, |l| l as i64);
        let order = if reverse { "DESC" } else { "ASC" };
        let now = now();

        let rows = self
            .db
            .connection()
            .call(move |conn| {
                let rows = match upper {
                    Some(upper) => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT key, value FROM kv
                             WHERE key >= ?1 AND key < ?2
                               AND (expires_at IS NULL OR expires_at > ?3)
                             ORDER BY key {order} LIMIT ?4"
                        ))?;
                        stmt.query_map(params![lower, upper, now, limit], |row| {
                            Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
                        })?
                        .collect::<Result<Vec<_>, _>>()?
                    }
                    None => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT key, value FROM kv
                             WHERE key >= ?1
                               AND (expires_at IS NULL OR expires_at > ?2)
                             ORDER BY key {order} LIMIT ?3"
                        ))?;
                        stmt.query_map(params![lower, now, limit], |row| {
                            Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
                        })?
                        .collect::<Result<Vec<_>, _>>()?
                    }
                };
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        let mut entries = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            match String::from_utf8(key) {
                Ok(key) => entries.push(Entry { key, value }),
                Err(e) => warn!(error = %e, "skipping kv entry with non-UTF-8 key"),
            }
        }
        Ok(entries)
    }

    /// Increments the decimal counter stored under `counter_key` and returns
    /// the new value. A missing counter starts at 0, so the first call
    /// returns 1. Concurrent callers never observe the same value.
    pub async fn atomic_increment(&self, counter_key: &str) -> Result<u64, DesklineError> {
        let key = counter_key.as_bytes().to_vec();
        let next = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let current: Option<Vec<u8>> = tx
                    .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                        row.get(0)
                    })
                    .optional()?;
                let current = match current {
                    Some(raw) => parse_counter(&raw).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            0,
                            rusqlite::types::Type::Blob,
                            "counter value is not a decimal integer".into(),
                        )
                    })?,
                    None => 0,
                };
                let next = current.checked_add(1).ok_or_else(|| {
                    rusqlite::Error::IntegralValueOutOfRange(0, i64::MAX)
                })?;
                tx.execute(
                    "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, NULL)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, next.to_string().into_bytes()],
                )?;
                tx.commit()?;
                Ok(next)
            })
            .await
            .map_err(map_tr_err)?;
        debug!(counter = counter_key, value = next, "counter incremented");
        Ok(next)
    }

    /// Removes `key`. Returns whether a row was deleted.
    pub async fn delete(&self, key: &str) -> Result<bool, DesklineError> {
        let key = key.as_bytes().to_vec();
        self.db
            .connection()
            .call(move |conn| {
                let n = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                Ok(n > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Physically deletes expired rows. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<usize, DesklineError> {
        let now = now();
        let removed = self
            .db
            .connection()
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    params![now],
                )?;
                Ok(n)
            })
            .await
            .map_err(map_tr_err)?;
        if removed > 0 {
            debug!(removed, "purged expired kv entries");
        }
        Ok(removed)
    }
}

/// Smallest byte string greater than every string starting with `prefix`.
/// `None` when the prefix is empty or all `0xFF`, i.e. there is no upper bound.
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let last = prefix.iter().rposition(|&b| b != 0xFF)?;
    let mut upper = prefix[..=last].to_vec();
    upper[last] += 1;
    Some(upper)
}

fn parse_counter(raw: &[u8]) -> Option<u64> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// `now + ttl` in Unix seconds, clamped to `i64::MAX`.
fn expiry_after(now: i64, ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).map_or(i64::MAX, |secs| now.saturating_add(secs))
}
