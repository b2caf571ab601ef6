// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support session record and its lifecycle state machine.
//!
//! ```text
//! unassigned -> assigned -> { unread | unreply | follow } -> closed
//! ```
//!
//! `closed` is terminal: every transition is a no-op on a closed session.
//! Status is never stored; it is derived from the timestamps and flags.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::keys::{self, SessionKey};

/// Derived status of a session.
///
/// Evaluated as: closed, unassigned, follow, unread, unreply, assigned. A
/// follow-up mark outranks the timestamp comparisons because marking zeroes
/// the read time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Closed,
    Unassigned,
    Follow,
    /// Visitor wrote after the agent last read.
    Unread,
    /// Visitor wrote after the agent last replied.
    Unreply,
    Assigned,
}

/// A conversation between one visitor and one desk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub visitor_id: String,
    pub app_id: String,
    pub seq: u32,
    /// Empty until an agent is assigned.
    #[serde(default)]
    pub cur_agent_id: String,
    pub created_at: i64,
    #[serde(default)]
    pub last_visitor_msg_time: i64,
    #[serde(default)]
    pub last_agent_reply_time: i64,
    #[serde(default)]
    pub last_agent_read_time: i64,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub follow_up: bool,
}

impl Session {
    /// Creates an open, unassigned session.
    pub fn new(visitor_id: &str, app_id: &str, seq: u32, now: i64) -> Self {
        Self {
            id: keys::session_id(visitor_id, app_id, seq),
            visitor_id: visitor_id.to_string(),
            app_id: app_id.to_string(),
            seq,
            cur_agent_id: String::new(),
            created_at: now,
            last_visitor_msg_time: 0,
            last_agent_reply_time: 0,
            last_agent_read_time: 0,
            closed: false,
            follow_up: false,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.visitor_id.clone(), self.app_id.clone(), self.seq)
    }

    pub fn is_assigned(&self) -> bool {
        !self.cur_agent_id.is_empty()
    }

    pub fn is_assigned_to(&self, agent_id: &str) -> bool {
        self.is_assigned() && self.cur_agent_id == agent_id
    }

    /// Derived status; the first matching rule wins.
    ///
    /// `follow_up` ranks above the read markers, so a flagged session keeps
    /// reporting `Follow` when the visitor writes again and never shows
    /// `Unread` until it is closed. The newer `last_visitor_msg_time` is
    /// still recorded.
    pub fn status(&self) -> SessionStatus {
        if self.closed {
            SessionStatus::Closed
        } else if !self.is_assigned() {
            SessionStatus::Unassigned
        } else if self.follow_up {
            SessionStatus::Follow
        } else if self.last_visitor_msg_time > self.last_agent_read_time {
            SessionStatus::Unread
        } else if self.last_visitor_msg_time > self.last_agent_reply_time {
            SessionStatus::Unreply
        } else {
            SessionStatus::Assigned
        }
    }

    /// Latest activity timestamp, or `created_at` when nobody has written yet.
    pub fn last_activity(&self) -> i64 {
        let activity = self.last_visitor_msg_time.max(self.last_agent_reply_time);
        if activity == 0 { self.created_at } else { activity }
    }

    /// True if the session has been idle for longer than `timeout_secs`.
    pub fn is_stale(&self, now: i64, timeout_secs: i64) -> bool {
        now - self.last_activity() > timeout_secs
    }

    pub fn on_visitor_message(&mut self, ts: i64) {
        if self.closed {
            return;
        }
        self.last_visitor_msg_time = ts;
    }

    /// A reply implies the agent has read everything before it.
    pub fn on_agent_reply(&mut self, ts: i64) {
        if self.closed {
            return;
        }
        self.last_agent_reply_time = ts;
        self.last_agent_read_time = ts;
    }

    /// Assigns `agent_id` if no agent is assigned yet. Returns whether the
    /// assignment happened.
    pub fn assign_agent(&mut self, agent_id: &str, _ts: i64) -> bool {
        if self.closed || self.is_assigned() || agent_id.is_empty() {
            return false;
        }
        self.cur_agent_id = agent_id.to_string();
        true
    }

    pub fn mark_read(&mut self, ts: i64) {
        if self.closed || !self.is_assigned() {
            return;
        }
        self.last_agent_read_time = ts;
    }

    pub fn mark_follow_up(&mut self) {
        if self.closed {
            return;
        }
        self.follow_up = true;
        self.last_agent_read_time = 0;
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.follow_up = false;
    }
}
