// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composite key scheme for sessions and messages.
//!
//! Keys sort lexicographically in creation order within one visitor/app pair:
//!
//! ```text
//! s:{visitor_id}:{app_id}:{session_seq:010}
//! m:{visitor_id}:{app_id}:{session_seq:010}:{msg_seq:010}
//! ```
//!
//! Visitor and app identifiers must not contain `:`.

use crate::error::DesklineError;

/// Tag of session keys.
pub const SESSION_TAG: &str = "s";

/// Tag of message keys.
pub const MESSAGE_TAG: &str = "m";

/// Counter key backing session sequence numbers.
pub const SESSION_COUNTER: &str = "counter:session";

/// Counter key backing message sequence numbers.
pub const MESSAGE_COUNTER: &str = "counter:message";

/// Parsed form of a session id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub visitor_id: String,
    pub app_id: String,
    pub seq: u32,
}

impl SessionKey {
    pub fn new(visitor_id: impl Into<String>, app_id: impl Into<String>, seq: u32) -> Self {
        Self {
            visitor_id: visitor_id.into(),
            app_id: app_id.into(),
            seq,
        }
    }

    /// Renders the session id.
    pub fn id(&self) -> String {
        session_id(&self.visitor_id, &self.app_id, self.seq)
    }

    /// Prefix shared by every message of this session.
    pub fn message_prefix(&self) -> String {
        format!(
            "{MESSAGE_TAG}:{}:{}:{:010}:",
            self.visitor_id, self.app_id, self.seq
        )
    }
}

/// Parsed form of a message id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub session: SessionKey,
    pub seq: u32,
}

/// Formats a session id.
pub fn session_id(visitor_id: &str, app_id: &str, seq: u32) -> String {
    format!("{SESSION_TAG}:{visitor_id}:{app_id}:{seq:010}")
}

/// Prefix shared by every session of one visitor/app pair.
pub fn session_prefix(visitor_id: &str, app_id: &str) -> String {
    format!("{SESSION_TAG}:{visitor_id}:{app_id}:")
}

/// Formats a message id.
pub fn message_id(visitor_id: &str, app_id: &str, session_seq: u32, msg_seq: u32) -> String {
    format!("{MESSAGE_TAG}:{visitor_id}:{app_id}:{session_seq:010}:{msg_seq:010}")
}

/// Parses a session id. Exactly four `:`-separated fields with tag `s`.
pub fn parse_session_id(id: &str) -> Result<SessionKey, DesklineError> {
    let fields: Vec<&str> = id.split(':').collect();
    if fields.len() != 4 || fields[0] != SESSION_TAG {
        return Err(DesklineError::Validation(format!(
            "malformed session id: {id}"
        )));
    }
    if fields[1].is_empty() || fields[2].is_empty() {
        return Err(DesklineError::Validation(format!(
            "session id has empty visitor or app: {id}"
        )));
    }
    let seq = parse_seq(fields[3])
        .ok_or_else(|| DesklineError::Validation(format!("bad session sequence in id: {id}")))?;
    Ok(SessionKey::new(fields[1], fields[2], seq))
}

/// Parses a message id. Exactly five `:`-separated fields with tag `m`.
pub fn parse_message_id(id: &str) -> Result<MessageKey, DesklineError> {
    let fields: Vec<&str> = id.split(':').collect();
    if fields.len() != 5 || fields[0] != MESSAGE_TAG {
        return Err(DesklineError::Validation(format!(
            "malformed message id: {id}"
        )));
    }
    if fields[1].is_empty() || fields[2].is_empty() {
        return Err(DesklineError::Validation(format!(
            "message id has empty visitor or app: {id}"
        )));
    }
    let (Some(session_seq), Some(seq)) = (parse_seq(fields[3]), parse_seq(fields[4])) else {
        return Err(DesklineError::Validation(format!(
            "bad sequence in message id: {id}"
        )));
    };
    Ok(MessageKey {
        session: SessionKey::new(fields[1], fields[2], session_seq),
        seq,
    })
}

/// Checks that a visitor or app identifier can be embedded in a key.
pub fn validate_component(kind: &str, value: &str) -> Result<(), DesklineError> {
    if value.is_empty() {
        return Err(DesklineError::Validation(format!("{kind} must not be empty")));
    }
    if value.contains(':') {
        return Err(DesklineError::Validation(format!(
            "{kind} must not contain ':': {value}"
        )));
    }
    Ok(())
}

fn parse_seq(field: &str) -> Option<u32> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn session_id_is_zero_padded() {
        assert_eq!(session_id("alice", "shop1", 1), "s:alice:shop1:0000000001");
        assert_eq!(
            message_id("alice", "shop1", 1, 42),
            "m:alice:shop1:0000000001:0000000042"
        );
    }

    #[test]
    fn session_ids_sort_by_sequence() {
        let a = session_id("v", "a", 9);
        let b = session_id("v", "a", 10);
        assert!(a < b);
    }

    #[test]
    fn message_prefix_matches_message_ids() {
        let key = SessionKey::new("alice", "shop1", 7);
        let id = message_id("alice", "shop1", 7, 3);
        assert!(id.starts_with(&key.message_prefix()));
        assert!(!message_id("alice", "shop1", 70, 3).starts_with(&key.message_prefix()));
    }

    #[test]
    fn rejects_wrong_tag_and_field_count() {
        assert!(parse_session_id("m:alice:shop1:0000000001").is_err());
        assert!(parse_session_id("s:alice:shop1").is_err());
        assert!(parse_session_id("s:alice:shop1:0000000001:9").is_err());
        assert!(parse_session_id("s:alice:shop1:+1").is_err());
        assert!(parse_session_id("s::shop1:0000000001").is_err());
        assert!(parse_session_id("s:alice:shop1:99999999999").is_err());
    }

    #[test]
    fn parses_message_id() {
        let key = parse_message_id("m:alice:shop1:0000000002:0000000005").unwrap();
        assert_eq!(key.session, SessionKey::new("alice", "shop1", 2));
        assert_eq!(key.seq, 5);
        assert!(parse_message_id("s:alice:shop1:0000000002:0000000005").is_err());
    }

    #[test]
    fn component_validation() {
        assert!(validate_component("visitor_id", "alice").is_ok());
        assert!(validate_component("visitor_id", "").is_err());
        assert!(validate_component("app_id", "a:b").is_err());
    }

    proptest! {
        #[test]
        fn session_id_round_trips(
            visitor in "[A-Za-z0-9_.@-]{1,24}",
            app in "[A-Za-z0-9_.-]{1,16}",
            seq in any::<u32>(),
        ) {
            let parsed = parse_session_id(&session_id(&visitor, &app, seq)).unwrap();
            prop_assert_eq!(parsed, SessionKey::new(visitor, app, seq));
        }
    }
}
