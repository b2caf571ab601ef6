// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON frames exchanged over visitor and agent sockets.
//!
//! Client -> Server (both sides):
//! ```json
//! {"type": "message.req", "session_id": "s:alice:shop1:0000000001", "payload": "hi"}
//! ```
//!
//! Server -> Visitor:
//! ```json
//! {"type": "message.rsp", "payload": "hello, how can I help?"}
//! ```
//!
//! Server -> Agent:
//! ```json
//! {"type": "message.req", "session_id": "...", "message": {"id": "...", "type": "message.req", "content": "hi", "timestamp": 1700000000}}
//! ```

use deskline_core::{DesklineError, Message};
use serde::{Deserialize, Serialize};

/// Message type constants shared by both directions.
pub mod message_types {
    pub const MESSAGE_REQ: &str = "message.req";
    pub const MESSAGE_RSP: &str = "message.rsp";
    pub const TYPING: &str = "message.typing";
    pub const CLOSE_SESSION: &str = "close_session";
    pub const MARK_FOLLOW_UP: &str = "mark_follow_up";
    pub const MARK_READ: &str = "mark_read";
    pub const SESSION_UPDATE: &str = "session.update";
}

/// A frame received from either socket.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type", default)]
    pub msg_type: String,
    #[serde(default)]
    pub session_id: String,
    /// Accepts a JSON string or any other JSON value, kept as text.
    #[serde(default, deserialize_with = "payload_as_text")]
    pub payload: String,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, DesklineError> {
        serde_json::from_str(text)
            .map_err(|e| DesklineError::Validation(format!("malformed frame: {e}")))
    }
}

fn payload_as_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Frame kinds a visitor may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitorFrameKind {
    Message,
    Typing,
    /// Any other type. Still logged and relayed as a message.
    Unknown(String),
}

impl VisitorFrameKind {
    pub fn from_type(msg_type: &str) -> Self {
        match msg_type {
            message_types::MESSAGE_REQ => Self::Message,
            message_types::TYPING => Self::Typing,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Frame kinds an agent may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentFrameKind {
    Reply,
    Close,
    FollowUp,
    MarkRead,
    Unknown(String),
}

impl AgentFrameKind {
    pub fn from_type(msg_type: &str) -> Self {
        match msg_type {
            message_types::MESSAGE_RSP => Self::Reply,
            message_types::CLOSE_SESSION => Self::Close,
            message_types::MARK_FOLLOW_UP => Self::FollowUp,
            message_types::MARK_READ => Self::MarkRead,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Server -> visitor push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisitorPush {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub payload: String,
}

impl VisitorPush {
    pub fn from_message(message: &Message) -> Self {
        Self {
            msg_type: message.msg_type.clone(),
            payload: message.content.clone(),
        }
    }

    pub fn session_update(session_id: &str) -> Self {
        Self {
            msg_type: message_types::SESSION_UPDATE.to_string(),
            payload: session_id.to_string(),
        }
    }
}

/// Server -> agent push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentPush {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub session_id: String,
    pub message: Message,
}

impl AgentPush {
    pub fn message_req(session_id: &str, message: &Message) -> Self {
        Self {
            msg_type: message_types::MESSAGE_REQ.to_string(),
            session_id: session_id.to_string(),
            message: message.clone(),
        }
    }
}

/// Serializes an outbound frame, mapping failure to an internal error.
pub fn encode<T: Serialize>(frame: &T) -> Result<String, DesklineError> {
    serde_json::to_string(frame)
        .map_err(|e| DesklineError::Internal(format!("failed to encode frame: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frame_parses_string_payload() {
        let frame =
            InboundFrame::parse(r#"{"type":"message.req","session_id":"s:a:b:0000000001","payload":"hi"}"#)
                .unwrap();
        assert_eq!(frame.msg_type, "message.req");
        assert_eq!(frame.session_id, "s:a:b:0000000001");
        assert_eq!(frame.payload, "hi");
    }

    #[test]
    fn inbound_frame_keeps_structured_payload_as_json_text() {
        let frame = InboundFrame::parse(r#"{"type":"message.req","payload":{"url":"x"}}"#).unwrap();
        assert_eq!(frame.payload, r#"{"url":"x"}"#);
        assert!(frame.session_id.is_empty());
    }

    #[test]
    fn inbound_frame_missing_fields_default_empty() {
        let frame = InboundFrame::parse("{}").unwrap();
        assert!(frame.msg_type.is_empty());
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn malformed_frame_is_validation_error() {
        let err = InboundFrame::parse("not json").unwrap_err();
        assert!(matches!(err, DesklineError::Validation(_)));
    }

    #[test]
    fn frame_kinds_are_closed_with_unknown() {
        assert_eq!(VisitorFrameKind::from_type("message.req"), VisitorFrameKind::Message);
        assert_eq!(VisitorFrameKind::from_type("message.typing"), VisitorFrameKind::Typing);
        assert_eq!(
            VisitorFrameKind::from_type("image"),
            VisitorFrameKind::Unknown("image".into())
        );
        assert_eq!(AgentFrameKind::from_type("message.rsp"), AgentFrameKind::Reply);
        assert_eq!(AgentFrameKind::from_type("close_session"), AgentFrameKind::Close);
        assert_eq!(AgentFrameKind::from_type("mark_follow_up"), AgentFrameKind::FollowUp);
        assert_eq!(AgentFrameKind::from_type("mark_read"), AgentFrameKind::MarkRead);
        assert_eq!(
            AgentFrameKind::from_type("transfer"),
            AgentFrameKind::Unknown("transfer".into())
        );
    }

    #[test]
    fn agent_push_shape() {
        let mut msg = Message::new("message.req", "hi", 1_700_000_000);
        msg.id = "m:alice:shop1:0000000001:0000000001".into();
        let json: serde_json::Value =
            serde_json::from_str(&encode(&AgentPush::message_req("s:alice:shop1:0000000001", &msg)).unwrap())
                .unwrap();
        assert_eq!(json["type"], "message.req");
        assert_eq!(json["session_id"], "s:alice:shop1:0000000001");
        assert_eq!(json["message"]["content"], "hi");
        assert_eq!(json["message"]["type"], "message.req");
    }

    #[test]
    fn visitor_push_shape() {
        let json = encode(&VisitorPush::session_update("s:v:a:0000000002")).unwrap();
        assert_eq!(json, r#"{"type":"session.update","payload":"s:v:a:0000000002"}"#);
    }
}
