// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Deskline support-chat relay.
//!
//! This crate provides the error type, the composite key scheme, the session
//! state machine and the collaborator traits used throughout the workspace.

pub mod error;
pub mod keys;
pub mod session;
pub mod traits;
pub mod types;

pub use error::DesklineError;
pub use keys::{MessageKey, SessionKey};
pub use session::{Session, SessionStatus};
pub use traits::{AgentDirectory, Authenticator, DeskDirectory};
pub use types::{AgentRecord, DeskConfig, DutyStatus, HealthStatus, Message, Principal, Role};
