// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator interfaces the relay consumes.
//!
//! All traits use `#[async_trait]` so they can be held as `Arc<dyn _>`.

pub mod auth;
pub mod directory;

pub use auth::Authenticator;
pub use directory::{AgentDirectory, DeskDirectory};
