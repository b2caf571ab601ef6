// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway and relay router.
//!
//! Visitors connect to `/ws/visitor`, agents to `/ws/agent`. The [`Relay`]
//! owns both connection registries and moves frames between them, persisting
//! every message and session change through `deskline-storage` on the way.
//! A small bearer-authenticated JSON API exposes session state and history.

pub mod auth;
pub mod connection;
pub mod frames;
pub mod handlers;
pub mod origin;
pub mod registry;
pub mod relay;
pub mod server;
pub mod ws;

pub use auth::JwtAuthenticator;
pub use connection::ConnectionLimits;
pub use registry::{ConnectionRegistry, PushOutcome};
pub use relay::{AgentOutcome, Relay, VisitorContext, VisitorOutcome};
pub use server::{GatewayState, HealthState, ServerConfig, build_router, serve, start_server};
