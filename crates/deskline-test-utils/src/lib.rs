// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Deskline integration tests.
//!
//! # Components
//!
//! - [`MemoryDirectory`] - in-memory desk and agent directory that tests can
//!   mutate while a server is running
//! - [`TestHarness`] - a live gateway on an ephemeral port over a temp database

pub mod directory;
pub mod harness;

pub use directory::MemoryDirectory;
pub use harness::{TestHarness, TestHarnessBuilder};
