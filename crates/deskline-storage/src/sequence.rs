// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Global 32-bit sequence numbers for sessions and messages.

use deskline_core::DesklineError;
use deskline_core::keys::{MESSAGE_COUNTER, SESSION_COUNTER};

use crate::kv::LogStore;

/// Issues strictly increasing `u32` sequence numbers. The first call on a
/// fresh store returns 1. Exhaustion is an error, never a wrap-around.
#[derive(Clone)]
pub struct SequenceGenerator {
    store: LogStore,
}

impl SequenceGenerator {
    pub fn new(store: LogStore) -> Self {
        Self { store }
    }

    pub async fn next_session_seq(&self) -> Result<u32, DesklineError> {
        self.next(SESSION_COUNTER).await
    }

    pub async fn next_message_seq(&self) -> Result<u32, DesklineError> {
        self.next(MESSAGE_COUNTER).await
    }

    async fn next(&self, counter: &str) -> Result<u32, DesklineError> {
        let value = self.store.atomic_increment(counter).await?;
        u32::try_from(value).map_err(|_| {
            DesklineError::storage_msg(format!("sequence {counter} exhausted at {value}"))
        })
    }
}
