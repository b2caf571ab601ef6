// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Duplex read/write loops for one WebSocket connection.
//!
//! The write loop drains the connection's outbound queue and sends a
//! keepalive ping on a fixed period. The read loop hands each text frame to a
//! [`TextHandler`] and gives up when nothing arrives within the read timeout. Both
//! share a cancellation token; whichever ends first cancels the other.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Per-connection timing and queue limits.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub ping_interval: Duration,
    pub queue_capacity: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(25),
            queue_capacity: 128,
        }
    }
}

/// Receives the text frames of one connection, in order.
#[async_trait]
pub trait TextHandler: Send {
    async fn on_text(&mut self, text: String);
}

/// Why a loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    /// Peer sent a close frame or the stream ended.
    PeerClosed,
    TimedOut,
    Failed,
}

/// Flushes queued payloads and keepalive pings to `sink` until cancelled.
pub async fn run_write_loop<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<String>,
    limits: ConnectionLimits,
    cancel: CancellationToken,
) -> LoopExit
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping = time::interval_at(
        Instant::now() + limits.ping_interval,
        limits.ping_interval,
    );

    let exit = loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break LoopExit::Cancelled,
            next = rx.recv() => match next {
                Some(payload) => Message::Text(payload.into()),
                None => break LoopExit::Cancelled,
            },
            _ = ping.tick() => Message::Ping(Default::default()),
        };

        match time::timeout(limits.write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "websocket write failed");
                break LoopExit::Failed;
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = limits.write_timeout.as_secs(),
                    "websocket write timed out"
                );
                break LoopExit::TimedOut;
            }
        }
    };

    cancel.cancel();
    let _ = time::timeout(limits.write_timeout, sink.close()).await;
    exit
}

/// Reads frames from `stream`, passing each text payload to `handler`.
///
/// Control and binary frames are skipped but still count as activity for the
/// read timeout.
pub async fn run_read_loop<R, E, H>(
    mut stream: R,
    limits: ConnectionLimits,
    cancel: CancellationToken,
    handler: &mut H,
) -> LoopExit
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
    H: TextHandler + ?Sized,
{
    let exit = loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break LoopExit::Cancelled,
            next = time::timeout(limits.read_timeout, stream.next()) => next,
        };

        match next {
            Err(_) => {
                tracing::info!(
                    timeout_secs = limits.read_timeout.as_secs(),
                    "websocket read timed out"
                );
                break LoopExit::TimedOut;
            }
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => break LoopExit::PeerClosed,
            Ok(Some(Err(e))) => {
                tracing::debug!(error = %e, "websocket read failed");
                break LoopExit::Failed;
            }
            Ok(Some(Ok(Message::Text(text)))) => handler.on_text(text.as_str().to_owned()).await,
            Ok(Some(Ok(_))) => {}
        }
    };

    cancel.cancel();
    exit
}
