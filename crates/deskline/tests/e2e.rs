// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests over real sockets.
//!
//! Each test starts an isolated TestHarness (temp SQLite, in-memory
//! directory, gateway on an ephemeral port) and drives it with
//! tokio-tungstenite clients. Tests are independent and order-insensitive.

use std::time::Duration;

use deskline_core::{DutyStatus, Role, SessionStatus};
use deskline_test_utils::TestHarness;
use deskline_test_utils::directory::{agent, desk};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const ORIGIN: &str = "https://www.shop.example";

async fn harness() -> TestHarness {
    TestHarness::builder()
        .with_desk(desk("shop1", &["*.shop.example"]))
        .with_agent(agent("bob", &["shop1"]))
        .build()
        .await
        .unwrap()
}

async fn connect_with_origin(url: &str, origin: Option<&str>) -> Result<Client, WsError> {
    let mut request = url.into_client_request()?;
    if let Some(origin) = origin {
        request
            .headers_mut()
            .insert("Origin", HeaderValue::from_str(origin).unwrap());
    }
    connect_async(request).await.map(|(ws, _)| ws)
}

async fn connect_visitor(harness: &TestHarness, visitor_id: &str) -> Client {
    connect_with_origin(&harness.visitor_url(visitor_id, "shop1"), Some(ORIGIN))
        .await
        .unwrap()
}

async fn connect_agent(harness: &TestHarness, username: &str) -> Client {
    let token = harness.token(username, Role::Agent).unwrap();
    let (ws, _) = connect_async(harness.agent_url(&token)).await.unwrap();
    ws
}

/// Next text frame as JSON, skipping control frames.
async fn next_json(ws: &mut Client) -> Value {
    let deadline = Duration::from_secs(5);
    loop {
        let msg = tokio::time::timeout(deadline, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket ended")
            .expect("socket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn send_json(ws: &mut Client, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

fn rejected_status(err: WsError) -> StatusCode {
    match err {
        WsError::Http(response) => response.status(),
        other => panic!("expected an HTTP rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn session_update_is_first_visitor_frame() {
    let harness = harness().await;
    let mut visitor = connect_visitor(&harness, "alice").await;

    let first = next_json(&mut visitor).await;
    assert_eq!(first["type"], "session.update");
    let session_id = first["payload"].as_str().unwrap();
    assert!(session_id.starts_with("s:alice:shop1:"));

    // Reconnecting inside the timeout resumes the same session.
    drop(visitor);
    let mut again = connect_visitor(&harness, "alice").await;
    assert_eq!(next_json(&mut again).await["payload"], session_id);
}

#[tokio::test]
async fn visitor_message_reaches_assigned_agent_and_reply_comes_back() {
    let harness = harness().await;
    let mut agent_ws = connect_agent(&harness, "bob").await;
    let mut visitor = connect_visitor(&harness, "alice").await;
    let session_id = next_json(&mut visitor).await["payload"]
        .as_str()
        .unwrap()
        .to_string();

    send_json(&mut visitor, json!({"type": "message.req", "payload": "hi"})).await;

    let push = next_json(&mut agent_ws).await;
    assert_eq!(push["type"], "message.req");
    assert_eq!(push["session_id"], session_id.as_str());
    assert_eq!(push["message"]["content"], "hi");
    assert!(
        push["message"]["id"]
            .as_str()
            .unwrap()
            .starts_with("m:alice:shop1:")
    );

    send_json(
        &mut agent_ws,
        json!({"type": "message.rsp", "session_id": session_id, "payload": "hello"}),
    )
    .await;

    let reply = next_json(&mut visitor).await;
    assert_eq!(reply, json!({"type": "message.rsp", "payload": "hello"}));

    let session = harness.relay.session(&session_id).await.unwrap();
    assert_eq!(session.cur_agent_id, "bob");
    assert_eq!(session.status(), SessionStatus::Assigned);

    let log = harness
        .stores
        .messages
        .fetch_recent(&session_id, 10)
        .await
        .unwrap();
    let contents: Vec<_> = log.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hi", "hello"]);

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn agent_actions_update_session_state() {
    let harness = harness().await;
    let mut agent_ws = connect_agent(&harness, "bob").await;
    let mut visitor = connect_visitor(&harness, "alice").await;
    let session_id = next_json(&mut visitor).await["payload"]
        .as_str()
        .unwrap()
        .to_string();

    send_json(&mut visitor, json!({"type": "message.req", "payload": "help"})).await;
    next_json(&mut agent_ws).await;

    send_json(
        &mut agent_ws,
        json!({"type": "mark_follow_up", "session_id": session_id}),
    )
    .await;
    assert_eq!(
        wait_for_status(&harness, &session_id, SessionStatus::Follow).await,
        SessionStatus::Follow
    );

    send_json(
        &mut agent_ws,
        json!({"type": "close_session", "session_id": session_id}),
    )
    .await;
    assert_eq!(
        wait_for_status(&harness, &session_id, SessionStatus::Closed).await,
        SessionStatus::Closed
    );
    // Closing clears the follow-up flag.
    assert!(!harness.relay.session(&session_id).await.unwrap().follow_up);
}

/// Polls the stored session until it reaches `want` or a deadline passes.
async fn wait_for_status(
    harness: &TestHarness,
    session_id: &str,
    want: SessionStatus,
) -> SessionStatus {
    let mut status = harness.relay.session(session_id).await.unwrap().status();
    for _ in 0..100 {
        if status == want {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        status = harness.relay.session(session_id).await.unwrap().status();
    }
    status
}

#[tokio::test]
async fn message_without_on_duty_agent_stays_unassigned() {
    let harness = harness().await;
    assert!(harness.directory.set_status("bob", DutyStatus::Away).await);

    let mut visitor = connect_visitor(&harness, "alice").await;
    let session_id = next_json(&mut visitor).await["payload"]
        .as_str()
        .unwrap()
        .to_string();
    send_json(&mut visitor, json!({"type": "message.req", "payload": "anyone?"})).await;

    let mut logged = Vec::new();
    for _ in 0..100 {
        logged = harness
            .stores
            .messages
            .fetch_recent(&session_id, 10)
            .await
            .unwrap();
        if !logged.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(logged.len(), 1);
    let session = harness.relay.session(&session_id).await.unwrap();
    assert_eq!(session.status(), SessionStatus::Unassigned);
}

#[tokio::test]
async fn visitor_origin_is_enforced() {
    let harness = harness().await;
    let url = harness.visitor_url("alice", "shop1");

    let err = connect_with_origin(&url, Some("https://evil.example"))
        .await
        .unwrap_err();
    assert_eq!(rejected_status(err), StatusCode::FORBIDDEN);

    let err = connect_with_origin(&url, None).await.unwrap_err();
    assert_eq!(rejected_status(err), StatusCode::FORBIDDEN);

    assert!(connect_with_origin(&url, Some(ORIGIN)).await.is_ok());
}

#[tokio::test]
async fn visitor_connect_rejections() {
    let harness = harness().await;

    let err = connect_with_origin(&harness.visitor_url("alice", "nope"), Some(ORIGIN))
        .await
        .unwrap_err();
    assert_eq!(rejected_status(err), StatusCode::NOT_FOUND);

    let err = connect_with_origin(&harness.visitor_url("", "shop1"), Some(ORIGIN))
        .await
        .unwrap_err();
    assert_eq!(rejected_status(err), StatusCode::BAD_REQUEST);

    assert!(harness.directory.set_desk_enabled("shop1", false).await);
    let err = connect_with_origin(&harness.visitor_url("alice", "shop1"), Some(ORIGIN))
        .await
        .unwrap_err();
    assert_eq!(rejected_status(err), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn agent_connect_requires_valid_agent_token() {
    let harness = harness().await;
    let base = format!("ws://{}/ws/agent", harness.addr);

    let err = connect_async(base.as_str()).await.unwrap_err();
    assert_eq!(rejected_status(err), StatusCode::UNAUTHORIZED);

    let err = connect_async(harness.agent_url("not-a-jwt")).await.unwrap_err();
    assert_eq!(rejected_status(err), StatusCode::UNAUTHORIZED);

    // Valid signature, but no such agent account.
    let token = harness.token("mallory", Role::Agent).unwrap();
    let err = connect_async(harness.agent_url(&token)).await.unwrap_err();
    assert_eq!(rejected_status(err), StatusCode::UNAUTHORIZED);

    // Bearer header works as well as the query parameter.
    let token = harness.token("bob", Role::Agent).unwrap();
    let mut request = base.into_client_request().unwrap();
    request.headers_mut().insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    assert!(connect_async(request).await.is_ok());
}

#[tokio::test]
async fn reply_from_unassigned_agent_is_not_delivered() {
    let harness = TestHarness::builder()
        .with_desk(desk("shop1", &["*.shop.example"]))
        .with_agent(agent("bob", &["shop1"]))
        .with_agent(agent("carol", &["other"]))
        .build()
        .await
        .unwrap();
    let mut bob = connect_agent(&harness, "bob").await;
    let mut carol = connect_agent(&harness, "carol").await;
    let mut visitor = connect_visitor(&harness, "alice").await;
    let session_id = next_json(&mut visitor).await["payload"]
        .as_str()
        .unwrap()
        .to_string();

    send_json(&mut visitor, json!({"type": "message.req", "payload": "hi"})).await;
    next_json(&mut bob).await;

    send_json(
        &mut carol,
        json!({"type": "message.rsp", "session_id": session_id, "payload": "not mine"}),
    )
    .await;
    send_json(
        &mut bob,
        json!({"type": "message.rsp", "session_id": session_id, "payload": "from bob"}),
    )
    .await;

    // Only bob's reply arrives.
    assert_eq!(next_json(&mut visitor).await["payload"], "from bob");
    let log = harness
        .stores
        .messages
        .fetch_recent(&session_id, 10)
        .await
        .unwrap();
    assert!(log.iter().all(|m| m.content != "not mine"));
}

#[tokio::test]
async fn shutdown_closes_live_sockets() {
    let harness = harness().await;
    let mut visitor = connect_visitor(&harness, "alice").await;
    next_json(&mut visitor).await;

    harness.shutdown().await.unwrap();

    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match visitor.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok());
}
