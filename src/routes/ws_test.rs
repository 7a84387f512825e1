use crate::routes;
use crate::state::test_helpers;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::ServiceExt;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// HELPERS
// =============================================================================

async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind should succeed");
    let addr = listener.local_addr().expect("listener has an address");
    let app = routes::app(test_helpers::test_app_state());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server failed");
    });
    addr
}

async fn connect(addr: SocketAddr) -> Ws {
    let (ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("websocket connect should succeed");
    ws
}

async fn send(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send should succeed");
}

async fn recv(ws: &mut Ws) -> Value {
    loop {
        let msg = timeout(Duration::from_millis(1000), ws.next())
            .await
            .expect("receive timed out")
            .expect("stream ended unexpectedly")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).expect("frame should be JSON"),
            Message::Close(_) => panic!("connection closed unexpectedly"),
            _ => {}
        }
    }
}

async fn recv_kind(ws: &mut Ws, kind: &str) -> Value {
    loop {
        let value = recv(ws).await;
        if value["type"] == kind {
            return value;
        }
    }
}

async fn expect_closed(ws: &mut Ws) {
    loop {
        let next = timeout(Duration::from_millis(1000), ws.next())
            .await
            .expect("close timed out");
        match next {
            None | Some(Err(_) | Ok(Message::Close(_))) => return,
            Some(Ok(_)) => {}
        }
    }
}

async fn register(addr: SocketAddr, name: &str) -> Ws {
    let mut ws = connect(addr).await;
    send(&mut ws, json!({"type": "register", "content": name})).await;
    assert_eq!(recv(&mut ws).await, json!({"type": "register", "content": format!("Registered as {name}")}));
    ws
}

// =============================================================================
// END TO END
// =============================================================================

#[tokio::test]
async fn register_then_receive_rosters() {
    let addr = spawn_server().await;
    let mut alice = register(addr, "alice").await;

    assert_eq!(recv(&mut alice).await, json!({"type": "client_list", "clients": ["alice"]}));
    assert_eq!(recv(&mut alice).await, json!({"type": "group_list", "groups": []}));
}

#[tokio::test]
async fn duplicate_name_gets_error_then_close() {
    let addr = spawn_server().await;
    let _alice = register(addr, "alice").await;

    let mut imposter = connect(addr).await;
    send(&mut imposter, json!({"type": "register", "content": "alice"})).await;
    assert_eq!(recv(&mut imposter).await, json!({"type": "error", "error": "Name taken"}));
    expect_closed(&mut imposter).await;
}

#[tokio::test]
async fn unregistered_first_message_gets_error_then_close() {
    let addr = spawn_server().await;
    let mut ws = connect(addr).await;
    send(&mut ws, json!({"type": "join_group", "group_name": "rust"})).await;

    assert_eq!(recv(&mut ws).await, json!({"type": "error", "error": "Must register first"}));
    expect_closed(&mut ws).await;
}

#[tokio::test]
async fn private_message_reaches_recipient_and_echoes() {
    let addr = spawn_server().await;
    let mut alice = register(addr, "alice").await;
    let mut bob = register(addr, "bob").await;

    send(&mut alice, json!({"type": "private", "to": "bob", "from": "mallory", "content": "hi"})).await;

    let expected = json!({"type": "private", "from": "alice", "to": "bob", "content": "hi"});
    assert_eq!(recv_kind(&mut bob, "private").await, expected);
    assert_eq!(recv_kind(&mut alice, "private").await, expected);
}

#[tokio::test]
async fn group_flow_over_the_wire() {
    let addr = spawn_server().await;
    let mut alice = register(addr, "alice").await;
    let mut bob = register(addr, "bob").await;
    let mut carol = register(addr, "carol").await;

    send(&mut alice, json!({"type": "create_group", "group_name": "rust"})).await;
    loop {
        let list = recv_kind(&mut bob, "group_list").await;
        if list["groups"].as_array().is_some_and(|g| !g.is_empty()) {
            break;
        }
    }

    send(&mut bob, json!({"type": "join_group", "group_name": "rust"})).await;
    loop {
        let list = recv_kind(&mut bob, "group_list").await;
        if list["groups"][0]["members"] == json!(["alice", "bob"]) {
            assert_eq!(list["groups"][0]["creator"], "alice");
            break;
        }
    }

    send(&mut bob, json!({"type": "group_message", "group_name": "rust", "content": "hello"})).await;
    let expected = json!({"type": "group_message", "from": "bob", "group_name": "rust", "content": "hello"});
    assert_eq!(recv_kind(&mut alice, "group_message").await, expected);
    assert_eq!(recv_kind(&mut bob, "group_message").await, expected);

    // carol is outside the group: the next thing she sees is a marker sent
    // after the group message, never the group message itself.
    send(&mut alice, json!({"type": "private", "to": "carol", "content": "marker"})).await;
    loop {
        let value = recv(&mut carol).await;
        assert_ne!(value["type"], "group_message");
        if value["type"] == "private" {
            break;
        }
    }
}

#[tokio::test]
async fn disconnect_is_reflected_in_rosters() {
    let addr = spawn_server().await;
    let mut alice = register(addr, "alice").await;
    let bob = register(addr, "bob").await;

    drop(bob);

    loop {
        let list = recv_kind(&mut alice, "client_list").await;
        if list["clients"] == json!(["alice"]) {
            break;
        }
    }
}

#[tokio::test]
async fn healthz_responds_ok() {
    let app = routes::app(test_helpers::test_app_state());
    let request = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .expect("request should build");

    let response = app.oneshot(request).await.expect("router is infallible");
    assert_eq!(response.status(), StatusCode::OK);
}
