// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end socket tests against an in-process WebSocket server.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parley::socket::{ChatSocket, ConnectionSnapshot, DisconnectCause, SocketListener, SocketSettings};
use parley::WebSocketTransportFactory;
use parley_core::{ChatEvent, ConnectedEvent, JsonCodec, TypingEvent, User};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// What the server saw on one connection.
#[derive(Debug)]
enum Seen {
    Query(String),
    Text(String),
    Closed,
}

/// Instructions for the server's current connection.
enum Push {
    Text(String),
    Drop,
}

struct TestServer {
    endpoint: String,
    seen: mpsc::UnboundedReceiver<Seen>,
    push: mpsc::UnboundedSender<Push>,
}

impl TestServer {
    /// Accepts connections one at a time and acks each with `conn-N`.
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}/connect", listener.local_addr().unwrap());
        let (seen_tx, seen) = mpsc::unbounded_channel();
        let (push, mut push_rx) = mpsc::unbounded_channel::<Push>();

        tokio::spawn(async move {
            let mut connection = 0;
            while let Ok((stream, _)) = listener.accept().await {
                connection += 1;
                let query_tx = seen_tx.clone();
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    let query = req.uri().query().unwrap_or_default().to_string();
                    let _ = query_tx.send(Seen::Query(query));
                    Ok(resp)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    continue;
                };
                let ack = serde_json::json!({
                    "type": "connection.ok",
                    "connection_id": format!("conn-{}", connection),
                    "me": { "id": "alice" },
                    "created_at": Utc::now().to_rfc3339(),
                });
                if ws.send(Message::Text(ack.to_string().into())).await.is_err() {
                    continue;
                }

                loop {
                    tokio::select! {
                        incoming = ws.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                if text.contains("health.check") {
                                    let pong = serde_json::json!({
                                        "type": "health.check",
                                        "connection_id": format!("conn-{}", connection),
                                        "created_at": Utc::now().to_rfc3339(),
                                    });
                                    let _ = ws.send(Message::Text(pong.to_string().into())).await;
                                }
                                let _ = seen_tx.send(Seen::Text(text.to_string()));
                            }
                            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                                let _ = seen_tx.send(Seen::Closed);
                                break;
                            }
                            Some(Ok(_)) => {}
                        },
                        push = push_rx.recv() => match push {
                            Some(Push::Text(text)) => {
                                let _ = ws.send(Message::Text(text.into())).await;
                            }
                            Some(Push::Drop) | None => break,
                        },
                    }
                }
            }
        });

        TestServer {
            endpoint,
            seen,
            push,
        }
    }

    async fn next_seen(&mut self) -> Seen {
        tokio::time::timeout(WAIT, self.seen.recv())
            .await
            .expect("server saw nothing")
            .expect("server stopped")
    }

    /// Next text frame that is not a heartbeat.
    async fn next_text(&mut self) -> String {
        loop {
            if let Seen::Text(text) = self.next_seen().await {
                if !text.contains("health.check") {
                    return text;
                }
            }
        }
    }
}

struct EventCollector(mpsc::UnboundedSender<ChatEvent>);

impl SocketListener for EventCollector {
    fn on_event(&self, event: &ChatEvent) {
        let _ = self.0.send(event.clone());
    }

    fn on_connected(&self, ack: &ConnectedEvent) {
        let _ = self.0.send(ChatEvent::Connected(ack.clone()));
    }
}

fn socket_for(server: &TestServer, health_check_interval: Duration) -> ChatSocket {
    let settings = SocketSettings {
        endpoint: server.endpoint.clone(),
        api_key: "key-1".to_string(),
        retry_limit: 3,
        base_delay: Duration::from_millis(10),
        health_check_interval,
        connect_timeout: WAIT,
    };
    ChatSocket::new(
        settings,
        Arc::new(WebSocketTransportFactory),
        Arc::new(JsonCodec),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connects_exchanges_frames_and_closes() {
    let mut server = TestServer::start().await;
    let socket = socket_for(&server, Duration::from_secs(60));
    let (tx, mut events) = mpsc::unbounded_channel();
    socket.add_listener(Arc::new(EventCollector(tx)));

    socket.connect(User::new("alice"), Some("jwt-token".to_string()), false);

    let ack = socket.await_connected(WAIT).await.unwrap();
    assert_eq!(ack.connection_id, "conn-1");
    assert_eq!(socket.connection_id().unwrap(), "conn-1");
    match server.next_seen().await {
        Seen::Query(query) => {
            assert!(query.contains("api_key=key-1"));
            assert!(query.contains("authorization=jwt-token"));
            assert!(query.contains("stream-auth-type=jwt"));
        }
        other => panic!("expected handshake, got {:?}", other),
    }

    let typing = ChatEvent::TypingStart(TypingEvent {
        cid: "messaging:general".to_string(),
        user: User::new("alice"),
        created_at: Utc::now(),
        raw_created_at: None,
    });
    assert!(socket.send(&typing));
    assert!(server.next_text().await.contains("typing.start"));

    server
        .push
        .send(Push::Text(
            serde_json::json!({
                "type": "typing.stop",
                "cid": "messaging:general",
                "user": { "id": "bob" },
                "created_at": Utc::now().to_rfc3339(),
            })
            .to_string(),
        ))
        .unwrap();
    let received = tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Some(ChatEvent::TypingStop(e)) => return e,
                Some(_) => continue,
                None => panic!("listener closed"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(received.user.id, "bob");

    socket.disconnect(DisconnectCause::ConnectionReleased);
    let snapshot = socket
        .wait_for(WAIT, "disconnect", |s| s.is_disconnected())
        .await
        .unwrap();
    assert_eq!(
        snapshot.disconnect_cause(),
        Some(&DisconnectCause::ConnectionReleased)
    );
    loop {
        if let Seen::Closed = server.next_seen().await {
            break;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_drop_is_recovered_by_health_monitor() {
    let mut server = TestServer::start().await;
    let socket = socket_for(&server, Duration::from_millis(200));

    socket.connect(User::new("alice"), None, true);
    socket.await_connected(WAIT).await.unwrap();
    match server.next_seen().await {
        Seen::Query(query) => assert!(query.contains("stream-auth-type=anonymous")),
        other => panic!("expected handshake, got {:?}", other),
    }

    server.push.send(Push::Drop).unwrap();
    socket
        .wait_for(WAIT, "drop", |s| !s.is_connected())
        .await
        .unwrap();

    let snapshot = socket
        .wait_for(WAIT, "reconnect", |s| {
            matches!(s, ConnectionSnapshot::Connected { ack, .. } if ack.connection_id == "conn-2")
        })
        .await
        .unwrap();
    assert!(snapshot.is_connected());

    socket.terminate();
    socket
        .wait_for(WAIT, "destroyed", |s| matches!(s, ConnectionSnapshot::Destroyed))
        .await
        .unwrap();
}
