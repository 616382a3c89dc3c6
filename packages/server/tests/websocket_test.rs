//! End-to-end tests against an in-process server on an ephemeral port.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use huddle_server::{
    config::Config,
    domain::{
        Conversation, ConversationId, ConversationKind, Participant, ParticipantRole, Timestamp,
        User, UserId,
    },
    infrastructure::{auth::JwtCredentialVerifier, repository::InMemoryStore},
    ui::{AppState, Server},
};
use huddle_shared::time::SystemClock;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};

const SECRET: &str = "e2e-secret";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn user(id: &str) -> UserId {
    UserId::new(id.to_string()).unwrap()
}

struct TestServer {
    addr: SocketAddr,
    tokens: JwtCredentialVerifier,
}

impl TestServer {
    /// Start a server where alice and bob share group `general`
    async fn start() -> Self {
        let store = InMemoryStore::new();
        for (id, name) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")] {
            store.insert_user(User::new(user(id), name)).await;
        }
        let general = ConversationId::new("general".to_string()).unwrap();
        store
            .insert_conversation(
                Conversation::new(
                    general.clone(),
                    ConversationKind::Group,
                    Some("General".to_string()),
                    Some(user("alice")),
                    Timestamp::new(0),
                ),
                vec![
                    Participant::new(
                        user("alice"),
                        general.clone(),
                        ParticipantRole::Admin,
                        Timestamp::new(0),
                    ),
                    Participant::new(
                        user("bob"),
                        general,
                        ParticipantRole::Member,
                        Timestamp::new(0),
                    ),
                ],
            )
            .await;

        let tokens = JwtCredentialVerifier::new(SECRET, Arc::new(store.clone()));
        let state = AppState::in_memory(&Config::with_secret(SECRET), store, Arc::new(SystemClock));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(Server::new(state).serve(listener));

        Self { addr, tokens }
    }

    fn token(&self, id: &str) -> String {
        self.tokens.issue_token(&user(id), 300).unwrap()
    }

    async fn connect(&self, id: &str) -> Socket {
        let url = format!("ws://{}/ws?token={}", self.addr, self.token(id));
        let (socket, _) = connect_async(url).await.unwrap();
        socket
    }

    fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn send(socket: &mut Socket, event: &str, data: Value) {
    let frame = json!({ "event": event, "data": data }).to_string();
    socket.send(Message::text(frame)).await.unwrap();
}

/// Read frames until an event named `name` arrives; returns the names seen on the way too
async fn wait_for(socket: &mut Socket, name: &str) -> (Value, Vec<Value>) {
    let mut skipped = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for '{}'", name))
            .unwrap()
            .unwrap();
        let Message::Text(text) = frame else {
            continue;
        };
        let value: Value = serde_json::from_str(text.as_str()).unwrap();
        if value["event"] == name {
            return (value["data"].clone(), skipped);
        }
        skipped.push(value);
    }
}

#[tokio::test]
async fn test_upgrade_without_valid_token_is_rejected() {
    // テスト項目: トークンが無い・不正な接続は 401 で拒否される
    // given (前提条件):
    let server = TestServer::start().await;

    // when (操作):
    let missing = connect_async(format!("ws://{}/ws", server.addr)).await;
    let forged = connect_async(format!("ws://{}/ws?token=not-a-jwt", server.addr)).await;

    // then (期待する結果):
    for result in [missing, forged] {
        match result {
            Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 401),
            other => panic!("expected 401, got {:?}", other.map(|_| ())),
        }
    }
}

#[tokio::test]
async fn test_chat_round_trip_over_websocket() {
    // テスト項目: 入力中・送信・既読・切断が WebSocket 越しに相手へ届く
    // given (前提条件):
    let server = TestServer::start().await;
    let mut alice = server.connect("alice").await;
    wait_for(&mut alice, "userStatus").await;
    let mut bob = server.connect("bob").await;
    wait_for(&mut bob, "userStatus").await;

    send(&mut alice, "joinChat", json!("general")).await;
    let (history, _) = wait_for(&mut alice, "chatHistory").await;
    assert_eq!(history["messages"], json!([]));

    // when (操作): alice が入力中になり、メッセージを送る
    send(
        &mut alice,
        "typing",
        json!({ "conversationId": "general", "isTyping": true }),
    )
    .await;
    let (typing, _) = wait_for(&mut bob, "userTyping").await;
    send(
        &mut alice,
        "sendMessage",
        json!({ "conversationId": "general", "content": "hello" }),
    )
    .await;
    let (message, before) = wait_for(&mut bob, "newMessage").await;

    // then (期待する結果):
    assert_eq!(typing["userId"], "alice");
    assert_eq!(typing["isTyping"], true);
    assert!(before.iter().any(|e| e["event"] == "userTyping" && e["data"]["isTyping"] == false));
    assert_eq!(message["success"], true);
    assert_eq!(message["message"]["content"], "hello");
    assert_eq!(message["message"]["sender"]["name"], "Alice");

    // when (操作): bob が既読にする
    let message_id = message["message"]["id"].as_str().unwrap().to_string();
    send(
        &mut bob,
        "markMessagesRead",
        json!({ "conversationId": "general", "messageIds": [message_id] }),
    )
    .await;
    let (read, _) = wait_for(&mut alice, "messagesRead").await;

    // then (期待する結果):
    assert_eq!(read["userId"], "bob");
    assert_eq!(read["messageIds"], json!([message_id]));

    // when (操作): alice が切断する
    alice.close(None).await.unwrap();
    let (status, _) = loop {
        let (status, skipped) = wait_for(&mut bob, "userStatus").await;
        if status["isOnline"] == false {
            break (status, skipped);
        }
    };

    // then (期待する結果):
    assert_eq!(status["userId"], "alice");
}

#[tokio::test]
async fn test_malformed_frame_gets_scoped_error() {
    // テスト項目: 不正なフレームには送信元にだけエラーイベントが返る
    // given (前提条件):
    let server = TestServer::start().await;
    let mut alice = server.connect("alice").await;
    wait_for(&mut alice, "userStatus").await;

    // when (操作):
    alice
        .send(Message::text("{\"event\":\"sendMessage\"}"))
        .await
        .unwrap();
    send(&mut alice, "joinChat", json!("no such room")).await;
    send(
        &mut alice,
        "sendMessage",
        json!({ "conversationId": "general", "content": "   " }),
    )
    .await;

    // then (期待する結果):
    let (parse_error, _) = wait_for(&mut alice, "error").await;
    assert_eq!(parse_error["error"], "Invalid event");
    let (join_error, _) = wait_for(&mut alice, "error").await;
    assert_eq!(join_error["error"], "Failed to join chat");
    let (failed_send, _) = wait_for(&mut alice, "newMessage").await;
    assert_eq!(failed_send["success"], false);
    assert!(failed_send.get("message").is_none());
}

#[tokio::test]
async fn test_conversation_management_over_http() {
    // テスト項目: HTTP API で会話を作成し、参加者の追加・一覧・削除ができる
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let token = server.token("alice");

    // when (操作):
    let created = client
        .post(server.http("/api/conversations"))
        .bearer_auth(&token)
        .json(&json!({ "type": "GROUP", "name": "Project", "participantIds": ["bob"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let created: Value = created.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let added: Value = client
        .post(server.http(&format!("/api/conversations/{}/participants", id)))
        .bearer_auth(&token)
        .json(&json!({ "userIds": ["carol"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let removed = client
        .delete(server.http(&format!("/api/conversations/{}/participants/bob", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let listed: Value = client
        .get(server.http(&format!("/api/conversations/{}/participants", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let anonymous = client
        .post(server.http("/api/conversations"))
        .json(&json!({ "type": "GROUP", "participantIds": [] }))
        .send()
        .await
        .unwrap();
    let anonymous_list = client
        .get(server.http(&format!("/api/conversations/{}/participants", id)))
        .send()
        .await
        .unwrap();
    let removed_list = client
        .get(server.http(&format!("/api/conversations/{}/participants", id)))
        .bearer_auth(server.token("bob"))
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(created["type"], "GROUP");
    assert_eq!(created["participantIds"], json!(["alice", "bob"]));
    assert_eq!(added.as_array().unwrap().len(), 3);
    assert_eq!(removed.status(), 200);
    let remaining: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["userId"].as_str().unwrap())
        .collect();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.contains(&"alice"));
    assert!(remaining.contains(&"carol"));
    assert_eq!(anonymous.status(), 401);
    assert_eq!(anonymous_list.status(), 401);
    assert_eq!(removed_list.status(), 403);
}

#[tokio::test]
async fn test_debug_room_reflects_presence() {
    // テスト項目: デバッグ用エンドポイントで参加者だけがルームのオンライン状態を確認できる
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let mut alice = server.connect("alice").await;
    wait_for(&mut alice, "chatStateSync").await;

    // when (操作):
    let room: Value = client
        .get(server.http("/debug/rooms/general"))
        .bearer_auth(server.token("bob"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let anonymous = client
        .get(server.http("/debug/rooms/general"))
        .send()
        .await
        .unwrap();
    let stranger = client
        .get(server.http("/debug/rooms/general"))
        .bearer_auth(server.token("carol"))
        .send()
        .await
        .unwrap();
    let health: Value = reqwest::get(server.http("/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(room["onlineUsers"], json!(["alice"]));
    assert_eq!(anonymous.status(), 401);
    assert_eq!(stranger.status(), 403);
    assert_eq!(health["status"], "ok");
}

#[tokio::test]
async fn test_chat_reads_and_http_send() {
    // テスト項目: HTTP で送ったメッセージがルームに配信され、会話・履歴・個別メッセージを読める
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let bob_token = server.token("bob");
    let mut alice = server.connect("alice").await;
    wait_for(&mut alice, "chatStateSync").await;

    // when (操作): bob が HTTP でメッセージを送る
    let posted = client
        .post(server.http("/api/conversations/general/messages"))
        .bearer_auth(&bob_token)
        .json(&json!({ "content": "from http" }))
        .send()
        .await
        .unwrap();

    // then (期待する結果): alice には WebSocket で届く
    assert_eq!(posted.status(), 201);
    let posted: Value = posted.json().await.unwrap();
    let message_id = posted["id"].as_str().unwrap().to_string();
    assert_eq!(posted["sender"]["name"], "Bob");
    let (pushed, _) = wait_for(&mut alice, "newMessage").await;
    assert_eq!(pushed["message"]["id"], message_id.as_str());

    // when (操作): 会話・履歴・メッセージを読む
    let groups: Value = client
        .get(server.http("/api/conversations?type=GROUP"))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let directs: Value = client
        .get(server.http("/api/conversations?type=DIRECT"))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let conversation: Value = client
        .get(server.http("/api/conversations/general"))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let history: Value = client
        .get(server.http("/api/conversations/general/messages?limit=10"))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let single: Value = client
        .get(server.http(&format!("/api/messages/{}", message_id)))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let stranger = client
        .get(server.http(&format!("/api/messages/{}", message_id)))
        .bearer_auth(server.token("carol"))
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(groups.as_array().unwrap().len(), 1);
    assert_eq!(groups[0]["id"], "general");
    assert_eq!(directs, json!([]));
    assert_eq!(conversation["lastMessage"]["messageId"], message_id.as_str());
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["content"], "from http");
    assert_eq!(single["conversationId"], "general");
    assert_eq!(stranger.status(), 403);
}
