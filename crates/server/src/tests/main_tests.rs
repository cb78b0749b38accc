use super::*;
use axum::{body, body::Body, http::Request};
use shared::domain::{ProjectId, TaskId};
use store::MemoryStore;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tower::ServiceExt;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn test_settings() -> Settings {
    Settings {
        store_url: "memory:".into(),
        jwt_secret: "test-secret".into(),
        ..Settings::default()
    }
}

fn test_app() -> (Router, Arc<AppState>) {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let state = Arc::new(build_state(&test_settings(), store));
    (build_router(state.clone()), state)
}

async fn fake_connection(
    state: &AppState,
    identity: &str,
    project: &ProjectId,
) -> UnboundedReceiver<ServerEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    let connection_id = state.router.connect(UserId::new(identity), tx).await;
    state
        .router
        .handle_event(
            connection_id,
            ClientEvent::JoinProject {
                project_id: project.clone(),
            },
        )
        .await;
    rx
}

#[tokio::test]
async fn healthz_reports_ok_when_store_is_ready() {
    let (app, _state) = test_app();
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(bytes.as_ref(), b"ok");
}

#[tokio::test]
async fn handshake_without_token_is_rejected() {
    let (app, _state) = test_app();
    let request = Request::get("/ws").body(Body::empty()).expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn handshake_with_invalid_token_is_rejected() {
    let (app, _state) = test_app();
    let request = Request::get("/ws?token=not-a-jwt")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn handshake_with_valid_token_reaches_upgrade() {
    let (app, _state) = test_app();
    let token = auth::mint_token("test-secret", &UserId::new("alice"), 60).expect("mint");
    let request = Request::get(format!("/ws?token={token}"))
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    // Credential accepted; only the missing upgrade handshake stops it.
    assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
}

#[tokio::test]
async fn relay_fans_event_into_project_room() {
    let (app, state) = test_app();
    let p1 = ProjectId::new("p1");
    let mut rx = fake_connection(&state, "alice", &p1).await;

    let relay_body = serde_json::to_string(&RelayRequest {
        project_id: p1.clone(),
        event: ServerEvent::TaskUpdated {
            task_id: TaskId::new("t1"),
            project_id: p1,
            phase: "done".to_string(),
        },
    })
    .expect("json");
    let request = Request::post("/relay")
        .header("content-type", "application/json")
        .body(Body::from(relay_body))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(matches!(
        rx.try_recv().expect("relayed event"),
        ServerEvent::TaskUpdated { phase, .. } if phase == "done"
    ));
}

#[tokio::test]
async fn presence_endpoint_reflects_connections() {
    let (app, state) = test_app();
    let _rx = fake_connection(&state, "alice", &ProjectId::new("p1")).await;

    let request = Request::get("/presence/alice")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let status: PresenceStatus = serde_json::from_slice(&bytes).expect("json");
    assert!(status.online);

    let request = Request::get("/presence/nobody")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let status: PresenceStatus = serde_json::from_slice(&bytes).expect("json");
    assert!(!status.online);
}

async fn spawn_server() -> SocketAddr {
    let (app, _state) = test_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

async fn ws_client(addr: SocketAddr, identity: &str) -> WsStream {
    let token = auth::mint_token("test-secret", &UserId::new(identity), 60).expect("mint");
    let (socket, _) = connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .expect("ws connect");
    socket
}

async fn send_event(socket: &mut WsStream, event: &ClientEvent) {
    let text = serde_json::to_string(event).expect("json");
    socket.send(WsMessage::Text(text)).await.expect("ws send");
}

async fn next_event(socket: &mut WsStream) -> ServerEvent {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for server event")
            .expect("socket closed")
            .expect("socket error");
        if let WsMessage::Text(text) = message {
            return serde_json::from_str(&text).expect("server event json");
        }
    }
}

#[tokio::test]
async fn lock_flow_round_trips_over_real_sockets() {
    let addr = spawn_server().await;
    let p1 = ProjectId::new("p1");
    let t9 = TaskId::new("t9");

    // Each client takes a throwaway lock after joining and waits for the
    // grant, which proves its join was processed before anyone broadcasts.
    let mut alice = ws_client(addr, "alice").await;
    send_event(
        &mut alice,
        &ClientEvent::JoinProject {
            project_id: p1.clone(),
        },
    )
    .await;
    send_event(
        &mut alice,
        &ClientEvent::LockTask {
            task_id: TaskId::new("warmup-alice"),
            project_id: p1.clone(),
        },
    )
    .await;
    assert!(matches!(
        next_event(&mut alice).await,
        ServerEvent::LockAcquired { .. }
    ));

    let mut bob = ws_client(addr, "bob").await;
    send_event(
        &mut bob,
        &ClientEvent::JoinProject {
            project_id: p1.clone(),
        },
    )
    .await;
    send_event(
        &mut bob,
        &ClientEvent::LockTask {
            task_id: TaskId::new("warmup-bob"),
            project_id: p1.clone(),
        },
    )
    .await;
    assert!(matches!(
        next_event(&mut bob).await,
        ServerEvent::LockAcquired { .. }
    ));
    // Alice sees bob's warmup lock as a room notification.
    assert!(matches!(
        next_event(&mut alice).await,
        ServerEvent::TaskLocked { locked_by, .. } if locked_by.as_str() == "bob"
    ));

    send_event(
        &mut alice,
        &ClientEvent::LockTask {
            task_id: t9.clone(),
            project_id: p1.clone(),
        },
    )
    .await;
    assert!(matches!(
        next_event(&mut alice).await,
        ServerEvent::LockAcquired { task_id } if task_id == t9
    ));
    assert!(matches!(
        next_event(&mut bob).await,
        ServerEvent::TaskLocked { task_id, locked_by }
            if task_id == t9 && locked_by.as_str() == "alice"
    ));

    send_event(
        &mut bob,
        &ClientEvent::LockTask {
            task_id: t9.clone(),
            project_id: p1.clone(),
        },
    )
    .await;
    assert!(matches!(
        next_event(&mut bob).await,
        ServerEvent::LockDenied { task_id } if task_id == t9
    ));

    send_event(
        &mut alice,
        &ClientEvent::UnlockTask {
            task_id: t9.clone(),
            project_id: p1.clone(),
        },
    )
    .await;
    assert!(matches!(
        next_event(&mut bob).await,
        ServerEvent::TaskUnlocked { task_id } if task_id == t9
    ));
}

#[tokio::test]
async fn malformed_event_gets_error_reply_and_connection_survives() {
    let addr = spawn_server().await;
    let p1 = ProjectId::new("p1");

    let mut alice = ws_client(addr, "alice").await;
    send_event(
        &mut alice,
        &ClientEvent::JoinProject {
            project_id: p1.clone(),
        },
    )
    .await;

    alice
        .send(WsMessage::Text(r#"{"type":"lock_task"}"#.to_string()))
        .await
        .expect("ws send");
    assert!(matches!(
        next_event(&mut alice).await,
        ServerEvent::Error(_)
    ));

    // The connection still works after the bad payload.
    send_event(
        &mut alice,
        &ClientEvent::LockTask {
            task_id: TaskId::new("t1"),
            project_id: p1,
        },
    )
    .await;
    assert!(matches!(
        next_event(&mut alice).await,
        ServerEvent::LockAcquired { .. }
    ));
}
