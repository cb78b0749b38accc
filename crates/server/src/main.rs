use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use collab::EventRouter;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::{
    domain::UserId,
    error::{ApiError, ErrorCode},
    protocol::{ClientEvent, PresenceStatus, RelayRequest, ServerEvent},
};
use store::KeyValueStore;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

mod auth;
mod config;

use auth::{AuthError, IdentityVerifier};
use config::{load_settings, Settings};

#[derive(Clone)]
struct AppState {
    router: Arc<EventRouter>,
    verifier: IdentityVerifier,
    store: Arc<dyn KeyValueStore>,
    frontend_origin: String,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let store = store::connect(&settings.store_url).await?;
    let state = build_state(&settings, store);
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_state(settings: &Settings, store: Arc<dyn KeyValueStore>) -> AppState {
    let router = EventRouter::new(
        store.clone(),
        Duration::from_secs(settings.presence_ttl_seconds),
        Duration::from_secs(settings.lock_ttl_seconds),
    );
    AppState {
        router: Arc::new(router),
        verifier: IdentityVerifier::new(settings.jwt_secret.clone()),
        store,
        frontend_origin: settings.frontend_origin.clone(),
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.frontend_origin);
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .route("/relay", post(relay))
        .route("/presence/:identity", get(presence_status))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(frontend_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods([Method::GET, Method::POST]);
    match frontend_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            warn!(%frontend_origin, "invalid frontend origin, cors headers disabled");
            cors
        }
    }
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state
        .store
        .ping()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok("ok")
}

/// Handshake: the credential is checked before the upgrade, so a rejected
/// caller never gets a socket or any registry/presence footprint.
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<WsQuery>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let Some(token) = q.token else {
        warn!(error = %AuthError::MissingCredential, "handshake rejected");
        return unauthorized();
    };
    let identity = match state.verifier.verify(&token) {
        Ok(identity) => identity,
        Err(err) => {
            warn!(error = %err, "handshake rejected");
            return unauthorized();
        }
    };
    let Some(ws) = ws else {
        return StatusCode::UPGRADE_REQUIRED.into_response();
    };
    ws.on_upgrade(move |socket| ws_connection(state, socket, identity))
        .into_response()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiError::new(ErrorCode::Unauthorized, "credential rejected")),
    )
        .into_response()
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket, identity: UserId) {
    let (mut sender, mut receiver) = socket.split();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let connection_id = state.router.connect(identity, events_tx).await;

    let send_task = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => state.router.handle_event(connection_id, event).await,
                Err(err) => {
                    // One bad payload never tears the connection down.
                    warn!(connection = %connection_id, error = %err, "dropping malformed client event");
                    state.router.broadcaster().send_to(
                        connection_id,
                        ServerEvent::Error(ApiError::new(
                            ErrorCode::Validation,
                            "malformed event payload",
                        )),
                    );
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.router.disconnect(connection_id).await;
    send_task.abort();
}

/// Collaborator entry point: the CRUD layer posts an already-persisted
/// change here and it fans out to the project room.
async fn relay(State(state): State<Arc<AppState>>, Json(req): Json<RelayRequest>) -> StatusCode {
    state
        .router
        .broadcaster()
        .broadcast(&req.project_id, &req.event, None);
    StatusCode::NO_CONTENT
}

async fn presence_status(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Result<Json<PresenceStatus>, (StatusCode, Json<ApiError>)> {
    let identity = UserId::new(identity);
    let online = state
        .router
        .presence()
        .lookup(&identity)
        .await
        .map_err(|err| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiError::new(ErrorCode::StoreUnavailable, err.to_string())),
            )
        })?
        .is_some();
    Ok(Json(PresenceStatus { identity, online }))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
