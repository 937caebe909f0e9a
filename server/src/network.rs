//! HTTP and WebSocket transport in front of the session gateway

use crate::config::ServerConfig;
use crate::connection::{ConnectionId, Outbound};
use crate::error::ServerError;
use crate::gateway::{GatewayHandle, SessionGateway};
use crate::utils::generate_teacher_username;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde_json::{json, Value};
use shared::ClientEvent;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

/// Close code sent when the server ends a socket (kick or connection limit)
pub const CLOSE_BY_SERVER: u16 = 4000;

#[derive(Clone)]
pub struct AppState {
    pub gateway: GatewayHandle,
}

pub fn build_router(gateway: GatewayHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/teacher-login", post(teacher_login))
        .route("/polls/{username}", get(poll_history))
        .route("/ws", get(ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(AppState { gateway })
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn teacher_login() -> Json<Value> {
    let username = generate_teacher_username();
    info!("Issued teacher username {}", username);
    Json(json!({ "username": username }))
}

async fn poll_history(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let polls = state.gateway.poll_history(&username).await?;
    Ok(Json(json!({ "data": polls })))
}

async fn ws_upgrade(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run_connection(socket, state.gateway, addr))
}

/// Drives one socket until either side ends it, then reports the disconnect.
async fn run_connection(socket: WebSocket, gateway: GatewayHandle, addr: SocketAddr) {
    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();

    let id = match gateway.connect(Some(addr), tx) {
        Ok(id) => id,
        Err(e) => {
            warn!("Dropping socket from {}: {}", addr, e);
            return;
        }
    };

    let mut writer = tokio::spawn(write_frames(sink, rx));
    let mut reader = tokio::spawn(read_events(stream, gateway.clone(), id));

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    if let Err(e) = gateway.disconnect(id) {
        debug!("Could not report disconnect of {}: {}", id, e);
    }
}

async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Frame(frame) => {
                if sink.send(Message::Text(frame.as_str().into())).await.is_err() {
                    break;
                }
            }
            Outbound::Close => {
                let close = CloseFrame {
                    code: CLOSE_BY_SERVER,
                    reason: "Closed by server".into(),
                };
                let _ = sink.send(Message::Close(Some(close))).await;
                break;
            }
        }
    }
}

async fn read_events(mut stream: SplitStream<WebSocket>, gateway: GatewayHandle, id: ConnectionId) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match ClientEvent::decode(text.as_str()) {
                Ok(Some(event)) => {
                    if gateway.inbound(id, event).is_err() {
                        break;
                    }
                }
                Ok(None) => debug!("Unknown event from connection {}", id),
                Err(e) => debug!("Undecodable frame from connection {}: {}", id, e),
            },
            Ok(Message::Close(frame)) => {
                debug!("Connection {} closed by peer: {:?}", id, frame);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Receive error on connection {}: {}", id, e);
                break;
            }
        }
    }
}

/// Serves the router on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    gateway: GatewayHandle,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(gateway);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

/// Binds the configured address, starts the gateway and serves until `shutdown`.
pub async fn run<F>(config: &ServerConfig, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Server listening on {}", listener.local_addr()?);

    let (gateway, gateway_task) = SessionGateway::from_config(config).spawn();
    let result = serve(listener, gateway, shutdown).await;

    // Sockets still open hold handles; the loop ends once they are gone
    gateway_task.abort();
    info!("Server stopped");
    result
}
