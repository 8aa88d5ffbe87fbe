//! Axum front end of the fan-out hub.
//!
//! - `GET /ws`     browser connections (room join/leave requests in, room events out)
//! - `GET /health` connection and room counts
//!
//! Browser access is limited to the configured frontend origin: CORS for the
//! HTTP routes, an `Origin` check for the WebSocket upgrade.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use mdr_core::config::FanoutConfig;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::hub::{ConnectionId, Frame, HubHandle};
use crate::protocol::ClientRequest;

#[derive(Clone)]
pub struct FanoutState {
    pub hub: HubHandle,
    /// Outbound frames buffered per connection before drops start.
    pub channel_capacity: usize,
    pub frontend_origin: Arc<str>,
}

impl FanoutState {
    pub fn new(hub: HubHandle, cfg: &FanoutConfig) -> Self {
        Self {
            hub,
            channel_capacity: cfg.client_channel_capacity.max(1),
            frontend_origin: cfg.frontend_origin.as_str().into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
    rooms: usize,
}

pub fn create_router(state: FanoutState) -> Result<Router> {
    let origin = HeaderValue::from_str(&state.frontend_origin)?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET])
        .allow_credentials(true);

    Ok(Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

/// Bind on all interfaces.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("[hub] listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: FanoutState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state)?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;
    info!("[hub] server stopped");
    Ok(())
}

async fn health_handler(State(state): State<FanoutState>) -> Json<HealthResponse> {
    let stats = state.hub.stats().await;
    Json(HealthResponse {
        status: "ok",
        connections: stats.connections,
        rooms: stats.rooms,
    })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<FanoutState>,
) -> Response {
    if let Some(origin) = headers.get(header::ORIGIN) {
        if origin.as_bytes() != state.frontend_origin.as_bytes() {
            warn!("[hub] rejected connection from origin {origin:?}");
            return StatusCode::FORBIDDEN.into_response();
        }
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: FanoutState) {
    let conn = ConnectionId::new();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Frame>(state.channel_capacity);

    if !state.hub.attach(conn, tx) {
        warn!("[hub] hub stopped, refusing {conn}");
        return;
    }
    info!("[hub] {conn} connected");

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_request(&state.hub, conn, text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("[hub] {conn} receive error: {e}");
                break;
            }
        }
    }

    state.hub.detach(conn);
    send_task.abort();
    info!("[hub] {conn} disconnected");
}

fn handle_request(hub: &HubHandle, conn: ConnectionId, text: &str) {
    let req = match ClientRequest::from_json(text) {
        Ok(req) => req,
        Err(e) => {
            warn!("[hub] {conn} sent invalid request: {e}");
            return;
        }
    };
    let room = req.room();
    if req.is_join() {
        hub.join(conn, room);
    } else {
        hub.leave(conn, room);
    }
}
