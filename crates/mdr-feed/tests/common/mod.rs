//! Mock upstream servers for connector integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;

/// WebSocket server that pushes a fixed list of frames to every client and
/// records the request path of each handshake.
pub struct MockFeedServer {
    pub addr: SocketAddr,
    pub paths: Arc<Mutex<Vec<String>>>,
    shutdown: Arc<Notify>,
}

impl MockFeedServer {
    pub async fn start(frames: Vec<String>) -> Self {
        Self::start_with(frames, false).await
    }

    /// Like [`start`](Self::start), closing each connection once the frames
    /// are sent when `close_after` is set.
    pub async fn start_with(frames: Vec<String>, close_after: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let paths = Arc::new(Mutex::new(Vec::new()));

        let shutdown_clone = shutdown.clone();
        let paths_clone = paths.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { break };
                        let frames = frames.clone();
                        let paths = paths_clone.clone();
                        let shutdown = shutdown_clone.clone();
                        tokio::spawn(async move {
                            Self::handle_connection(stream, frames, close_after, paths, shutdown).await;
                        });
                    }
                    _ = shutdown_clone.notified() => break,
                }
            }
        });

        Self { addr, paths, shutdown }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        frames: Vec<String>,
        close_after: bool,
        paths: Arc<Mutex<Vec<String>>>,
        shutdown: Arc<Notify>,
    ) {
        use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

        let record = |req: &Request, resp: Response| {
            let path = req.uri().path_and_query().map(|p| p.to_string()).unwrap_or_default();
            paths.lock().unwrap().push(path);
            Ok(resp)
        };
        let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, record).await else {
            return;
        };
        let (mut write, mut read) = ws.split();

        for frame in frames {
            if write.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }
        if close_after {
            let _ = write.send(Message::Close(None)).await;
            return;
        }

        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                },
                _ = shutdown.notified() => break,
            }
        }
    }

    pub fn ws_base(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

impl Drop for MockFeedServer {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
    }
}

/// TCP listener that accepts and immediately drops every connection, so each
/// WebSocket handshake fails. Counts accepted connections.
pub struct RefusingServer {
    pub addr: SocketAddr,
    pub accepts: Arc<AtomicUsize>,
}

impl RefusingServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));
        let counter = accepts.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });
        Self { addr, accepts }
    }

    pub fn ws_base(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn accepted(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }
}

/// REST mock serving `/api/v3/ticker/24hr`. `BADUSDT` answers 500.
pub struct MockRest {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

impl MockRest {
    pub async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/api/v3/ticker/24hr", get(ticker_24hr))
            .with_state(hits.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { addr, hits }
    }

    pub fn rest_base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn ticker_24hr(
    State(hits): State<Arc<AtomicUsize>>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    hits.fetch_add(1, Ordering::SeqCst);
    let symbol = params.get("symbol").cloned().unwrap_or_default();
    if symbol == "BADUSDT" {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(serde_json::json!({
        "symbol": symbol,
        "lastPrice": "65000.50",
        "priceChange": "120.00",
        "priceChangePercent": "0.18",
        "volume": "1234.5",
        "highPrice": "66000.00",
        "lowPrice": "64000.00"
    }))
    .into_response()
}

/// Combined-stream ticker frame as the exchange sends it.
pub fn ticker_frame(symbol: &str, price: &str) -> String {
    serde_json::json!({
        "stream": format!("{}@ticker", symbol.to_lowercase()),
        "data": {"e": "24hrTicker", "s": symbol, "c": price, "p": "1.0", "P": "0.5", "v": "10", "h": price, "l": price}
    })
    .to_string()
}

/// Poll `cond` until true or the timeout passes.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
