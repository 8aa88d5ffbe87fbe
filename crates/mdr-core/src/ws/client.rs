//! Single upstream WebSocket link with bounded auto-reconnect.
//!
//! [`run_link`] drives one logical connection:
//! 1. Connects to the endpoint (plain or TLS).
//! 2. Sends the optional subscription message.
//! 3. Forwards text frames to a callback, answers pings.
//! 4. On close/error consults the [`ReconnectPolicy`]; retries after the
//!    computed delay or returns [`LinkExit::Exhausted`].
//!
//! Every transition is published on a `watch` channel as a [`LinkStatus`], so
//! the owner can inspect the state machine without reaching into the task.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::reconnect::{Backoff, ReconnectPolicy};
use crate::error::RelayError;
use crate::time_util;
use crate::types::{LinkState, LinkStatus};

/// Callback invoked for each received text frame.
pub type OnTextCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Configuration for one upstream link.
#[derive(Debug, Clone)]
pub struct WsConnConfig {
    /// Full WebSocket URL (e.g. `wss://stream.binance.com:9443/ws/btcusdt@ticker`).
    pub url: String,
    /// Message to send immediately after connection (subscription request).
    pub subscribe_msg: Option<String>,
    /// Extra HTTP headers for the handshake.
    pub extra_headers: HashMap<String, String>,
    /// Log label (usually the subscription id).
    pub label: String,
}

impl WsConnConfig {
    pub fn new(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subscribe_msg: None,
            extra_headers: HashMap::new(),
            label: label.into(),
        }
    }
}

/// Why [`run_link`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkExit {
    /// The shutdown signal fired.
    Shutdown,
    /// The policy ran out of attempts.
    Exhausted,
}

/// How a single connected session ended.
enum SessionEnd {
    Shutdown,
    Dropped,
}

/// Connect, read, and reconnect until shutdown or until retries run out.
///
/// `status` receives `Connecting`/`Open`/`Reconnecting` transitions and the
/// attempt counter; the caller owns the terminal transition after return.
pub async fn run_link(
    config: &WsConnConfig,
    policy: ReconnectPolicy,
    on_text: OnTextCallback,
    status: &watch::Sender<LinkStatus>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> LinkExit {
    let label = &config.label;

    loop {
        if *shutdown_rx.borrow() {
            info!("[{label}] shutdown requested");
            return LinkExit::Shutdown;
        }

        debug!("[{label}] connecting to {}", config.url);

        let connected = tokio::select! {
            res = connect_ws(config) => res,
            _ = shutdown_rx.changed() => {
                info!("[{label}] shutdown during connect");
                return LinkExit::Shutdown;
            }
        };

        let session_end = match connected {
            Ok(ws_stream) => {
                status.send_modify(|s| {
                    s.state = LinkState::Open;
                    s.attempts = 0;
                });
                info!("[{label}] connected to {}", extract_host(&config.url));
                run_session(config, ws_stream, &on_text, status, shutdown_rx).await
            }
            Err(e) => {
                warn!("[{label}] connection failed: {e}");
                SessionEnd::Dropped
            }
        };

        if let SessionEnd::Shutdown = session_end {
            return LinkExit::Shutdown;
        }

        let attempts = status.borrow().attempts;
        match policy.next(attempts) {
            Backoff::Retry(delay) => {
                status.send_modify(|s| {
                    s.state = LinkState::Reconnecting;
                    s.attempts = attempts + 1;
                });
                warn!(
                    "[{label}] disconnected, reconnect {}/{} in {delay:?}",
                    attempts + 1,
                    policy.max_attempts
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {},
                    _ = shutdown_rx.changed() => return LinkExit::Shutdown,
                }
            }
            Backoff::Exhausted => {
                error!("[{label}] reconnect attempts exhausted ({attempts})");
                return LinkExit::Exhausted;
            }
        }
    }
}

/// Read loop for one connected socket.
async fn run_session(
    config: &WsConnConfig,
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    on_text: &OnTextCallback,
    status: &watch::Sender<LinkStatus>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let label = &config.label;
    let (mut ws_write, mut ws_read) = ws_stream.split();

    if let Some(ref sub_msg) = config.subscribe_msg {
        debug!("[{label}] subscribing: {sub_msg}");
        if let Err(e) = ws_write.send(Message::Text(sub_msg.clone().into())).await {
            error!("[{label}] subscribe send failed: {e}");
            return SessionEnd::Dropped;
        }
    }

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                info!("[{label}] shutdown signal received");
                let _ = ws_write.close().await;
                return SessionEnd::Shutdown;
            }

            msg = ws_read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        status.send_modify(|s| s.last_event_ms = time_util::now_ms());
                        on_text(&text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        warn!("[{label}] received close frame");
                        return SessionEnd::Dropped;
                    }
                    Some(Err(e)) => {
                        error!("[{label}] read error: {e}");
                        return SessionEnd::Dropped;
                    }
                    None => {
                        warn!("[{label}] stream ended");
                        return SessionEnd::Dropped;
                    }
                    _ => {} // Binary, Pong, Frame - ignore
                }
            }
        }
    }
}

/// Establish a WebSocket connection (TLS when the scheme is `wss`).
pub async fn connect_ws(
    config: &WsConnConfig,
) -> Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    RelayError,
> {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};

    let ws_err = |e: &dyn std::fmt::Display| RelayError::WebSocket(format!("{}: {e}", config.url));

    let mut request = config.url.as_str().into_client_request().map_err(|e| ws_err(&e))?;
    for (key, value) in &config.extra_headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| ws_err(&e))?;
        let value = HeaderValue::from_str(value).map_err(|e| ws_err(&e))?;
        request.headers_mut().insert(name, value);
    }

    let (stream, _response) =
        tokio_tungstenite::connect_async(request).await.map_err(|e| ws_err(&e))?;
    Ok(stream)
}

/// Extract the host from a URL string.
pub fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("").to_string())
        .unwrap_or_default()
}
