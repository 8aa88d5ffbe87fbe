//! Test servers for fan-out integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mdr_core::config::FanoutConfig;
use mdr_fanout::server::{self, FanoutState};
use mdr_fanout::{HubHandle, spawn_hub};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;

pub const FRONTEND_ORIGIN: &str = "http://localhost:3000";

/// Real fan-out server on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: HubHandle,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let (hub, _task) = spawn_hub();
        let cfg = FanoutConfig { frontend_origin: FRONTEND_ORIGIN.into(), ..Default::default() };
        let state = FanoutState::new(hub.clone(), &cfg);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = server::serve(listener, state, async move {
                let _ = rx.await;
            })
            .await;
        });
        Self { addr, hub, shutdown: Some(tx) }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// WebSocket server that records every text frame, per connection. When
/// `drop_first_after` is set, the first connection is closed once it has
/// received that many frames.
pub struct RecordingServer {
    pub addr: SocketAddr,
    pub sessions: Arc<Mutex<Vec<Vec<String>>>>,
}

impl RecordingServer {
    pub async fn start(drop_first_after: Option<usize>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let sessions = Arc::new(Mutex::new(Vec::new()));
        let sessions_clone = sessions.clone();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let sessions = sessions_clone.clone();
                tokio::spawn(async move {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else { return };
                    let index = {
                        let mut all = sessions.lock().unwrap();
                        all.push(Vec::new());
                        all.len() - 1
                    };
                    let limit = if index == 0 { drop_first_after } else { None };
                    let (mut write, mut read) = ws.split();
                    while let Some(Ok(msg)) = read.next().await {
                        if let Message::Text(text) = msg {
                            let count = {
                                let mut all = sessions.lock().unwrap();
                                all[index].push(text.to_string());
                                all[index].len()
                            };
                            if limit == Some(count) {
                                let _ = write.send(Message::Close(None)).await;
                                return;
                            }
                        }
                    }
                });
            }
        });

        Self { addr, sessions }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn session(&self, index: usize) -> Vec<String> {
        self.sessions.lock().unwrap().get(index).cloned().unwrap_or_default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
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

/// Async variant of [`wait_until`] for hub queries.
pub async fn wait_for_members(hub: &HubHandle, room: &str, expected: usize) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if hub.members(room).await == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
