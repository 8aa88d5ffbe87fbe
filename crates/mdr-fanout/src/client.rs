//! Room client: one connection to the fan-out server.
//!
//! Subscribe calls made before the connection opens are queued and replayed
//! in FIFO order once, on the first successful open. Rooms joined on a live
//! connection are remembered and re-joined after an automatic reconnect.
//! Unexpected disconnects are retried with a linear backoff; when the policy
//! runs out the client stays disconnected until `connect` is called again.
//!
//! Inbound events and the local `connection-status` / `connection-error`
//! notifications go to listeners registered with [`RoomClient::on`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mdr_core::ws::{Backoff, ReconnectPolicy, WsConnConfig, connect_ws};
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::bus::{EventBus, Handler, ListenerToken};
use crate::protocol::{ClientRequest, Envelope};

/// Local event fired on every connect and disconnect.
pub const CONNECTION_STATUS: &str = "connection-status";
/// Local event fired when an attempt to connect fails.
pub const CONNECTION_ERROR: &str = "connection-error";

const LABEL: &str = "room-client";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}

struct Inner {
    /// Bumped on every `connect`/`disconnect`; a task only touches state
    /// while its generation is current.
    generation: u64,
    pending: VecDeque<ClientRequest>,
    /// Join requests sent on a live connection, in order.
    joined: Vec<ClientRequest>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    shutdown: Option<watch::Sender<bool>>,
}

struct Shared {
    url: String,
    policy: ReconnectPolicy,
    bus: EventBus,
    state: watch::Sender<ClientState>,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone)]
pub struct RoomClient {
    shared: Arc<Shared>,
}

impl RoomClient {
    /// Client with the default policy: 5 reconnects, delay `1s * attempt`.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_policy(url, ReconnectPolicy::linear(5, Duration::from_secs(1)))
    }

    pub fn with_policy(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ClientState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                policy,
                bus: EventBus::new(),
                state,
                inner: Mutex::new(Inner {
                    generation: 0,
                    pending: VecDeque::new(),
                    joined: Vec::new(),
                    outbound: None,
                    shutdown: None,
                }),
            }),
        }
    }

    pub fn state(&self) -> ClientState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ClientState::Connected
    }

    /// Wait until the client reaches `target`. Returns false on timeout.
    pub async fn wait_for(&self, target: ClientState, timeout: Duration) -> bool {
        let mut rx = self.shared.state.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|s| *s == target)).await.is_ok_and(|r| r.is_ok())
    }

    /// Start connecting. No-op while connecting or connected.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn connect(&self) {
        let mut inner = self.shared.lock();
        if inner.shutdown.is_some() {
            debug!("[{LABEL}] connect ignored, already {:?}", self.state());
            return;
        }
        inner.generation += 1;
        let generation = inner.generation;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        inner.shutdown = Some(shutdown_tx);
        self.shared.state.send_replace(ClientState::Connecting);
        drop(inner);

        tokio::spawn(run_client(self.shared.clone(), generation, shutdown_rx));
    }

    /// Close the connection and stop reconnecting. Queued requests and
    /// remembered rooms are discarded.
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        inner.generation += 1;
        inner.outbound = None;
        inner.pending.clear();
        inner.joined.clear();
        let was_running = match inner.shutdown.take() {
            Some(tx) => {
                let _ = tx.send(true);
                true
            }
            None => false,
        };
        self.shared.state.send_replace(ClientState::Disconnected);
        drop(inner);

        if was_running {
            info!("[{LABEL}] disconnected by caller");
            self.shared.bus.emit(
                CONNECTION_STATUS,
                &json!({"connected": false, "reason": "client disconnect"}),
            );
        }
    }

    pub fn join_trading_room(&self, pair: &str) {
        self.subscribe(ClientRequest::JoinTradingRoom(pair.to_string()));
    }

    pub fn subscribe_to_order_book(&self, pair: &str) {
        self.subscribe(ClientRequest::SubscribeOrderbook(pair.to_string()));
    }

    pub fn subscribe_to_trades(&self, pair: &str) {
        self.subscribe(ClientRequest::SubscribeTrades(pair.to_string()));
    }

    pub fn subscribe_to_price(&self, symbol: &str) {
        self.subscribe(ClientRequest::SubscribePrice(symbol.to_string()));
    }

    pub fn subscribe_to_user_orders(&self, user_id: &str) {
        self.subscribe(ClientRequest::SubscribeUserOrders(user_id.to_string()));
    }

    pub fn leave_trading_room(&self, pair: &str) {
        self.unsubscribe(ClientRequest::LeaveTradingRoom(pair.to_string()));
    }

    pub fn unsubscribe_from_order_book(&self, pair: &str) {
        self.unsubscribe(ClientRequest::UnsubscribeOrderbook(pair.to_string()));
    }

    pub fn unsubscribe_from_trades(&self, pair: &str) {
        self.unsubscribe(ClientRequest::UnsubscribeTrades(pair.to_string()));
    }

    pub fn unsubscribe_from_price(&self, symbol: &str) {
        self.unsubscribe(ClientRequest::UnsubscribePrice(symbol.to_string()));
    }

    pub fn unsubscribe_from_user_orders(&self, user_id: &str) {
        self.unsubscribe(ClientRequest::UnsubscribeUserOrders(user_id.to_string()));
    }

    /// Send now if connected, else queue for the next open.
    fn subscribe(&self, req: ClientRequest) {
        let mut inner = self.shared.lock();
        let sent = match (&inner.outbound, self.state()) {
            (Some(out), ClientState::Connected) => send_request(out, &req),
            _ => false,
        };
        if sent {
            remember_join(&mut inner.joined, req);
        } else {
            debug!("[{LABEL}] queued {}", req.room());
            inner.pending.push_back(req);
        }
    }

    /// Send a leave while connected; otherwise only forget the room locally.
    fn unsubscribe(&self, req: ClientRequest) {
        let mut inner = self.shared.lock();
        let join = req.inverse();
        inner.joined.retain(|r| *r != join);
        match (&inner.outbound, self.state()) {
            (Some(out), ClientState::Connected) => {
                send_request(out, &req);
            }
            _ => trace!("[{LABEL}] {} skipped, not connected", req.room()),
        }
    }

    pub fn on(&self, event: &str, handler: Handler) -> ListenerToken {
        self.shared.bus.on(event, handler)
    }

    pub fn off(&self, token: &ListenerToken) -> bool {
        self.shared.bus.off(token)
    }

    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Rooms currently remembered for re-join.
    pub fn joined_rooms(&self) -> Vec<String> {
        self.shared.lock().joined.iter().map(ClientRequest::room).collect()
    }
}

fn send_request(out: &mpsc::UnboundedSender<String>, req: &ClientRequest) -> bool {
    match req.to_json() {
        Ok(json) => out.send(json).is_ok(),
        Err(e) => {
            warn!("[{LABEL}] failed to encode {}: {e}", req.room());
            false
        }
    }
}

fn remember_join(joined: &mut Vec<ClientRequest>, req: ClientRequest) {
    if !joined.contains(&req) {
        joined.push(req);
    }
}

enum SessionEnd {
    Shutdown,
    Dropped(String),
}

async fn run_client(shared: Arc<Shared>, generation: u64, mut shutdown_rx: watch::Receiver<bool>) {
    let config = WsConnConfig::new(shared.url.clone(), LABEL);
    let mut attempts: u32 = 0;

    loop {
        let connected = tokio::select! {
            res = connect_ws(&config) => res,
            _ = shutdown_rx.changed() => return,
        };

        match connected {
            Ok(ws) => {
                attempts = 0;
                match run_session(&shared, generation, ws, &mut shutdown_rx).await {
                    SessionEnd::Shutdown => return,
                    SessionEnd::Dropped(reason) => {
                        warn!("[{LABEL}] connection lost: {reason}");
                        shared
                            .bus
                            .emit(CONNECTION_STATUS, &json!({"connected": false, "reason": reason}));
                    }
                }
            }
            Err(e) => {
                warn!("[{LABEL}] connect failed: {e}");
                shared.bus.emit(CONNECTION_ERROR, &json!({"message": e.to_string()}));
            }
        }

        match shared.policy.next(attempts) {
            Backoff::Retry(delay) => {
                attempts += 1;
                if !set_state(&shared, generation, ClientState::Connecting) {
                    return;
                }
                info!("[{LABEL}] reconnect {attempts}/{} in {delay:?}", shared.policy.max_attempts);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => return,
                }
            }
            Backoff::Exhausted => {
                warn!("[{LABEL}] giving up after {attempts} reconnect attempts");
                let mut inner = shared.lock();
                if inner.generation == generation {
                    inner.shutdown = None;
                    inner.outbound = None;
                    shared.state.send_replace(ClientState::Disconnected);
                }
                drop(inner);
                shared.bus.emit(
                    CONNECTION_STATUS,
                    &json!({"connected": false, "reason": "reconnect attempts exhausted"}),
                );
                return;
            }
        }
    }
}

fn set_state(shared: &Shared, generation: u64, state: ClientState) -> bool {
    let inner = shared.lock();
    if inner.generation != generation {
        return false;
    }
    shared.state.send_replace(state);
    true
}

async fn run_session(
    shared: &Arc<Shared>,
    generation: u64,
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    // Re-join remembered rooms, then flush the queue, all before anyone else
    // can see the connection as open.
    {
        let mut inner = shared.lock();
        if inner.generation != generation {
            return SessionEnd::Shutdown;
        }
        let rejoin: Vec<ClientRequest> = inner.joined.clone();
        for req in &rejoin {
            send_request(&out_tx, req);
        }
        while let Some(req) = inner.pending.pop_front() {
            if rejoin.contains(&req) {
                continue;
            }
            if send_request(&out_tx, &req) {
                remember_join(&mut inner.joined, req);
            }
        }
        inner.outbound = Some(out_tx);
        shared.state.send_replace(ClientState::Connected);
    }
    info!("[{LABEL}] connected to {}", shared.url);
    shared.bus.emit(CONNECTION_STATUS, &json!({"connected": true}));

    let end = loop {
        tokio::select! {
            out = out_rx.recv() => {
                let Some(text) = out else {
                    break SessionEnd::Shutdown;
                };
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    break SessionEnd::Dropped(e.to_string());
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => dispatch(shared, text.as_str()),
                Some(Ok(Message::Ping(data))) => {
                    let _ = ws_tx.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => break SessionEnd::Dropped("server closed".into()),
                Some(Err(e)) => break SessionEnd::Dropped(e.to_string()),
                Some(Ok(_)) => {}
            },
            _ = shutdown_rx.changed() => {
                let _ = ws_tx.close().await;
                break SessionEnd::Shutdown;
            }
        }
    };

    if let SessionEnd::Dropped(_) = end {
        let mut inner = shared.lock();
        if inner.generation == generation {
            inner.outbound = None;
            shared.state.send_replace(ClientState::Disconnected);
        } else {
            return SessionEnd::Shutdown;
        }
    }
    end
}

fn dispatch(shared: &Shared, text: &str) {
    match Envelope::from_json(text) {
        Ok(env) => {
            shared.bus.emit(&env.event, &env.data);
        }
        Err(e) => debug!("[{LABEL}] ignoring frame: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriptions_queue_while_disconnected() {
        let client = RoomClient::new("ws://127.0.0.1:1");
        client.subscribe_to_order_book("BTCUSDT");
        client.subscribe_to_trades("ETHUSDT");
        client.unsubscribe_from_price("BTCUSDT");

        assert_eq!(client.state(), ClientState::Disconnected);
        assert_eq!(client.pending_len(), 2);
        assert!(client.joined_rooms().is_empty());
    }

    #[tokio::test]
    async fn disconnect_clears_queue_and_is_idempotent() {
        let client = RoomClient::new("ws://127.0.0.1:1");
        client.subscribe_to_price("BTCUSDT");
        client.disconnect();
        client.disconnect();
        assert_eq!(client.pending_len(), 0);
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn gives_up_after_policy_and_reports_offline() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RoomClient::with_policy(
            format!("ws://{addr}"),
            ReconnectPolicy::linear(2, Duration::from_millis(5)),
        );
        let errors = Arc::new(Mutex::new(0usize));
        let statuses = Arc::new(Mutex::new(Vec::<Value>::new()));
        let e = errors.clone();
        client.on(CONNECTION_ERROR, Arc::new(move |_: &Value| -> anyhow::Result<()> {
            *e.lock().unwrap() += 1;
            Ok(())
        }));
        let s = statuses.clone();
        client.on(CONNECTION_STATUS, Arc::new(move |v: &Value| -> anyhow::Result<()> {
            s.lock().unwrap().push(v.clone());
            Ok(())
        }));

        client.connect();
        client.connect();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while statuses.lock().unwrap().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(*errors.lock().unwrap(), 3);
        let statuses = statuses.lock().unwrap().clone();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0]["connected"], false);
        assert_eq!(statuses[0]["reason"], "reconnect attempts exhausted");
        assert_eq!(client.state(), ClientState::Disconnected);
    }
}
