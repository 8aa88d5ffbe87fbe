//! Room membership hub.
//!
//! A single task owns the membership map and processes [`HubCommand`]s in
//! arrival order, so a disconnect drops every membership in one step and
//! publishes into one room reach members in the order they were issued.
//! [`HubHandle`] is the cloneable front end; its send side never blocks, so
//! it can be called from synchronous feed callbacks.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::protocol::{RoomKind, ServerEvent};

/// Identifier of one browser connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Serialized frame shared by every recipient of one publish.
pub type Frame = Arc<str>;

/// Membership counts reported by `/health`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub rooms: usize,
}

pub enum HubCommand {
    Attach { conn: ConnectionId, tx: mpsc::Sender<Frame> },
    Detach { conn: ConnectionId },
    Join { conn: ConnectionId, room: String },
    Leave { conn: ConnectionId, room: String },
    Publish { room: String, event: ServerEvent },
    Members { room: String, reply: oneshot::Sender<usize> },
    Stats { reply: oneshot::Sender<HubStats> },
}

#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    fn send(&self, cmd: HubCommand) -> bool {
        self.tx.send(cmd).is_ok()
    }

    pub fn attach(&self, conn: ConnectionId, tx: mpsc::Sender<Frame>) -> bool {
        self.send(HubCommand::Attach { conn, tx })
    }

    pub fn detach(&self, conn: ConnectionId) -> bool {
        self.send(HubCommand::Detach { conn })
    }

    pub fn join(&self, conn: ConnectionId, room: impl Into<String>) -> bool {
        self.send(HubCommand::Join { conn, room: room.into() })
    }

    pub fn leave(&self, conn: ConnectionId, room: impl Into<String>) -> bool {
        self.send(HubCommand::Leave { conn, room: room.into() })
    }

    /// Push `event` to every connection currently in `room`.
    ///
    /// Returns false only if the hub task has stopped.
    pub fn publish_to_room(&self, room: impl Into<String>, event: ServerEvent) -> bool {
        self.send(HubCommand::Publish { room: room.into(), event })
    }

    /// `user-order-update` into `user-orders-<user_id>`.
    pub fn publish_user_order(&self, user_id: &str, order: Value) -> bool {
        self.publish_to_room(
            RoomKind::UserOrders.room(user_id),
            ServerEvent::UserOrderUpdate { order },
        )
    }

    /// Number of connections in `room` (0 if the hub stopped).
    pub async fn members(&self, room: impl Into<String>) -> usize {
        let (reply, rx) = oneshot::channel();
        if !self.send(HubCommand::Members { room: room.into(), reply }) {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub async fn stats(&self) -> HubStats {
        let (reply, rx) = oneshot::channel();
        if !self.send(HubCommand::Stats { reply }) {
            return HubStats::default();
        }
        rx.await.unwrap_or_default()
    }
}

struct Member {
    tx: mpsc::Sender<Frame>,
    rooms: AHashSet<String>,
}

#[derive(Default)]
struct Hub {
    members: AHashMap<ConnectionId, Member>,
    rooms: AHashMap<String, AHashSet<ConnectionId>>,
}

impl Hub {
    fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Attach { conn, tx } => {
                self.members.insert(conn, Member { tx, rooms: AHashSet::new() });
                debug!("[hub] {conn} attached ({} connections)", self.members.len());
            }
            HubCommand::Detach { conn } => self.detach(conn),
            HubCommand::Join { conn, room } => self.join(conn, room),
            HubCommand::Leave { conn, room } => self.leave(conn, &room),
            HubCommand::Publish { room, event } => self.publish(&room, &event),
            HubCommand::Members { room, reply } => {
                let _ = reply.send(self.rooms.get(&room).map_or(0, |m| m.len()));
            }
            HubCommand::Stats { reply } => {
                let _ = reply.send(HubStats {
                    connections: self.members.len(),
                    rooms: self.rooms.len(),
                });
            }
        }
    }

    fn join(&mut self, conn: ConnectionId, room: String) {
        let Some(member) = self.members.get_mut(&conn) else {
            warn!("[hub] join from unknown connection {conn}");
            return;
        };
        if member.rooms.insert(room.clone()) {
            debug!("[hub] {conn} joined {room}");
            self.rooms.entry(room).or_default().insert(conn);
        }
    }

    fn leave(&mut self, conn: ConnectionId, room: &str) {
        if let Some(member) = self.members.get_mut(&conn) {
            member.rooms.remove(room);
        }
        self.remove_from_room(conn, room);
        debug!("[hub] {conn} left {room}");
    }

    fn detach(&mut self, conn: ConnectionId) {
        let Some(member) = self.members.remove(&conn) else {
            return;
        };
        for room in &member.rooms {
            self.remove_from_room(conn, room);
        }
        debug!(
            "[hub] {conn} detached from {} rooms ({} connections)",
            member.rooms.len(),
            self.members.len()
        );
    }

    fn remove_from_room(&mut self, conn: ConnectionId, room: &str) {
        if let Some(set) = self.rooms.get_mut(room) {
            set.remove(&conn);
            if set.is_empty() {
                self.rooms.remove(room);
            }
        }
    }

    fn publish(&mut self, room: &str, event: &ServerEvent) {
        let Some(conns) = self.rooms.get(room) else {
            trace!("[hub] {} into idle room {room}", event.name());
            return;
        };
        let frame: Frame = match event.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                warn!("[hub] failed to encode {}: {e}", event.name());
                return;
            }
        };
        for conn in conns {
            let Some(member) = self.members.get(conn) else { continue };
            if let Err(mpsc::error::TrySendError::Full(_)) = member.tx.try_send(frame.clone()) {
                warn!("[hub] {conn} outbound buffer full, dropping {}", event.name());
            }
        }
    }
}

/// Start the hub task. It runs until every [`HubHandle`] is dropped.
pub fn spawn_hub() -> (HubHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        let mut hub = Hub::default();
        while let Some(cmd) = rx.recv().await {
            hub.handle(cmd);
        }
        info!("[hub] stopped");
    });
    (HubHandle { tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdr_core::TickerEvent;

    fn price(symbol: &str) -> ServerEvent {
        ServerEvent::PriceUpdate { ticker: TickerEvent { symbol: symbol.into(), ..Default::default() } }
    }

    fn attach(hub: &HubHandle) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let conn = ConnectionId::new();
        let (tx, rx) = mpsc::channel(16);
        assert!(hub.attach(conn, tx));
        (conn, rx)
    }

    #[tokio::test]
    async fn publish_reaches_only_room_members() {
        let (hub, _task) = spawn_hub();
        let (a, mut rx_a) = attach(&hub);
        let (b, mut rx_b) = attach(&hub);
        hub.join(a, "price-BTCUSDT");
        hub.join(b, "price-ETHUSDT");

        hub.publish_to_room("price-BTCUSDT", price("BTCUSDT"));
        assert_eq!(hub.stats().await, HubStats { connections: 2, rooms: 2 });

        let frame = rx_a.try_recv().unwrap();
        assert!(frame.contains("\"price-update\""));
        assert!(frame.contains("BTCUSDT"));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn double_join_delivers_once() {
        let (hub, _task) = spawn_hub();
        let (a, mut rx) = attach(&hub);
        hub.join(a, "trading-BTCUSDT");
        hub.join(a, "trading-BTCUSDT");
        hub.publish_to_room("trading-BTCUSDT", price("BTCUSDT"));
        assert_eq!(hub.members("trading-BTCUSDT").await, 1);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn detach_drops_every_membership() {
        let (hub, _task) = spawn_hub();
        let (a, _rx) = attach(&hub);
        for room in ["a", "b", "c"] {
            hub.join(a, room);
        }
        assert_eq!(hub.stats().await.rooms, 3);

        hub.detach(a);
        assert_eq!(hub.stats().await, HubStats::default());
        for room in ["a", "b", "c"] {
            assert_eq!(hub.members(room).await, 0);
        }
    }

    #[tokio::test]
    async fn leave_unknown_room_is_harmless() {
        let (hub, _task) = spawn_hub();
        let (a, mut rx) = attach(&hub);
        hub.leave(a, "price-BTCUSDT");
        hub.join(a, "price-BTCUSDT");
        hub.leave(a, "price-BTCUSDT");
        hub.publish_to_room("price-BTCUSDT", price("BTCUSDT"));
        assert_eq!(hub.stats().await.rooms, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn per_room_order_follows_publish_order() {
        let (hub, _task) = spawn_hub();
        let (a, mut rx) = attach(&hub);
        hub.join(a, "price-BTCUSDT");
        for i in 0..5 {
            let ev = ServerEvent::PriceUpdate {
                ticker: TickerEvent { symbol: "BTCUSDT".into(), last_price: i as f64, ..Default::default() },
            };
            hub.publish_to_room("price-BTCUSDT", ev);
        }
        hub.stats().await;

        for i in 0..5 {
            let frame = rx.try_recv().unwrap();
            match ServerEvent::from_json(&frame).unwrap() {
                ServerEvent::PriceUpdate { ticker } => assert_eq!(ticker.last_price, i as f64),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn user_order_goes_to_user_room() {
        let (hub, _task) = spawn_hub();
        let (a, mut rx) = attach(&hub);
        hub.join(a, "user-orders-7");
        hub.publish_user_order("7", serde_json::json!({"id": 1}));
        hub.publish_user_order("8", serde_json::json!({"id": 2}));
        hub.stats().await;

        let frame = rx.try_recv().unwrap();
        assert!(frame.contains("user-order-update"));
        assert!(rx.try_recv().is_err());
    }
}
