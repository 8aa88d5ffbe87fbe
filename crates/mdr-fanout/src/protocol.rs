//! Fan-out wire protocol.
//!
//! Every frame is a JSON text message `{"event": "<name>", "data": <payload>}`.
//! Client requests carry the bare target string as `data`; server events
//! carry the canonical event wrapped in a named field.
//!
//! Room names are plain concatenations of a purpose prefix and a target
//! (`price-BTCUSDT`, `user-orders-42`); the server treats them as opaque.

use mdr_core::error::RelayError;
use mdr_core::{DepthEvent, KlineEvent, TickerEvent, TradeEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// Purpose of a room; the prefix of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKind {
    Trading,
    OrderBook,
    Trades,
    Price,
    UserOrders,
}

impl RoomKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Trading => "trading",
            Self::OrderBook => "orderbook",
            Self::Trades => "trades",
            Self::Price => "price",
            Self::UserOrders => "user-orders",
        }
    }

    /// `<prefix>-<target>`
    pub fn room(&self, target: &str) -> String {
        format!("{}-{target}", self.prefix())
    }
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Request sent by a browser connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientRequest {
    JoinTradingRoom(String),
    LeaveTradingRoom(String),
    SubscribeOrderbook(String),
    SubscribeTrades(String),
    SubscribePrice(String),
    SubscribeUserOrders(String),
    UnsubscribeOrderbook(String),
    UnsubscribeTrades(String),
    UnsubscribePrice(String),
    UnsubscribeUserOrders(String),
}

impl ClientRequest {
    pub fn from_json(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|e| RelayError::Protocol(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(|e| RelayError::Protocol(e.to_string()))
    }

    /// Whether the request adds membership (as opposed to removing it).
    pub fn is_join(&self) -> bool {
        matches!(
            self,
            Self::JoinTradingRoom(_)
                | Self::SubscribeOrderbook(_)
                | Self::SubscribeTrades(_)
                | Self::SubscribePrice(_)
                | Self::SubscribeUserOrders(_)
        )
    }

    pub fn kind(&self) -> RoomKind {
        match self {
            Self::JoinTradingRoom(_) | Self::LeaveTradingRoom(_) => RoomKind::Trading,
            Self::SubscribeOrderbook(_) | Self::UnsubscribeOrderbook(_) => RoomKind::OrderBook,
            Self::SubscribeTrades(_) | Self::UnsubscribeTrades(_) => RoomKind::Trades,
            Self::SubscribePrice(_) | Self::UnsubscribePrice(_) => RoomKind::Price,
            Self::SubscribeUserOrders(_) | Self::UnsubscribeUserOrders(_) => RoomKind::UserOrders,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Self::JoinTradingRoom(t)
            | Self::LeaveTradingRoom(t)
            | Self::SubscribeOrderbook(t)
            | Self::SubscribeTrades(t)
            | Self::SubscribePrice(t)
            | Self::SubscribeUserOrders(t)
            | Self::UnsubscribeOrderbook(t)
            | Self::UnsubscribeTrades(t)
            | Self::UnsubscribePrice(t)
            | Self::UnsubscribeUserOrders(t) => t,
        }
    }

    /// Room the request refers to.
    pub fn room(&self) -> String {
        self.kind().room(self.target())
    }

    /// The request undoing this one (join ↔ leave).
    pub fn inverse(&self) -> Self {
        let t = self.target().to_string();
        match self {
            Self::JoinTradingRoom(_) => Self::LeaveTradingRoom(t),
            Self::LeaveTradingRoom(_) => Self::JoinTradingRoom(t),
            Self::SubscribeOrderbook(_) => Self::UnsubscribeOrderbook(t),
            Self::UnsubscribeOrderbook(_) => Self::SubscribeOrderbook(t),
            Self::SubscribeTrades(_) => Self::UnsubscribeTrades(t),
            Self::UnsubscribeTrades(_) => Self::SubscribeTrades(t),
            Self::SubscribePrice(_) => Self::UnsubscribePrice(t),
            Self::UnsubscribePrice(_) => Self::SubscribePrice(t),
            Self::SubscribeUserOrders(_) => Self::UnsubscribeUserOrders(t),
            Self::UnsubscribeUserOrders(_) => Self::SubscribeUserOrders(t),
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Event pushed into a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    OrderbookUpdate {
        #[serde(rename = "orderBook")]
        order_book: DepthEvent,
    },
    TradesUpdate { trades: Vec<TradeEvent> },
    PriceUpdate { ticker: TickerEvent },
    NewTrade { trade: TradeEvent },
    UserOrderUpdate { order: Value },
    ChartDataUpdate { kline: KlineEvent },
    NewCandle { candle: KlineEvent },
}

impl ServerEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderbookUpdate { .. } => "orderbook-update",
            Self::TradesUpdate { .. } => "trades-update",
            Self::PriceUpdate { .. } => "price-update",
            Self::NewTrade { .. } => "new-trade",
            Self::UserOrderUpdate { .. } => "user-order-update",
            Self::ChartDataUpdate { .. } => "chart-data-update",
            Self::NewCandle { .. } => "new-candle",
        }
    }

    pub fn to_json(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(|e| RelayError::Protocol(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|e| RelayError::Protocol(e.to_string()))
    }
}

/// Untyped view of any frame, used by receivers that dispatch by name.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn from_json(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|e| RelayError::Protocol(e.to_string()))
    }
}
