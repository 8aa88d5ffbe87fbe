//! Routes normalized feed events into fan-out rooms.
//!
//! | event  | room                 | wire event                          |
//! |--------|----------------------|-------------------------------------|
//! | ticker | `price-<SYM>`        | `price-update`                      |
//! | ticker | `trading-<SYM>`      | `price-update`                      |
//! | trade  | `trades-<SYM>`       | `new-trade`                         |
//! | trade  | `trading-<SYM>`      | `trades-update`                     |
//! | depth  | `orderbook-<SYM>`    | `orderbook-update`                  |
//! | kline  | `trading-<SYM>`      | `chart-data-update`, `new-candle` when closed |

use std::sync::Arc;

use mdr_core::{DepthEvent, KlineEvent, TickerEvent, TradeEvent};
use mdr_fanout::{HubHandle, RoomKind, ServerEvent};
use mdr_feed::{StreamCallbacks, TickerCallback};

#[derive(Clone)]
pub struct Bridge {
    hub: HubHandle,
}

impl Bridge {
    pub fn new(hub: HubHandle) -> Self {
        Self { hub }
    }

    /// Callback for the multiplexed ticker subscription.
    pub fn ticker_callback(&self) -> TickerCallback {
        let bridge = self.clone();
        Arc::new(move |t: &TickerEvent| bridge.on_ticker(t))
    }

    /// Callbacks for a full-symbol bundle. Tickers are left to
    /// [`ticker_callback`](Self::ticker_callback), whose subscription can fall
    /// back to polling.
    pub fn callbacks(&self) -> StreamCallbacks {
        let (b1, b2, b3) = (self.clone(), self.clone(), self.clone());
        StreamCallbacks {
            on_ticker: None,
            on_trade: Some(Arc::new(move |t: &TradeEvent| b1.on_trade(t))),
            on_depth: Some(Arc::new(move |d: &DepthEvent| b2.on_depth(d))),
            on_kline: Some(Arc::new(move |k: &KlineEvent| b3.on_kline(k))),
        }
    }

    pub fn on_ticker(&self, ticker: &TickerEvent) {
        let event = ServerEvent::PriceUpdate { ticker: ticker.clone() };
        self.hub.publish_to_room(RoomKind::Price.room(&ticker.symbol), event.clone());
        self.hub.publish_to_room(RoomKind::Trading.room(&ticker.symbol), event);
    }

    pub fn on_trade(&self, trade: &TradeEvent) {
        self.hub.publish_to_room(
            RoomKind::Trades.room(&trade.symbol),
            ServerEvent::NewTrade { trade: trade.clone() },
        );
        self.hub.publish_to_room(
            RoomKind::Trading.room(&trade.symbol),
            ServerEvent::TradesUpdate { trades: vec![trade.clone()] },
        );
    }

    pub fn on_depth(&self, depth: &DepthEvent) {
        self.hub.publish_to_room(
            RoomKind::OrderBook.room(&depth.symbol),
            ServerEvent::OrderbookUpdate { order_book: depth.clone() },
        );
    }

    pub fn on_kline(&self, kline: &KlineEvent) {
        let room = RoomKind::Trading.room(&kline.symbol);
        self.hub.publish_to_room(room.clone(), ServerEvent::ChartDataUpdate { kline: kline.clone() });
        if kline.is_closed {
            self.hub.publish_to_room(room, ServerEvent::NewCandle { candle: kline.clone() });
        }
    }
}
