//! Canonical market events: the records every downstream consumer sees.
//!
//! The upstream feed's field names never leak past the normalizer; these
//! structs are what the connector callbacks receive and what the fan-out
//! server serializes onto the wire (camelCase field names).
//!
//! Events are immutable values. A newer ticker for a symbol replaces the
//! previous one; a kline with `is_closed == false` is provisional and is
//! replaced by the next kline carrying the same `open_time`.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// 24-hour rolling ticker summary for one symbol.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerEvent {
    pub symbol: String,
    pub last_price: f64,
    pub price_change: f64,
    pub price_change_percent: f64,
    pub volume: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    /// `price_change_percent >= 0`.
    pub is_positive: bool,
    pub formatted_price: String,
    pub formatted_volume: String,
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// A single public trade print.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    /// Trade time, epoch milliseconds.
    pub time: u64,
    pub is_buyer_maker: bool,
    pub trade_id: u64,
}

// ---------------------------------------------------------------------------
// Depth
// ---------------------------------------------------------------------------

/// One price level of an order book side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Order book snapshot. Each side is ordered best price first, exactly as the
/// upstream delivered it; consumers replace their whole book with it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthEvent {
    pub symbol: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub last_update_id: u64,
}

impl DepthEvent {
    /// Best bid, if the bid side is non-empty.
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    /// Best ask, if the ask side is non-empty.
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }
}

// ---------------------------------------------------------------------------
// Kline
// ---------------------------------------------------------------------------

/// OHLCV candle for one interval bucket.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KlineEvent {
    pub symbol: String,
    pub open_time: u64,
    pub close_time: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trades: u64,
    pub is_closed: bool,
    pub interval: String,
}

// ---------------------------------------------------------------------------
// MarketEvent: tagged union for callback and channel passing
// ---------------------------------------------------------------------------

/// A tagged union of all canonical event types.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Ticker(TickerEvent),
    Trade(TradeEvent),
    Depth(DepthEvent),
    Kline(KlineEvent),
}

impl MarketEvent {
    /// Symbol the event belongs to.
    pub fn symbol(&self) -> &str {
        match self {
            Self::Ticker(t) => &t.symbol,
            Self::Trade(t) => &t.symbol,
            Self::Depth(d) => &d.symbol,
            Self::Kline(k) => &k.symbol,
        }
    }
}

// ---------------------------------------------------------------------------
// Display impls
// ---------------------------------------------------------------------------

impl std::fmt::Display for TickerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ticker({} last={} chg={:.2}% vol={})",
            self.symbol, self.formatted_price, self.price_change_percent, self.formatted_volume
        )
    }
}

impl std::fmt::Display for TradeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = if self.is_buyer_maker { "SELL" } else { "BUY" };
        write!(
            f,
            "Trade({} {side} {:.8}x{:.4} id={})",
            self.symbol, self.price, self.quantity, self.trade_id
        )
    }
}

impl std::fmt::Display for DepthEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bid = self.best_bid().map(|l| l.price).unwrap_or(0.0);
        let ask = self.best_ask().map(|l| l.price).unwrap_or(0.0);
        write!(
            f,
            "Depth({} bid[0]={bid:.8} ask[0]={ask:.8} levels={}/{} uid={})",
            self.symbol,
            self.bids.len(),
            self.asks.len(),
            self.last_update_id
        )
    }
}

impl std::fmt::Display for KlineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.is_closed { "closed" } else { "open" };
        write!(
            f,
            "Kline({} {} o={} h={} l={} c={} {state})",
            self.symbol, self.interval, self.open, self.high, self.low, self.close
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_serializes_camel_case() {
        let ticker = TickerEvent {
            symbol: "BTCUSDT".into(),
            last_price: 1.0,
            price_change_percent: -0.5,
            ..Default::default()
        };
        let v = serde_json::to_value(&ticker).unwrap();
        assert_eq!(v["lastPrice"], 1.0);
        assert_eq!(v["priceChangePercent"], -0.5);
        assert_eq!(v["high24h"], 0.0);
        assert!(v.get("last_price").is_none());
    }

    #[test]
    fn depth_best_levels() {
        let depth = DepthEvent {
            symbol: "ETHUSDT".into(),
            bids: vec![PriceLevel { price: 10.0, quantity: 1.0 }],
            asks: vec![],
            last_update_id: 7,
        };
        assert_eq!(depth.best_bid().map(|l| l.price), Some(10.0));
        assert!(depth.best_ask().is_none());
    }

    #[test]
    fn market_event_symbol() {
        let ev = MarketEvent::Trade(TradeEvent { symbol: "SOLUSDT".into(), ..Default::default() });
        assert_eq!(ev.symbol(), "SOLUSDT");
    }
}
