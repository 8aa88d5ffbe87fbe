//! Binance JSON message normalizer.
//!
//! Converts upstream payloads into the canonical events of
//! [`mdr_core::events`]. Two layers:
//!
//! - [`parse_frame`] recognizes a frame (combined `{stream, data}` envelope or
//!   bare payload) and routes it by stream tag / event type. It fails only when
//!   the text is not JSON or carries no market event (e.g. subscription acks).
//! - `normalize_*` are total over JSON objects: missing or malformed numeric
//!   fields become `0`.

use mdr_core::error::RelayError;
use mdr_core::*;
use serde_json::Value;

use crate::format::{format_price, format_volume};
use crate::json_util::{bool_field, f64_field, lenient_u64, parse_levels, str_field, u64_field};

/// Kind of payload a stream carries, derived from its name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTag {
    Ticker,
    Trade,
    Depth,
    Kline,
}

impl StreamTag {
    /// Classify a stream name such as `btcusdt@kline_1m`.
    pub fn from_stream_name(stream: &str) -> Option<Self> {
        let (_, suffix) = stream.split_once('@')?;
        if suffix == "ticker" {
            Some(Self::Ticker)
        } else if suffix == "trade" {
            Some(Self::Trade)
        } else if suffix.starts_with("depth") {
            Some(Self::Depth)
        } else if suffix.starts_with("kline_") {
            Some(Self::Kline)
        } else {
            None
        }
    }

    /// Classify a bare payload by its `e` field.
    fn from_event_type(e: &str) -> Option<Self> {
        match e {
            "24hrTicker" => Some(Self::Ticker),
            "trade" => Some(Self::Trade),
            "depthUpdate" => Some(Self::Depth),
            "kline" => Some(Self::Kline),
            _ => None,
        }
    }
}

/// Uppercase symbol embedded in a stream name (`btcusdt@ticker` → `BTCUSDT`).
pub fn symbol_from_stream_name(stream: &str) -> String {
    upper_symbol(stream.split('@').next().unwrap_or(""))
}

/// Recognize and normalize one upstream text frame.
pub fn parse_frame(text: &str) -> Result<MarketEvent, RelayError> {
    let v: Value =
        serde_json::from_str(text).map_err(|e| RelayError::Parse(format!("invalid json: {e}")))?;

    // Combined stream envelope: {"stream": "btcusdt@ticker", "data": {...}}
    if let (Some(stream), Some(data)) = (v.get("stream").and_then(|s| s.as_str()), v.get("data")) {
        let tag = StreamTag::from_stream_name(stream)
            .ok_or_else(|| RelayError::Parse(format!("unknown stream {stream}")))?;
        return Ok(normalize_tagged(tag, data, &symbol_from_stream_name(stream)));
    }

    // Bare payload, routed by event type.
    let tag = v
        .get("e")
        .and_then(|e| e.as_str())
        .and_then(StreamTag::from_event_type)
        .ok_or_else(|| RelayError::Parse("no market event in frame".into()))?;
    Ok(normalize_tagged(tag, &v, ""))
}

fn normalize_tagged(tag: StreamTag, data: &Value, fallback_symbol: &str) -> MarketEvent {
    match tag {
        StreamTag::Ticker => MarketEvent::Ticker(with_symbol(normalize_ticker(data), fallback_symbol)),
        StreamTag::Trade => MarketEvent::Trade(normalize_trade(data)),
        StreamTag::Depth => MarketEvent::Depth(normalize_depth(data, fallback_symbol)),
        StreamTag::Kline => MarketEvent::Kline(normalize_kline(data)),
    }
}

fn with_symbol(mut ticker: TickerEvent, fallback_symbol: &str) -> TickerEvent {
    if ticker.symbol.is_empty() {
        ticker.symbol = fallback_symbol.to_string();
    }
    ticker
}

// ---------------------------------------------------------------------------
// Individual normalizers
// ---------------------------------------------------------------------------

/// Streamed 24h ticker (`s`, `c`, `p`, `P`, `v`, `h`, `l`).
pub fn normalize_ticker(v: &Value) -> TickerEvent {
    build_ticker(
        str_field(v, "s"),
        f64_field(v, "c"),
        f64_field(v, "p"),
        f64_field(v, "P"),
        f64_field(v, "v"),
        f64_field(v, "h"),
        f64_field(v, "l"),
    )
}

/// REST `/api/v3/ticker/24hr` response.
pub fn normalize_rest_ticker(v: &Value) -> TickerEvent {
    build_ticker(
        str_field(v, "symbol"),
        f64_field(v, "lastPrice"),
        f64_field(v, "priceChange"),
        f64_field(v, "priceChangePercent"),
        f64_field(v, "volume"),
        f64_field(v, "highPrice"),
        f64_field(v, "lowPrice"),
    )
}

fn build_ticker(
    symbol: String,
    last_price: f64,
    price_change: f64,
    price_change_percent: f64,
    volume: f64,
    high_24h: f64,
    low_24h: f64,
) -> TickerEvent {
    TickerEvent {
        symbol,
        last_price,
        price_change,
        price_change_percent,
        volume,
        high_24h,
        low_24h,
        is_positive: price_change_percent >= 0.0,
        formatted_price: format_price(last_price),
        formatted_volume: format_volume(volume),
    }
}

/// Trade (`s`, `p`, `q`, `T`, `m`, `t`).
pub fn normalize_trade(v: &Value) -> TradeEvent {
    TradeEvent {
        symbol: str_field(v, "s"),
        price: f64_field(v, "p"),
        quantity: f64_field(v, "q"),
        time: u64_field(v, "T"),
        is_buyer_maker: bool_field(v, "m"),
        trade_id: u64_field(v, "t"),
    }
}

/// Depth (`s`, `b`, `a`, `u`), also accepting the partial-book snapshot shape
/// (`bids`, `asks`, `lastUpdateId`, no symbol).
pub fn normalize_depth(v: &Value, fallback_symbol: &str) -> DepthEvent {
    let symbol = match str_field(v, "s") {
        s if s.is_empty() => fallback_symbol.to_string(),
        s => s,
    };
    let bids = parse_levels(v.get("b").or_else(|| v.get("bids")));
    let asks = parse_levels(v.get("a").or_else(|| v.get("asks")));
    let last_update_id = match v.get("u") {
        Some(u) => lenient_u64(Some(u)),
        None => u64_field(v, "lastUpdateId"),
    };

    DepthEvent { symbol, bids, asks, last_update_id }
}

/// Kline: nested `k` object (`s,t,T,o,h,l,c,v,q,n,x,i`). A payload without
/// `k` is read as the candle object itself.
pub fn normalize_kline(v: &Value) -> KlineEvent {
    let k = v.get("k").unwrap_or(v);
    KlineEvent {
        symbol: match str_field(k, "s") {
            s if s.is_empty() => str_field(v, "s"),
            s => s,
        },
        open_time: u64_field(k, "t"),
        close_time: u64_field(k, "T"),
        open: f64_field(k, "o"),
        high: f64_field(k, "h"),
        low: f64_field(k, "l"),
        close: f64_field(k, "c"),
        volume: f64_field(k, "v"),
        quote_volume: f64_field(k, "q"),
        trades: u64_field(k, "n"),
        is_closed: bool_field(k, "x"),
        interval: str_field(k, "i"),
    }
}
