//! Binance public market-data endpoints.
//!
//! - Single ticker: `<ws_base>/ws/<symbol>@ticker`
//! - Combined: `<ws_base>/stream?streams=<s1>/<s2>/...`
//! - REST fallback: `<rest_base>/api/v3/ticker/24hr?symbol=<SYMBOL>`

pub mod json_parser;

use mdr_core::config::FeedConfig;
use mdr_core::upper_symbol;

/// Base URLs of the upstream feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEndpoints {
    pub ws_base: String,
    pub rest_base: String,
}

impl Default for FeedEndpoints {
    fn default() -> Self {
        Self::from_config(&FeedConfig::default())
    }
}

impl FeedEndpoints {
    pub fn new(ws_base: impl Into<String>, rest_base: impl Into<String>) -> Self {
        Self {
            ws_base: ws_base.into().trim_end_matches('/').to_string(),
            rest_base: rest_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(cfg: &FeedConfig) -> Self {
        Self::new(cfg.ws_base.clone(), cfg.rest_base.clone())
    }

    /// Raw stream URL for one symbol's ticker. `symbol` must be lowercase.
    pub fn single_ticker_url(&self, symbol: &str) -> String {
        format!("{}/ws/{symbol}@ticker", self.ws_base)
    }

    /// Combined-stream URL carrying every stream in `streams`.
    pub fn combined_url(&self, streams: &[String]) -> String {
        format!("{}/stream?streams={}", self.ws_base, streams.join("/"))
    }

    /// REST 24-hour ticker snapshot URL.
    pub fn ticker_rest_url(&self, symbol: &str) -> String {
        format!("{}/api/v3/ticker/24hr?symbol={}", self.rest_base, upper_symbol(symbol))
    }
}

/// `<symbol>@ticker` for each symbol.
pub fn ticker_streams(symbols: &[String]) -> Vec<String> {
    symbols.iter().map(|s| format!("{s}@ticker")).collect()
}

/// Ticker, trade, depth and one kline stream per interval for `symbol`.
pub fn full_symbol_streams(symbol: &str, kline_intervals: &[String]) -> Vec<String> {
    let mut streams = vec![
        format!("{symbol}@ticker"),
        format!("{symbol}@trade"),
        format!("{symbol}@depth"),
    ];
    streams.extend(kline_intervals.iter().map(|i| format!("{symbol}@kline_{i}")));
    streams
}
