//! Upstream connector: opens, tracks and closes feed subscriptions.
//!
//! Each `open_*` call spawns one link task (see [`crate::link`]) and records it
//! in the owned [`SubscriptionRegistry`]. Invalid input is logged and yields
//! `None`; nothing here returns an error to the caller.
//!
//! Must be used from inside a tokio runtime.

use std::time::Duration;

use mdr_core::config::FeedConfig;
use mdr_core::ws::ReconnectPolicy;
use mdr_core::{FeedKind, LinkStatus, SubscriptionId, Target, normalize_symbol, normalize_symbols};
use tracing::{debug, info, warn};

use crate::binance::{FeedEndpoints, full_symbol_streams, ticker_streams};
use crate::link::{EventSink, LinkSpec, StreamCallbacks, TickerCallback, spawn_link};
use crate::registry::{RegistryEntry, SubscriptionRegistry};

/// Settings shared by every subscription a connector opens.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub endpoints: FeedEndpoints,
    pub policy: ReconnectPolicy,
    pub poll_interval: Duration,
    pub kline_intervals: Vec<String>,
    pub sockets_enabled: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self::from_feed_config(&FeedConfig::default())
    }
}

impl ConnectorConfig {
    pub fn from_feed_config(cfg: &FeedConfig) -> Self {
        Self {
            endpoints: FeedEndpoints::from_config(cfg),
            policy: cfg.reconnect_policy(),
            poll_interval: cfg.poll_interval(),
            kline_intervals: cfg.kline_intervals.clone(),
            sockets_enabled: cfg.sockets_enabled,
        }
    }
}

pub struct Connector {
    config: ConnectorConfig,
    http: reqwest::Client,
    registry: SubscriptionRegistry,
}

impl Connector {
    pub fn new(config: ConnectorConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            registry: SubscriptionRegistry::new(),
        }
    }

    pub fn from_feed_config(cfg: &FeedConfig) -> Self {
        Self::new(ConnectorConfig::from_feed_config(cfg))
    }

    /// Ticker stream for one symbol.
    pub fn open_single(&mut self, symbol: &str, on_event: TickerCallback) -> Option<SubscriptionId> {
        let Some(symbol) = normalize_symbol(symbol) else {
            warn!("open_single: blank symbol rejected");
            return None;
        };
        let url = self.config.endpoints.single_ticker_url(&symbol);
        Some(self.open(FeedKind::Ticker, Target::Single(symbol), url, EventSink::Ticker(on_event)))
    }

    /// One combined connection carrying the ticker of every symbol in `symbols`.
    ///
    /// Frames are demultiplexed by stream name, so `on_event` sees plain
    /// ticker events.
    pub fn open_multiplexed(
        &mut self,
        symbols: &[String],
        on_event: TickerCallback,
    ) -> Option<SubscriptionId> {
        let Some(symbols) = normalize_symbols(symbols) else {
            warn!("open_multiplexed: empty symbol set or blank entry rejected ({symbols:?})");
            return None;
        };
        let url = self.config.endpoints.combined_url(&ticker_streams(&symbols));
        Some(self.open(FeedKind::MultiTicker, Target::Set(symbols), url, EventSink::Ticker(on_event)))
    }

    /// Ticker, trade, depth and kline streams for one symbol on a single
    /// connection. Requires at least one callback.
    pub fn open_full_symbol_streams(
        &mut self,
        symbol: &str,
        callbacks: StreamCallbacks,
    ) -> Option<SubscriptionId> {
        let Some(symbol) = normalize_symbol(symbol) else {
            warn!("open_full_symbol_streams: blank symbol rejected");
            return None;
        };
        if callbacks.is_empty() {
            warn!("open_full_symbol_streams: no callbacks for {symbol}");
            return None;
        }
        let streams = full_symbol_streams(&symbol, &self.config.kline_intervals);
        let url = self.config.endpoints.combined_url(&streams);
        Some(self.open(FeedKind::FullSymbol, Target::Single(symbol), url, EventSink::Streams(callbacks)))
    }

    fn open(&mut self, kind: FeedKind, target: Target, url: String, sink: EventSink) -> SubscriptionId {
        self.reap();

        let id = SubscriptionId::generate(kind);
        let handle = spawn_link(LinkSpec {
            id: id.clone(),
            kind,
            url,
            symbols: target.symbols(),
            policy: self.config.policy,
            poll_interval: self.config.poll_interval,
            sockets_enabled: self.config.sockets_enabled,
            endpoints: self.config.endpoints.clone(),
            http: self.http.clone(),
            sink,
        });
        info!("[feed-{id}] opened {target:?}");
        self.registry.register(id.clone(), RegistryEntry::new(kind, target, handle));
        id
    }

    /// Stop a subscription and forget it. Unknown ids are a no-op.
    ///
    /// Returns whether an entry was removed. The socket close handshake or the
    /// in-flight poll finishes on the task after this returns.
    pub fn close(&mut self, id: &SubscriptionId) -> bool {
        match self.registry.unregister(id) {
            Some(entry) => {
                drop(entry.stop());
                info!("[feed-{id}] close requested");
                true
            }
            None => {
                debug!("close: unknown subscription {id}");
                false
            }
        }
    }

    /// Close every subscription. Returns how many were closed.
    pub fn close_all(&mut self) -> usize {
        let entries = self.registry.drain();
        let n = entries.len();
        for (_, entry) in entries {
            drop(entry.stop());
        }
        if n > 0 {
            info!("closed {n} subscriptions");
        }
        n
    }

    /// Close everything and wait for the tasks to finish.
    pub async fn shutdown(&mut self) {
        let handles: Vec<_> = self.registry.drain().into_iter().map(|(_, e)| e.stop()).collect();
        let n = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("subscription task failed during shutdown: {e}");
            }
        }
        info!("connector shut down ({n} subscriptions)");
    }

    /// Drop full-symbol entries that gave up reconnecting.
    pub fn reap(&mut self) -> usize {
        let removed = self.registry.remove_abandoned();
        for id in &removed {
            debug!("[feed-{id}] reaped");
        }
        removed.len()
    }

    pub fn status(&self, id: &SubscriptionId) -> Option<LinkStatus> {
        self.registry.get(id).map(RegistryEntry::status)
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    pub fn subscription_ids(&self) -> Vec<SubscriptionId> {
        self.registry.ids()
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdr_core::{TickerEvent, TradeEvent};
    use std::sync::Arc;

    fn offline_config() -> ConnectorConfig {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        ConnectorConfig {
            endpoints: FeedEndpoints::new(format!("ws://{addr}"), format!("http://{addr}")),
            policy: ReconnectPolicy::exponential(5, Duration::from_secs(3600)),
            poll_interval: Duration::from_secs(3600),
            kline_intervals: vec!["1m".into()],
            sockets_enabled: true,
        }
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_without_registering() {
        let mut c = Connector::new(offline_config());
        assert!(c.open_single("  ", Arc::new(|_: &TickerEvent| {})).is_none());
        assert!(c.open_multiplexed(&[], Arc::new(|_: &TickerEvent| {})).is_none());
        assert!(c.open_multiplexed(&["BTCUSDT".into(), "".into()], Arc::new(|_: &TickerEvent| {})).is_none());
        assert!(c.open_full_symbol_streams("BTCUSDT", StreamCallbacks::default()).is_none());
        assert_eq!(c.subscription_count(), 0);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut c = Connector::new(offline_config());
        let id = c.open_single("BTCUSDT", Arc::new(|_: &TickerEvent| {})).unwrap();
        assert!(id.as_str().starts_with("ticker-"));
        assert_eq!(c.subscription_count(), 1);

        assert!(c.close(&id));
        assert!(!c.close(&id));
        assert!(!c.close(&SubscriptionId::from("nope")));
        assert_eq!(c.subscription_count(), 0);
        assert!(c.status(&id).is_none());
    }

    #[tokio::test]
    async fn close_all_empties_registry() {
        let mut c = Connector::new(offline_config());
        c.open_single("btcusdt", Arc::new(|_: &TickerEvent| {})).unwrap();
        c.open_multiplexed(&["BTCUSDT".into(), "ETHUSDT".into()], Arc::new(|_: &TickerEvent| {})).unwrap();
        let cbs = StreamCallbacks { on_trade: Some(Arc::new(|_: &TradeEvent| {})), ..Default::default() };
        c.open_full_symbol_streams("ethusdt", cbs).unwrap();
        assert_eq!(c.subscription_count(), 3);

        assert_eq!(c.close_all(), 3);
        assert_eq!(c.subscription_count(), 0);
        assert_eq!(c.close_all(), 0);
    }

    #[tokio::test]
    async fn shutdown_waits_for_tasks() {
        let mut c = Connector::new(offline_config());
        c.open_single("btcusdt", Arc::new(|_: &TickerEvent| {})).unwrap();
        c.open_single("ethusdt", Arc::new(|_: &TickerEvent| {})).unwrap();
        tokio::time::timeout(Duration::from_secs(5), c.shutdown()).await.unwrap();
        assert_eq!(c.subscription_count(), 0);
    }
}
