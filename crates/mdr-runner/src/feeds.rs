//! Upstream subscriptions the relay keeps open.
//!
//! Tickers for every configured symbol ride one multiplexed subscription,
//! which degrades to REST polling when the socket cannot be restored. Trades,
//! depth and klines come from one full-symbol bundle per symbol; bundles have
//! no polling fallback, so abandoned ones are reopened by [`RelayFeeds::revive`].

use mdr_core::SubscriptionId;
use mdr_feed::Connector;
use tracing::{info, warn};

use crate::bridge::Bridge;

pub struct RelayFeeds {
    tickers: Option<SubscriptionId>,
    bundles: Vec<(String, SubscriptionId)>,
}

impl RelayFeeds {
    pub fn open(connector: &mut Connector, bridge: &Bridge, symbols: &[String]) -> Self {
        let tickers = if symbols.is_empty() {
            None
        } else {
            connector.open_multiplexed(symbols, bridge.ticker_callback())
        };
        match &tickers {
            Some(id) => info!("tickers {id} opened for {symbols:?}"),
            None => warn!("no ticker subscription for {symbols:?}"),
        }

        let mut bundles = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match connector.open_full_symbol_streams(symbol, bridge.callbacks()) {
                Some(id) => {
                    info!("feed {id} opened for {symbol}");
                    bundles.push((symbol.clone(), id));
                }
                None => warn!("feed for {symbol} rejected"),
            }
        }
        Self { tickers, bundles }
    }

    /// Reopen bundles that gave up. Returns how many were reopened.
    pub fn revive(&mut self, connector: &mut Connector, bridge: &Bridge) -> usize {
        connector.reap();
        let mut reopened = 0;
        for (symbol, id) in &mut self.bundles {
            if connector.status(id).is_some() {
                continue;
            }
            if let Some(new_id) = connector.open_full_symbol_streams(symbol, bridge.callbacks()) {
                info!("feed {id} for {symbol} was abandoned, reopened as {new_id}");
                *id = new_id;
                reopened += 1;
            }
        }
        reopened
    }

    pub fn len(&self) -> usize {
        self.bundles.len() + usize::from(self.tickers.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use mdr_core::LinkState;
    use mdr_core::ws::ReconnectPolicy;
    use mdr_feed::ConnectorConfig;
    use mdr_feed::binance::FeedEndpoints;

    fn unreachable_connector() -> Connector {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        Connector::new(ConnectorConfig {
            endpoints: FeedEndpoints::new(format!("ws://{addr}"), format!("http://{addr}")),
            policy: ReconnectPolicy::exponential(1, Duration::from_millis(1)),
            poll_interval: Duration::from_secs(3600),
            kline_intervals: vec!["1m".into()],
            sockets_enabled: true,
        })
    }

    #[tokio::test]
    async fn abandoned_bundles_are_reopened_and_tickers_poll() {
        let (hub, _hub_task) = mdr_fanout::spawn_hub();
        let bridge = Bridge::new(hub);
        let mut connector = unreachable_connector();
        let mut feeds = RelayFeeds::open(&mut connector, &bridge, &["btcusdt".into()]);
        assert_eq!(feeds.len(), 2);
        assert_eq!(connector.subscription_count(), 2);

        let old = feeds.bundles[0].1.clone();
        let tickers = feeds.tickers.clone().unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while connector.status(&old).map(|s| s.state) != Some(LinkState::Abandoned) {
            assert!(tokio::time::Instant::now() < deadline, "bundle never gave up");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(feeds.revive(&mut connector, &bridge), 1);
        assert_ne!(feeds.bundles[0].1, old);
        assert!(connector.status(&old).is_none());
        assert_eq!(connector.subscription_count(), 2);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while connector.status(&tickers).map(|s| s.state) != Some(LinkState::Polling) {
            assert!(tokio::time::Instant::now() < deadline, "tickers never fell back");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        connector.shutdown().await;
    }

    #[tokio::test]
    async fn live_bundles_are_left_alone() {
        let (hub, _hub_task) = mdr_fanout::spawn_hub();
        let bridge = Bridge::new(hub);
        let mut connector = Connector::new(ConnectorConfig {
            policy: ReconnectPolicy::exponential(5, Duration::from_secs(3600)),
            ..unreachable_connector().config().clone()
        });
        let mut feeds = RelayFeeds::open(&mut connector, &bridge, &["btcusdt".into(), "ethusdt".into()]);
        assert_eq!(feeds.len(), 3);
        assert_eq!(feeds.revive(&mut connector, &bridge), 0);
        assert_eq!(connector.subscription_count(), 3);
        connector.shutdown().await;
    }
}
