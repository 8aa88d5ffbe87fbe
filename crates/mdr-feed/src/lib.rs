//! # mdr-feed
//!
//! Upstream market-data connector for the relay.
//!
//! ## Architecture
//!
//! [`connector::Connector`] owns a [`registry::SubscriptionRegistry`] and
//! spawns one [`link`] task per subscription. A link runs the upstream socket
//! with bounded reconnect; ticker links degrade to [`poller`] REST polling
//! when reconnects run out.
//!
//! ## Shared infrastructure
//!
//! - [`binance`]: endpoint URLs, stream names, frame normalization
//! - [`json_util`]: lenient JSON field helpers
//! - [`format`]: display formatting for prices and volumes

pub mod binance;
pub mod connector;
pub mod format;
pub mod json_util;
pub mod link;
pub mod poller;
pub mod registry;

pub use connector::{Connector, ConnectorConfig};
pub use link::{DepthCallback, KlineCallback, StreamCallbacks, TickerCallback, TradeCallback};
