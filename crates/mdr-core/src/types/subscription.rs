//! Subscription identity and link state.
//!
//! A subscription is one logical upstream feed. Its live state is an explicit
//! value ([`LinkStatus`]) rather than variables captured by a reconnect task,
//! so it can be inspected and asserted on from outside the task.

use serde::Serialize;

// ---------------------------------------------------------------------------
// SubscriptionId
// ---------------------------------------------------------------------------

/// Opaque identifier of an active subscription.
///
/// Generated at creation time; meaningless once the subscription is closed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Generate a fresh id tagged with the feed kind (e.g. `ticker-3f1c…`).
    pub fn generate(kind: FeedKind) -> Self {
        Self(format!("{}-{}", kind.as_str(), uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Target / FeedKind
// ---------------------------------------------------------------------------

/// What a subscription covers. Symbols are stored normalized (lowercase).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Single(String),
    Set(Vec<String>),
}

impl Target {
    /// All symbols of the target, in order.
    pub fn symbols(&self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s.clone()],
            Self::Set(v) => v.clone(),
        }
    }
}

/// The shape of upstream connection backing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// One symbol's ticker stream.
    Ticker,
    /// Combined ticker streams for a symbol set.
    MultiTicker,
    /// Ticker, trade, depth and every kline interval for one symbol.
    FullSymbol,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::MultiTicker => "multi",
            Self::FullSymbol => "full",
        }
    }

    /// Whether exhausting reconnects degrades to REST polling.
    ///
    /// Only ticker feeds have a REST snapshot equivalent.
    pub fn supports_polling(&self) -> bool {
        matches!(self, Self::Ticker | Self::MultiTicker)
    }
}

// ---------------------------------------------------------------------------
// Mode / LinkState / LinkStatus
// ---------------------------------------------------------------------------

/// Transport currently used by a subscription.
///
/// Starts as `Socket`; may move to `Polling` once and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Socket,
    Polling,
}

/// Position of a subscription in the reconnect/fallback state machine.
///
/// ```text
/// Connecting ─► Open ─► Reconnecting ─► Open
///                              └──────► Polling   (ticker feeds)
///                              └──────► Abandoned (full-symbol bundles)
/// any ─► Closed (explicit close)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    #[default]
    Connecting,
    Open,
    Reconnecting,
    Polling,
    Abandoned,
    Closed,
}

impl LinkState {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Abandoned | Self::Closed)
    }
}

/// Snapshot of a subscription's link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatus {
    pub state: LinkState,
    pub mode: Mode,
    /// Reconnect attempts since the last successful open.
    pub attempts: u32,
    /// Epoch ms of the last event delivered to callbacks (0 = none yet).
    pub last_event_ms: u64,
}

impl LinkStatus {
    pub fn is_live(&self) -> bool {
        matches!(self.state, LinkState::Open | LinkState::Polling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_tagged() {
        let a = SubscriptionId::generate(FeedKind::Ticker);
        let b = SubscriptionId::generate(FeedKind::Ticker);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("ticker-"));
        assert!(SubscriptionId::generate(FeedKind::FullSymbol).as_str().starts_with("full-"));
    }

    #[test]
    fn only_ticker_feeds_poll() {
        assert!(FeedKind::Ticker.supports_polling());
        assert!(FeedKind::MultiTicker.supports_polling());
        assert!(!FeedKind::FullSymbol.supports_polling());
    }

    #[test]
    fn default_status_is_connecting_socket() {
        let status = LinkStatus::default();
        assert_eq!(status.state, LinkState::Connecting);
        assert_eq!(status.mode, Mode::Socket);
        assert_eq!(status.attempts, 0);
        assert!(!status.is_live());
    }

    #[test]
    fn target_symbols() {
        assert_eq!(Target::Single("btcusdt".into()).symbols(), vec!["btcusdt"]);
        let set = Target::Set(vec!["a".into(), "b".into()]);
        assert_eq!(set.symbols().len(), 2);
    }
}
