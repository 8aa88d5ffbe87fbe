//! Per-subscription task: socket link with bounded reconnect, then fallback.
//!
//! ```text
//! LinkSpec ──► spawn_link() ──► run_link (Connecting/Open/Reconnecting)
//!                                  ├─ Shutdown  ──► Closed
//!                                  └─ Exhausted ──► run_poll_loop (Polling)   ticker kinds
//!                                                └► Abandoned                 full-symbol
//! ```
//!
//! The task publishes every transition on a `watch` channel; the registry
//! keeps the receiver and the shutdown sender.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use mdr_core::error::panic_message;
use mdr_core::ws::{LinkExit, OnTextCallback, ReconnectPolicy, WsConnConfig, run_link};
use mdr_core::{
    DepthEvent, FeedKind, KlineEvent, LinkState, LinkStatus, MarketEvent, Mode, SubscriptionId,
    TickerEvent, TradeEvent,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use crate::binance::FeedEndpoints;
use crate::binance::json_parser::parse_frame;
use crate::poller::run_poll_loop;

pub type TickerCallback = Arc<dyn Fn(&TickerEvent) + Send + Sync>;
pub type TradeCallback = Arc<dyn Fn(&TradeEvent) + Send + Sync>;
pub type DepthCallback = Arc<dyn Fn(&DepthEvent) + Send + Sync>;
pub type KlineCallback = Arc<dyn Fn(&KlineEvent) + Send + Sync>;

/// Per-stream-type callbacks of a full-symbol bundle. Any subset may be set.
#[derive(Clone, Default)]
pub struct StreamCallbacks {
    pub on_ticker: Option<TickerCallback>,
    pub on_trade: Option<TradeCallback>,
    pub on_depth: Option<DepthCallback>,
    pub on_kline: Option<KlineCallback>,
}

impl StreamCallbacks {
    pub fn is_empty(&self) -> bool {
        self.on_ticker.is_none()
            && self.on_trade.is_none()
            && self.on_depth.is_none()
            && self.on_kline.is_none()
    }

    /// Route one event to the matching callback, if registered.
    pub fn dispatch(&self, event: &MarketEvent) {
        match event {
            MarketEvent::Ticker(t) => {
                if let Some(cb) = &self.on_ticker {
                    guarded("ticker", || cb(t));
                }
            }
            MarketEvent::Trade(t) => {
                if let Some(cb) = &self.on_trade {
                    guarded("trade", || cb(t));
                }
            }
            MarketEvent::Depth(d) => {
                if let Some(cb) = &self.on_depth {
                    guarded("depth", || cb(d));
                }
            }
            MarketEvent::Kline(k) => {
                if let Some(cb) = &self.on_kline {
                    guarded("kline", || cb(k));
                }
            }
        }
    }
}

/// Where decoded events go.
#[derive(Clone)]
pub enum EventSink {
    /// Ticker-only subscription (single or multiplexed).
    Ticker(TickerCallback),
    /// Full-symbol bundle.
    Streams(StreamCallbacks),
}

impl EventSink {
    pub fn dispatch(&self, event: &MarketEvent) {
        match (self, event) {
            (Self::Ticker(cb), MarketEvent::Ticker(t)) => guarded("ticker", || cb(t)),
            (Self::Ticker(_), other) => trace!("ticker sink ignoring {other:?}"),
            (Self::Streams(cbs), ev) => cbs.dispatch(ev),
        }
    }

    fn dispatch_ticker(&self, ticker: &TickerEvent) {
        match self {
            Self::Ticker(cb) => guarded("ticker", || cb(ticker)),
            Self::Streams(cbs) => {
                if let Some(cb) = &cbs.on_ticker {
                    guarded("ticker", || cb(ticker));
                }
            }
        }
    }
}

/// Run a subscriber callback, containing a panic so the link task survives.
fn guarded(kind: &str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        warn!("{kind} callback panicked: {}", panic_message(panic.as_ref()));
    }
}

/// Everything needed to run one subscription.
pub struct LinkSpec {
    pub id: SubscriptionId,
    pub kind: FeedKind,
    /// Upstream socket URL.
    pub url: String,
    /// Normalized symbols of the target; polled in this order on fallback.
    pub symbols: Vec<String>,
    pub policy: ReconnectPolicy,
    pub poll_interval: Duration,
    /// Skip the socket and poll from the start (ticker kinds only).
    pub sockets_enabled: bool,
    pub endpoints: FeedEndpoints,
    pub http: reqwest::Client,
    pub sink: EventSink,
}

/// Handles the owner keeps for a running subscription.
pub struct LinkHandle {
    pub status_rx: watch::Receiver<LinkStatus>,
    pub shutdown_tx: watch::Sender<bool>,
    pub task: JoinHandle<()>,
}

/// Spawn the subscription task on the current runtime.
pub fn spawn_link(spec: LinkSpec) -> LinkHandle {
    let (status_tx, status_rx) = watch::channel(LinkStatus::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(link_task(spec, status_tx, shutdown_rx));
    LinkHandle { status_rx, shutdown_tx, task }
}

async fn link_task(
    spec: LinkSpec,
    status: watch::Sender<LinkStatus>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let label = format!("feed-{}", spec.id);

    let exit = if spec.sockets_enabled {
        let sink = spec.sink.clone();
        let frame_label = label.clone();
        let on_text: OnTextCallback = Arc::new(move |text: &str| match parse_frame(text) {
            Ok(event) => sink.dispatch(&event),
            Err(e) => trace!("[{frame_label}] dropped frame: {e}"),
        });
        let conn = WsConnConfig::new(spec.url.clone(), label.clone());
        run_link(&conn, spec.policy, on_text, &status, &mut shutdown_rx).await
    } else {
        info!("[{label}] sockets disabled, skipping upstream socket");
        LinkExit::Exhausted
    };

    match exit {
        LinkExit::Shutdown => {}
        LinkExit::Exhausted if spec.kind.supports_polling() => {
            status.send_modify(|s| {
                s.state = LinkState::Polling;
                s.mode = Mode::Polling;
            });
            info!(
                "[{label}] falling back to REST polling every {:?} for {:?}",
                spec.poll_interval, spec.symbols
            );
            let sink = spec.sink.clone();
            run_poll_loop(
                &label,
                &spec.http,
                &spec.endpoints,
                &spec.symbols,
                spec.poll_interval,
                |t: &TickerEvent| sink.dispatch_ticker(t),
                &status,
                &mut shutdown_rx,
            )
            .await;
        }
        LinkExit::Exhausted => {
            status.send_modify(|s| s.state = LinkState::Abandoned);
            warn!("[{label}] giving up, no polling fallback for {}", spec.kind.as_str());
            return;
        }
    }

    status.send_modify(|s| s.state = LinkState::Closed);
    info!("[{label}] closed");
}
