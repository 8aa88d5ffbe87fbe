//! REST polling fallback for ticker subscriptions.
//!
//! Once a ticker link has exhausted its reconnects it polls
//! `/api/v3/ticker/24hr` for every symbol of its target at a fixed interval,
//! forever, until shut down. A failed symbol is logged and skipped; the rest
//! of the batch still goes out. Successful polls are normalized into the same
//! [`TickerEvent`] the socket path produces.

use std::time::Duration;

use mdr_core::error::RelayError;
use mdr_core::{LinkStatus, TickerEvent, time_util};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::binance::FeedEndpoints;
use crate::binance::json_parser::normalize_rest_ticker;

/// Upper bound on one REST snapshot request, body included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetch one symbol's 24h ticker snapshot, giving up after `timeout`.
pub async fn fetch_ticker(
    http: &reqwest::Client,
    endpoints: &FeedEndpoints,
    symbol: &str,
    timeout: Duration,
) -> Result<TickerEvent, RelayError> {
    let url = endpoints.ticker_rest_url(symbol);
    let resp = tokio::time::timeout(timeout, get_json(http, &url))
        .await
        .map_err(|_| RelayError::Http(format!("{url} timed out after {timeout:?}")))??;

    Ok(normalize_rest_ticker(&resp))
}

async fn get_json(http: &reqwest::Client, url: &str) -> Result<serde_json::Value, RelayError> {
    let resp = http
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| RelayError::Http(e.to_string()))?;
    resp.json()
        .await
        .map_err(|e| RelayError::Http(format!("invalid body: {e}")))
}

/// Poll every symbol once per `interval` until shutdown.
///
/// The first round fires immediately.
#[allow(clippy::too_many_arguments)]
pub async fn run_poll_loop<F>(
    label: &str,
    http: &reqwest::Client,
    endpoints: &FeedEndpoints,
    symbols: &[String],
    interval: Duration,
    on_ticker: F,
    status: &watch::Sender<LinkStatus>,
    shutdown_rx: &mut watch::Receiver<bool>,
) where
    F: Fn(&TickerEvent),
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_rx.changed() => {
                debug!("[{label}] polling stopped");
                return;
            }
        }

        tokio::select! {
            _ = poll_round(label, http, endpoints, symbols, &on_ticker, status) => {}
            _ = shutdown_rx.changed() => {
                debug!("[{label}] polling stopped mid-round");
                return;
            }
        }
    }
}

/// One pass over the symbol set.
async fn poll_round<F>(
    label: &str,
    http: &reqwest::Client,
    endpoints: &FeedEndpoints,
    symbols: &[String],
    on_ticker: &F,
    status: &watch::Sender<LinkStatus>,
) where
    F: Fn(&TickerEvent),
{
    for symbol in symbols {
        match fetch_ticker(http, endpoints, symbol, REQUEST_TIMEOUT).await {
            Ok(event) => {
                status.send_modify(|s| s.last_event_ms = time_util::now_ms());
                on_ticker(&event);
            }
            Err(e) => warn!("[{label}] poll failed for {symbol}: {e}"),
        }
    }
}
