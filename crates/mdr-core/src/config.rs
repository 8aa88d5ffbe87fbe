//! Configuration parsing for the market-data relay.
//!
//! The runner reads a single JSON file. Every field has a default, so `{}` is a
//! valid config that relays nothing upstream but still serves the fan-out
//! endpoint.
//!
//! # Example config
//!
//! ```json
//! {
//!   "relay": { "module_name": "mdr", "log_path": "/tmp/log" },
//!   "feed": {
//!     "symbols": ["BTCUSDT", "ETHUSDT"],
//!     "max_reconnect_attempts": 5,
//!     "base_delay_ms": 1000,
//!     "poll_interval_ms": 5000
//!   },
//!   "fanout": { "port": 8080, "dev_port": 3001, "frontend_origin": "http://localhost:3000" }
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::RelayError;
use crate::ws::ReconnectPolicy;

/// Environment flag selecting production defaults (`production`).
pub const ENV_FLAG: &str = "RELAY_ENV";

/// Environment override for the fan-out listening port.
pub const PORT_OVERRIDE: &str = "RELAY_PORT";

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    pub relay: ModuleMeta,
    /// Upstream feed settings.
    pub feed: FeedConfig,
    /// Fan-out server settings.
    pub fanout: FanoutConfig,
}

/// Module metadata block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

impl ModuleMeta {
    pub fn module_name(&self) -> String {
        self.module_name.clone().unwrap_or_else(|| "mdr-runner".to_string())
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// Upstream exchange feed configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// WebSocket base (scheme + host + port), e.g. `wss://stream.binance.com:9443`.
    pub ws_base: String,
    /// REST base used by the polling fallback, e.g. `https://api.binance.com`.
    pub rest_base: String,
    /// Symbols the runner opens full-symbol bundles for.
    pub symbols: Vec<String>,
    /// Reconnect attempts before fallback / give-up.
    pub max_reconnect_attempts: u32,
    /// Base of the exponential reconnect delay.
    pub base_delay_ms: u64,
    /// Interval of the REST polling fallback.
    pub poll_interval_ms: u64,
    /// Kline intervals included in a full-symbol bundle.
    pub kline_intervals: Vec<String>,
    /// When false, ticker subscriptions start directly in polling mode.
    pub sockets_enabled: bool,
    /// How often the runner reopens full-symbol bundles that gave up.
    pub revive_interval_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_base: "wss://stream.binance.com:9443".to_string(),
            rest_base: "https://api.binance.com".to_string(),
            symbols: Vec::new(),
            max_reconnect_attempts: ReconnectPolicy::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: ReconnectPolicy::DEFAULT_BASE_DELAY.as_millis() as u64,
            poll_interval_ms: 5000,
            kline_intervals: default_kline_intervals(),
            sockets_enabled: true,
            revive_interval_ms: 30_000,
        }
    }
}

impl FeedConfig {
    /// Exponential reconnect policy built from this config.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::exponential(
            self.max_reconnect_attempts,
            Duration::from_millis(self.base_delay_ms),
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn revive_interval(&self) -> Duration {
        Duration::from_millis(self.revive_interval_ms)
    }
}

/// Kline intervals subscribed in a full-symbol bundle when none are configured.
pub fn default_kline_intervals() -> Vec<String> {
    ["1m", "5m", "15m", "1h", "4h", "1d"].iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Fan-out server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Listening port in production.
    pub port: u16,
    /// Listening port outside production.
    pub dev_port: u16,
    /// Only this origin may open browser connections.
    pub frontend_origin: String,
    /// Per-connection outbound buffer; frames beyond it are dropped.
    pub client_channel_capacity: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            dev_port: 3001,
            frontend_origin: "http://localhost:3000".to_string(),
            client_channel_capacity: 1024,
        }
    }
}

impl FanoutConfig {
    /// Pick the listening port: explicit override, else by environment flag.
    pub fn effective_port(&self, env_flag: Option<&str>, port_override: Option<&str>) -> u16 {
        if let Some(port) = port_override.and_then(|p| p.trim().parse().ok()) {
            return port;
        }
        match env_flag {
            Some(flag) if flag.eq_ignore_ascii_case("production") => self.port,
            _ => self.dev_port,
        }
    }

    /// [`effective_port`](Self::effective_port) read from the process environment.
    pub fn port_from_env(&self) -> u16 {
        let flag = std::env::var(ENV_FLAG).ok();
        let port = std::env::var(PORT_OVERRIDE).ok();
        self.effective_port(flag.as_deref(), port.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.feed.poll_interval_ms == 0 {
            return Err(RelayError::Config("feed.poll_interval_ms must be > 0".into()));
        }
        if self.feed.revive_interval_ms == 0 {
            return Err(RelayError::Config("feed.revive_interval_ms must be > 0".into()));
        }
        if self.fanout.client_channel_capacity == 0 {
            return Err(RelayError::Config("fanout.client_channel_capacity must be > 0".into()));
        }
        if self.feed.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(RelayError::Config("feed.symbols contains a blank entry".into()));
        }
        Ok(())
    }
}

/// Load, parse, and validate a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
