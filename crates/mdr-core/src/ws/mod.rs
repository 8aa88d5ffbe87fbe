//! Upstream WebSocket link with bounded auto-reconnect.

pub mod client;
pub mod reconnect;

pub use client::{LinkExit, OnTextCallback, WsConnConfig, connect_ws, extract_host, run_link};
pub use reconnect::{Backoff, BackoffCurve, ReconnectPolicy};
