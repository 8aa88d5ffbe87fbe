//! # mdr-core
//!
//! Core crate for the market-data relay, providing:
//!
//! - **Types** (`types`) - canonical market events, subscription ids, link state, symbol helpers
//! - **Configuration** (`config`) - JSON config deserialization
//! - **Error types** (`error`) - domain-specific `RelayError` via thiserror
//! - **WebSocket** (`ws`) - upstream link with bounded reconnect policy
//! - **Time utilities** (`time_util`) - epoch-millisecond timestamps
//! - **Logging** (`logging`) - tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;
