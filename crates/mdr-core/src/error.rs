//! Typed error definitions for the market-data relay.
//!
//! [`RelayError`] covers the failure classes the relay distinguishes. None of
//! them cross the public connector/client surface as hard failures: callers
//! observe connectivity through link status and connection-status events. The
//! variants exist for plumbing code that propagates with `?` and logs.

use thiserror::Error;

/// Domain-specific errors for the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// WebSocket connection, handshake, or communication error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// REST snapshot request failed.
    #[error("http error: {0}")]
    Http(String),

    /// Upstream payload could not be recognized.
    #[error("parse error: {0}")]
    Parse(String),

    /// Fan-out protocol frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let a: Box<dyn std::any::Any + Send> = Box::new("static");
        let b: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        let c: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(a.as_ref()), "static");
        assert_eq!(panic_message(b.as_ref()), "owned");
        assert_eq!(panic_message(c.as_ref()), "non-string panic payload");
    }
}
