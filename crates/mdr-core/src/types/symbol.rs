//! Symbol normalization.
//!
//! Upstream stream names use lowercase symbols (`btcusdt@ticker`) while REST
//! queries and room names use uppercase (`BTCUSDT`). Callers may pass either;
//! everything is funnelled through these helpers.

/// Trim and lowercase a caller-supplied symbol.
///
/// Returns `None` if nothing is left after trimming.
#[inline]
pub fn normalize_symbol(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalize a list of symbols, preserving order.
///
/// Returns `None` if the list is empty or any entry is blank, so a partially
/// invalid request is rejected as a whole.
pub fn normalize_symbols(symbols: &[String]) -> Option<Vec<String>> {
    if symbols.is_empty() {
        return None;
    }
    symbols.iter().map(|s| normalize_symbol(s)).collect()
}

/// Uppercase form used for REST queries and room names.
#[inline]
pub fn upper_symbol(s: &str) -> String {
    s.trim().to_uppercase()
}
