//! Lenient JSON field readers shared by the normalizers.
//!
//! Exchange payloads encode numbers either as JSON strings (`"30000.5"`) or
//! native numbers. Every reader here is total: a missing, malformed, or
//! non-finite value yields `0`, never `NaN` and never an error.

use mdr_core::PriceLevel;

/// Parse a JSON value (string or number) as a finite `f64`, defaulting to `0.0`.
#[inline]
pub fn lenient_f64(v: Option<&serde_json::Value>) -> f64 {
    let parsed = match v {
        Some(serde_json::Value::String(s)) => fast_float2::parse::<f64, _>(s.trim()).ok(),
        Some(other) => other.as_f64(),
        None => None,
    };
    parsed.filter(|x| x.is_finite()).unwrap_or(0.0)
}

/// Parse a JSON value (string or number) as `u64`, defaulting to `0`.
#[inline]
pub fn lenient_u64(v: Option<&serde_json::Value>) -> u64 {
    match v {
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
        Some(other) => other.as_u64().unwrap_or(0),
        None => 0,
    }
}

/// Read a named field on a JSON object as `f64`.
#[inline]
pub fn f64_field(v: &serde_json::Value, key: &str) -> f64 {
    lenient_f64(v.get(key))
}

/// Read a named field on a JSON object as `u64`.
#[inline]
pub fn u64_field(v: &serde_json::Value, key: &str) -> u64 {
    lenient_u64(v.get(key))
}

/// Read a named field as `bool` (`false` when absent or not a bool).
#[inline]
pub fn bool_field(v: &serde_json::Value, key: &str) -> bool {
    v.get(key).and_then(|b| b.as_bool()).unwrap_or(false)
}

/// Read a named field as an owned string (`""` when absent).
#[inline]
pub fn str_field(v: &serde_json::Value, key: &str) -> String {
    v.get(key).and_then(|s| s.as_str()).unwrap_or("").to_string()
}

/// Convert a JSON array of `["price", "qty", ...]` levels into [`PriceLevel`]s.
///
/// Order is preserved. Entries that are not arrays are skipped; defective
/// numbers inside an array become `0`.
pub fn parse_levels(levels: Option<&serde_json::Value>) -> Vec<PriceLevel> {
    let Some(levels) = levels.and_then(|l| l.as_array()) else {
        return Vec::new();
    };
    levels
        .iter()
        .filter_map(|level| level.as_array())
        .map(|arr| PriceLevel {
            price: lenient_f64(arr.first()),
            quantity: lenient_f64(arr.get(1)),
        })
        .collect()
}
