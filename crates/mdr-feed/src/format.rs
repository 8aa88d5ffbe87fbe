//! Display formatting for prices and volumes.
//!
//! - Price precision adapts to magnitude: 2 decimals from 1000 up (with
//!   thousands separators), 4 decimals from 1 up, 8 decimals below 1.
//! - Volume is abbreviated with `K`/`M`/`B` at 1e3/1e6/1e9, two decimals.
//!
//! Tiers are picked from the value as displayed, so rounding that carries a
//! value over a boundary (`999.99999`) lands in the next tier.

fn price_decimals(abs: f64) -> usize {
    if abs >= 1000.0 {
        2
    } else if abs >= 1.0 {
        4
    } else {
        8
    }
}

/// Format a price with magnitude-dependent precision.
pub fn format_price(price: f64) -> String {
    let mut decimals = price_decimals(price.abs());
    let mut text = format!("{price:.decimals$}");
    let rounded = text.parse::<f64>().map_or(price.abs(), f64::abs);
    let carried = price_decimals(rounded);
    if carried != decimals {
        decimals = carried;
        text = format!("{price:.decimals$}");
    }
    group_thousands(&text)
}

const VOLUME_UNITS: [(f64, &str); 4] = [(1.0, ""), (1e3, "K"), (1e6, "M"), (1e9, "B")];

/// Format a volume with a K/M/B suffix.
pub fn format_volume(volume: f64) -> String {
    let abs = volume.abs();
    let mut tier = VOLUME_UNITS.iter().rposition(|(div, _)| abs >= *div).unwrap_or(0);
    loop {
        let (div, suffix) = VOLUME_UNITS[tier];
        let text = format!("{:.2}", volume / div);
        let carried = text.parse::<f64>().is_ok_and(|v| v.abs() >= 1000.0);
        if carried && tier + 1 < VOLUME_UNITS.len() {
            tier += 1;
            continue;
        }
        return format!("{text}{suffix}");
    }
}

/// Insert `,` every three digits of the integer part of a decimal string.
fn group_thousands(s: &str) -> String {
    let (sign, unsigned) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}
