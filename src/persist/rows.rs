//! Pure conversions from engine values to sink rows.
//!
//! This file MUST NOT do any I/O. Only value -> row mapping lives here.

use chrono::{DateTime, SecondsFormat, Utc};
use itertools::Itertools;

use crate::engine::types::{BookSnapshot, PriceLevel, Ticker, TradeRecord};

pub const TRADE_HEADERS: [&str; 3] = ["timestamp", "price", "volume"];
pub const TICKER_HEADERS: [&str; 5] = ["timestamp", "price", "high", "low", "volume"];

/// RFC 3339 UTC with millisecond precision; raw millis if out of range.
pub fn format_ts(ts_ms: u64) -> String {
    i64::try_from(ts_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ts_ms.to_string())
}

pub fn trade_headers() -> Vec<String> {
    TRADE_HEADERS.iter().map(|h| h.to_string()).collect()
}

pub fn trade_row(t: &TradeRecord) -> Vec<String> {
    vec![format_ts(t.ts_ms), t.price.to_string(), t.size.to_string()]
}

pub fn ticker_headers() -> Vec<String> {
    TICKER_HEADERS.iter().map(|h| h.to_string()).collect()
}

pub fn ticker_row(t: &Ticker) -> Vec<String> {
    vec![
        format_ts(t.ts_ms),
        t.price.to_string(),
        t.high.to_string(),
        t.low.to_string(),
        t.volume.to_string(),
    ]
}

/// `timestamp, bid1, bid1_qty, ask1, ask1_qty, ..., bidN, bidN_qty, askN, askN_qty`
pub fn orderbook_headers(depth: usize) -> Vec<String> {
    std::iter::once("timestamp".to_string())
        .chain((1..=depth).flat_map(|i| {
            [format!("bid{i}"), format!("bid{i}_qty"), format!("ask{i}"), format!("ask{i}_qty")]
        }))
        .collect()
}

// Levels missing from a thin book are written as 0, 0
pub fn orderbook_row(snap: &BookSnapshot, depth: usize) -> Vec<String> {
    let pad = |levels: &[PriceLevel]| -> Vec<(String, String)> {
        levels
            .iter()
            .map(|l| (l.price.to_string(), l.size.to_string()))
            .pad_using(depth, |_| ("0".to_string(), "0".to_string()))
            .take(depth)
            .collect()
    };
    let bids = pad(&snap.bids);
    let asks = pad(&snap.asks);
    std::iter::once(format_ts(snap.ts_ms))
        .chain(bids.into_iter().zip(asks).flat_map(|((bp, bq), (ap, aq))| [bp, bq, ap, aq]))
        .collect()
}
