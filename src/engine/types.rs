use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Exchange data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Binance,
    Bitfinex,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::Bitfinex => "bitfinex",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// Bitfinex-style sign convention: positive amount = bid, negative = ask.
    pub fn from_amount(amount: Decimal) -> Option<Side> {
        if amount.is_sign_positive() && !amount.is_zero() {
            Some(Side::Bid)
        } else if amount.is_sign_negative() && !amount.is_zero() {
            Some(Side::Ask)
        } else {
            None
        }
    }
}

// One aggregated price level as published to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

// A single executed trade as seen on the tape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ts_ms: u64,
    pub price: Decimal,
    pub size: Decimal,
}

// 24h rolling ticker as published by the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub ts_ms: u64,
    pub price: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: Decimal,
}

/// Canonical event produced by every feed adapter, independent of venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Complete state of one side; replaces whatever the side held before.
    Snapshot { side: Side, levels: Vec<PriceLevel> },
    Upsert { side: Side, price: Decimal, size: Decimal },
    Delete { side: Side, price: Decimal },
    Trade(TradeRecord),
    Ticker(Ticker),
    Heartbeat,
}

impl Event {
    pub fn is_book(&self) -> bool {
        matches!(self, Event::Snapshot { .. } | Event::Upsert { .. } | Event::Delete { .. })
    }
}

/// Immutable top-N view of a book at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub ts_ms: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl BookSnapshot {
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }

    // Same visible levels, ignoring when they were observed
    pub fn same_levels(&self, other: &BookSnapshot) -> bool {
        self.bids == other.bids && self.asks == other.asks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookState {
    Uninitialized,
    Synced,
}

/// How a venue conveys book state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reconciliation {
    /// Every message carries the complete top-N depth.
    FullReplace,
    /// A snapshot followed by per-level add/modify/remove deltas.
    Incremental,
}

impl fmt::Display for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reconciliation::FullReplace => write!(f, "full_replace"),
            Reconciliation::Incremental => write!(f, "incremental"),
        }
    }
}

pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
