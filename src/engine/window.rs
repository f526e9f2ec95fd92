use std::collections::VecDeque;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::trace;

use crate::engine::stats::{self, TradeSizeStats};
use crate::engine::types::{TradeRecord, Venue};

/// Rolling, time-bounded tape of recent trades for one (venue, symbol).
///
/// Records arrive in feed order and are never re-sorted. Statistics are
/// computed over whatever survives the last prune.
#[derive(Debug, Clone)]
pub struct TradeWindow {
    venue: Venue,
    symbol: String,
    duration_ms: u64,
    records: VecDeque<TradeRecord>,
}

// Summary published to readers after each trade
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    pub trades: usize,
    pub last_price: Option<Decimal>,
    pub vwap: Decimal,
    pub volume: Decimal,
}

impl TradeWindow {
    pub fn new(venue: Venue, symbol: &str, duration: Duration) -> Self {
        Self {
            venue,
            symbol: symbol.to_string(),
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            records: VecDeque::new(),
        }
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &TradeRecord> {
        self.records.iter()
    }

    /// Push a trade and prune against its timestamp (feed time).
    pub fn append(&mut self, record: TradeRecord) -> usize {
        let now = record.ts_ms;
        self.records.push_back(record);
        self.prune(now)
    }

    /// Drop records older than `now_ms - duration`. Safe to call when idle.
    pub fn prune(&mut self, now_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(self.duration_ms);
        let mut dropped = 0;
        while let Some(head) = self.records.front() {
            if head.ts_ms >= cutoff {
                break;
            }
            self.records.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            trace!(venue = %self.venue, symbol = %self.symbol, dropped, remaining = self.records.len(), "Pruned trade window");
        }
        dropped
    }

    pub fn vwap(&self) -> Decimal {
        stats::vwap(&self.records)
    }

    pub fn volume(&self) -> Decimal {
        stats::saturating_sum(self.records.iter().map(|t| t.size))
    }

    pub fn last_price(&self) -> Option<Decimal> {
        self.records.back().map(|t| t.price)
    }

    pub fn trade_size_stats(&self) -> Option<TradeSizeStats> {
        stats::trade_size_stats(&self.records)
    }

    /// Mean price of the last `period` trades.
    pub fn moving_average(&self, period: usize) -> Option<Decimal> {
        if period == 0 || self.records.len() < period {
            return None;
        }
        let total = self
            .records
            .iter()
            .rev()
            .take(period)
            .try_fold(Decimal::ZERO, |acc, t| acc.checked_add(t.price))?;
        total.checked_div(Decimal::from(period))
    }

    pub fn stats(&self) -> WindowStats {
        WindowStats {
            trades: self.records.len(),
            last_price: self.last_price(),
            vwap: self.vwap(),
            volume: self.volume(),
        }
    }
}
