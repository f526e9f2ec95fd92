//! Pure market statistics, recomputed on demand from whatever the caller
//! currently holds. Nothing here keeps state between calls.

use rust_decimal::Decimal;

use crate::engine::types::{PriceLevel, TradeRecord};

/// Volume-weighted average price; zero when there is no volume or the
/// notional does not fit in a `Decimal`.
pub fn vwap<'a, I>(trades: I) -> Decimal
where
    I: IntoIterator<Item = &'a TradeRecord>,
{
    let sums = trades.into_iter().try_fold((Decimal::ZERO, Decimal::ZERO), |(n, v), t| {
        let notional = n.checked_add(t.price.checked_mul(t.size)?)?;
        Some((notional, v.checked_add(t.size)?))
    });
    match sums {
        Some((notional, volume)) if !volume.is_zero() => notional.checked_div(volume).unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

/// Sum that sticks at `Decimal::MAX`/`MIN` instead of overflowing.
pub fn saturating_sum<I>(values: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    values.into_iter().fold(Decimal::ZERO, |acc, v| acc.saturating_add(v))
}

/// `(bid total - ask total) / (bid total + ask total)` over the given levels,
/// zero when both sides are empty.
pub fn liquidity_imbalance(bids: &[PriceLevel], asks: &[PriceLevel]) -> Decimal {
    let bid_total = saturating_sum(bids.iter().map(|l| l.size));
    let ask_total = saturating_sum(asks.iter().map(|l| l.size));
    imbalance_of_totals(bid_total, ask_total)
}

pub fn imbalance_of_totals(bid_total: Decimal, ask_total: Decimal) -> Decimal {
    let denom = bid_total.saturating_add(ask_total);
    if denom.is_zero() {
        return Decimal::ZERO;
    }
    bid_total
        .checked_sub(ask_total)
        .and_then(|diff| diff.checked_div(denom))
        .unwrap_or(Decimal::ZERO)
}

pub fn spread(best_bid: Option<PriceLevel>, best_ask: Option<PriceLevel>) -> Option<Decimal> {
    match (best_bid, best_ask) {
        (Some(bid), Some(ask)) => ask.price.checked_sub(bid.price),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeSizeStats {
    pub mean: Decimal,
    pub median: Decimal,
    pub min: Decimal,
    pub max: Decimal,
}

pub fn trade_size_stats<'a, I>(trades: I) -> Option<TradeSizeStats>
where
    I: IntoIterator<Item = &'a TradeRecord>,
{
    let mut sizes: Vec<Decimal> = trades.into_iter().map(|t| t.size).collect();
    if sizes.is_empty() {
        return None;
    }
    sizes.sort();
    let n = sizes.len();
    let total = sizes.iter().try_fold(Decimal::ZERO, |acc, s| acc.checked_add(*s))?;
    let median = if n % 2 == 1 {
        sizes[n / 2]
    } else {
        sizes[n / 2 - 1].checked_add(sizes[n / 2])? / Decimal::TWO
    };
    Some(TradeSizeStats {
        mean: total.checked_div(Decimal::from(n))?,
        median,
        min: sizes[0],
        max: sizes[n - 1],
    })
}
