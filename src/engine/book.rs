use std::collections::BTreeMap;
use std::sync::Arc;

use itertools::Either;
use rust_decimal::Decimal;
use tracing::{debug, instrument, trace, warn};

use crate::engine::stats;
use crate::engine::types::{BookSnapshot, BookState, Event, PriceLevel, Reconciliation, Side, Venue};

/// Every known level of one side of the book, keyed by price.
///
/// Storage is always the full set of levels the venue has told us about;
/// top-N is derived on demand because later deltas may reference levels
/// that are currently outside the visible depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBookSide {
    side: Side,
    levels: BTreeMap<Decimal, Decimal>,
}

impl OrderBookSide {
    pub fn new(side: Side) -> Self {
        Self { side, levels: BTreeMap::new() }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn get(&self, price: &Decimal) -> Option<Decimal> {
        self.levels.get(price).copied()
    }

    // Best-first: descending for bids, ascending for asks
    pub fn iter(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        let inner = match self.side {
            Side::Bid => Either::Left(self.levels.iter().rev()),
            Side::Ask => Either::Right(self.levels.iter()),
        };
        inner.map(|(p, s)| PriceLevel::new(*p, *s))
    }

    pub fn best(&self) -> Option<PriceLevel> {
        self.iter().next()
    }

    pub fn top_n(&self, n: usize) -> Vec<PriceLevel> {
        self.iter().take(n).collect()
    }

    /// Replace the whole side. Non-positive sizes are dropped.
    pub fn replace(&mut self, levels: &[PriceLevel]) {
        self.levels.clear();
        for lvl in levels {
            if lvl.size > Decimal::ZERO {
                self.levels.insert(lvl.price, lvl.size);
            }
        }
    }

    pub fn upsert(&mut self, price: Decimal, size: Decimal) {
        if size > Decimal::ZERO {
            self.levels.insert(price, size);
        } else {
            self.levels.remove(&price);
        }
    }

    /// Removing a level that is not there is a no-op: the venue and the
    /// local view already agree that it is absent.
    pub fn remove(&mut self, price: &Decimal) -> bool {
        self.levels.remove(price).is_some()
    }
}

/// Canonical order book for one (venue, symbol).
///
/// Single writer: the owning pipeline applies every event in arrival order and
/// calls [`OrderBookEngine::publish`] once per inbound message. Readers only
/// ever see the immutable [`BookSnapshot`] values it hands out.
#[derive(Debug)]
pub struct OrderBookEngine {
    venue: Venue,
    symbol: String,
    mode: Reconciliation,
    depth: usize,
    state: BookState,
    bids: OrderBookSide,
    asks: OrderBookSide,
    last_emitted: Option<Arc<BookSnapshot>>,
}

impl OrderBookEngine {
    pub fn new(venue: Venue, symbol: &str, mode: Reconciliation, depth: usize) -> Self {
        debug!(%venue, symbol, %mode, depth, "Initialized order book engine");
        Self {
            venue,
            symbol: symbol.to_string(),
            mode,
            depth,
            state: BookState::Uninitialized,
            bids: OrderBookSide::new(Side::Bid),
            asks: OrderBookSide::new(Side::Ask),
            last_emitted: None,
        }
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn state(&self) -> BookState {
        self.state
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn bids(&self) -> &OrderBookSide {
        &self.bids
    }

    pub fn asks(&self) -> &OrderBookSide {
        &self.asks
    }

    pub fn last_emitted(&self) -> Option<Arc<BookSnapshot>> {
        self.last_emitted.clone()
    }

    fn side_mut(&mut self, side: Side) -> &mut OrderBookSide {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    /// Apply one event. Returns `true` if it was a book event the engine
    /// accepted; trades, tickers and heartbeats are ignored here.
    #[instrument(level = "trace", skip(self), fields(venue = %self.venue, symbol = %self.symbol))]
    pub fn apply(&mut self, event: &Event) -> bool {
        match event {
            Event::Snapshot { side, levels } => {
                self.side_mut(*side).replace(levels);
                if self.state == BookState::Uninitialized {
                    debug!(?side, levels = levels.len(), "Book synced from snapshot");
                }
                self.state = BookState::Synced;
                true
            }
            Event::Upsert { side, price, size } => {
                if self.mode == Reconciliation::FullReplace {
                    warn!(?side, %price, "Ignoring incremental update on a full-replace book");
                    return false;
                }
                self.side_mut(*side).upsert(*price, *size);
                true
            }
            Event::Delete { side, price } => {
                if self.mode == Reconciliation::FullReplace {
                    warn!(?side, %price, "Ignoring incremental delete on a full-replace book");
                    return false;
                }
                if !self.side_mut(*side).remove(price) {
                    trace!(?side, %price, "Delete for absent level");
                }
                true
            }
            Event::Trade(_) | Event::Ticker(_) | Event::Heartbeat => false,
        }
    }

    pub fn top_n(&self) -> BookSnapshot {
        BookSnapshot {
            ts_ms: 0,
            bids: self.bids.top_n(self.depth),
            asks: self.asks.top_n(self.depth),
        }
    }

    /// Emit a new snapshot if the visible top-N differs from the last one
    /// emitted. Changes below the visible depth are suppressed.
    pub fn publish(&mut self, ts_ms: u64) -> Option<Arc<BookSnapshot>> {
        let mut view = self.top_n();
        if let Some(last) = &self.last_emitted {
            if last.same_levels(&view) {
                trace!(venue = %self.venue, symbol = %self.symbol, "Top of book unchanged, suppressing");
                return None;
            }
        }
        view.ts_ms = ts_ms;
        let snap = Arc::new(view);
        self.last_emitted = Some(Arc::clone(&snap));
        Some(snap)
    }

    /// Apply every event carried by one inbound message, then publish.
    pub fn apply_message(&mut self, events: &[Event], ts_ms: u64) -> Option<Arc<BookSnapshot>> {
        let mut touched = false;
        for event in events {
            touched |= self.apply(event);
        }
        if touched {
            self.publish(ts_ms)
        } else {
            None
        }
    }

    pub fn spread(&self) -> Option<Decimal> {
        stats::spread(self.bids.best(), self.asks.best())
    }

    pub fn liquidity_imbalance(&self, levels: usize) -> Decimal {
        stats::liquidity_imbalance(&self.bids.top_n(levels), &self.asks.top_n(levels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn lvl(p: Decimal, s: Decimal) -> PriceLevel {
        PriceLevel::new(p, s)
    }

    // Bitfinex-style (price, count, amount) triple into a book event
    fn triple(price: Decimal, count: u32, amount: Decimal) -> Event {
        let side = Side::from_amount(amount).unwrap();
        if count > 0 {
            Event::Upsert { side, price, size: amount.abs() }
        } else {
            Event::Delete { side, price }
        }
    }

    #[test]
    fn test_initialise() {
        let book = OrderBookEngine::new(Venue::Bitfinex, "tBTCUSD", Reconciliation::Incremental, 5);
        assert_eq!(book.state(), BookState::Uninitialized);
        assert!(book.bids().is_empty());
        assert!(book.asks().is_empty());
        assert!(book.last_emitted().is_none());
    }

    #[test]
    fn test_incremental_triples() {
        let mut book = OrderBookEngine::new(Venue::Bitfinex, "tBTCUSD", Reconciliation::Incremental, 2);
        for ev in [
            triple(dec!(100), 1, dec!(2)),
            triple(dec!(99), 1, dec!(1)),
            triple(dec!(101), 1, dec!(-3)),
        ] {
            book.apply(&ev);
        }
        assert_eq!(book.bids().get(&dec!(100)), Some(dec!(2)));
        assert_eq!(book.bids().get(&dec!(99)), Some(dec!(1)));
        assert_eq!(book.bids().len(), 2);
        assert_eq!(book.asks().get(&dec!(101)), Some(dec!(3)));
        assert_eq!(book.asks().len(), 1);

        let top = book.top_n();
        assert_eq!(top.bids, vec![lvl(dec!(100), dec!(2)), lvl(dec!(99), dec!(1))]);
        assert_eq!(top.asks, vec![lvl(dec!(101), dec!(3))]);
    }

    #[test]
    fn test_count_zero_deletes() {
        let mut book = OrderBookEngine::new(Venue::Bitfinex, "tBTCUSD", Reconciliation::Incremental, 5);
        book.apply(&triple(dec!(100), 1, dec!(2)));
        book.apply(&triple(dec!(100), 0, dec!(1)));
        assert!(book.bids().is_empty());
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let mut book = OrderBookEngine::new(Venue::Bitfinex, "tBTCUSD", Reconciliation::Incremental, 5);
        book.apply(&Event::Upsert { side: Side::Ask, price: dec!(101), size: dec!(3) });
        let before = book.asks().clone();
        book.apply(&Event::Delete { side: Side::Ask, price: dec!(250) });
        book.apply(&Event::Delete { side: Side::Bid, price: dec!(101) });
        assert_eq!(book.asks(), &before);
        assert!(book.bids().is_empty());
    }

    #[test]
    fn test_snapshot_replaces_side_and_syncs() {
        let mut book = OrderBookEngine::new(Venue::Binance, "BTCUSDT", Reconciliation::FullReplace, 5);
        book.apply(&Event::Snapshot {
            side: Side::Bid,
            levels: vec![lvl(dec!(10), dec!(1)), lvl(dec!(11), dec!(2)), lvl(dec!(9), dec!(0))],
        });
        assert_eq!(book.state(), BookState::Synced);
        assert_eq!(book.bids().len(), 2);
        assert_eq!(book.bids().best(), Some(lvl(dec!(11), dec!(2))));

        book.apply(&Event::Snapshot { side: Side::Bid, levels: vec![lvl(dec!(8), dec!(4))] });
        assert_eq!(book.bids().top_n(5), vec![lvl(dec!(8), dec!(4))]);
    }

    #[test]
    fn test_full_replace_ignores_deltas() {
        let mut book = OrderBookEngine::new(Venue::Binance, "BTCUSDT", Reconciliation::FullReplace, 5);
        assert!(!book.apply(&Event::Upsert { side: Side::Bid, price: dec!(1), size: dec!(1) }));
        assert!(book.bids().is_empty());
    }

    #[test]
    fn test_upsert_zero_size_removes() {
        let mut book = OrderBookEngine::new(Venue::Bitfinex, "tBTCUSD", Reconciliation::Incremental, 5);
        book.apply(&Event::Upsert { side: Side::Bid, price: dec!(5), size: dec!(1) });
        book.apply(&Event::Upsert { side: Side::Bid, price: dec!(5), size: dec!(0) });
        assert!(book.bids().is_empty());
    }

    #[test]
    fn test_dedup_below_visible_depth() {
        let mut book = OrderBookEngine::new(Venue::Bitfinex, "tBTCUSD", Reconciliation::Incremental, 2);
        let snapshot = [
            Event::Snapshot {
                side: Side::Bid,
                levels: vec![lvl(dec!(100), dec!(1)), lvl(dec!(99), dec!(1)), lvl(dec!(98), dec!(1))],
            },
            Event::Snapshot { side: Side::Ask, levels: vec![lvl(dec!(101), dec!(1))] },
        ];
        let mut emitted = 0;
        if book.apply_message(&snapshot, 1).is_some() {
            emitted += 1;
        }
        // Both messages only touch the third bid level
        let below = [Event::Upsert { side: Side::Bid, price: dec!(98), size: dec!(5) }];
        if book.apply_message(&below, 2).is_some() {
            emitted += 1;
        }
        let below = [Event::Upsert { side: Side::Bid, price: dec!(97), size: dec!(2) }];
        if book.apply_message(&below, 3).is_some() {
            emitted += 1;
        }
        assert_eq!(emitted, 1);
        assert_eq!(book.last_emitted().unwrap().ts_ms, 1);

        // A change inside the visible depth is published again
        let visible = [Event::Delete { side: Side::Bid, price: dec!(100) }];
        let snap = book.apply_message(&visible, 4).unwrap();
        assert_eq!(snap.bids, vec![lvl(dec!(99), dec!(1)), lvl(dec!(98), dec!(5))]);
    }

    #[test]
    fn test_non_book_events_do_not_publish() {
        let mut book = OrderBookEngine::new(Venue::Bitfinex, "tBTCUSD", Reconciliation::Incremental, 2);
        assert!(book.apply_message(&[Event::Heartbeat], 1).is_none());
        assert!(book.last_emitted().is_none());
    }

    #[test]
    fn test_spread_and_imbalance() {
        let mut book = OrderBookEngine::new(Venue::Bitfinex, "tBTCUSD", Reconciliation::Incremental, 5);
        assert_eq!(book.spread(), None);
        book.apply(&Event::Upsert { side: Side::Bid, price: dec!(100), size: dec!(7) });
        book.apply(&Event::Upsert { side: Side::Ask, price: dec!(101), size: dec!(3) });
        assert_eq!(book.spread(), Some(dec!(1)));
        assert_eq!(book.liquidity_imbalance(5), dec!(0.4));
    }

    fn arb_delta() -> impl Strategy<Value = Event> {
        (any::<bool>(), 1u32..200, 0u32..5, any::<bool>()).prop_map(|(bid, p, s, delete)| {
            let side = if bid { Side::Bid } else { Side::Ask };
            let price = Decimal::from(p);
            if delete {
                Event::Delete { side, price }
            } else {
                Event::Upsert { side, price, size: Decimal::from(s) }
            }
        })
    }

    proptest! {
        #[test]
        fn prop_sides_stay_sorted(events in proptest::collection::vec(arb_delta(), 0..200)) {
            let mut book = OrderBookEngine::new(Venue::Bitfinex, "tBTCUSD", Reconciliation::Incremental, 10);
            for ev in &events {
                book.apply(ev);
            }
            let bids: Vec<_> = book.bids().iter().collect();
            let asks: Vec<_> = book.asks().iter().collect();
            prop_assert!(bids.windows(2).all(|w| w[0].price > w[1].price));
            prop_assert!(asks.windows(2).all(|w| w[0].price < w[1].price));
            prop_assert!(bids.iter().chain(asks.iter()).all(|l| l.size > Decimal::ZERO));
        }
    }
}
