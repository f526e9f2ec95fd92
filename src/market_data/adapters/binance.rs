// Binance spot adapter: one socket per stream, no subscribe handshake.
// Depth arrives as complete top-N snapshots, so the book is full-replace.

use smallvec::smallvec;
use tracing::trace;

use super::binance_types::{WsDepth, WsLevel, WsTicker, WsTrade};
use super::{Events, FeedAdapter, ParseError, StreamKind};
use crate::engine::types::{now_ms, Event, PriceLevel, Reconciliation, Side, Ticker, TradeRecord, Venue};
use crate::market_data::normaliser::decimal_from_str;

pub const BINANCE_WS_BASE: &str = "wss://stream.binance.com:9443/ws";

// Partial depth streams only exist for these level counts
const DEPTH_LEVELS: [usize; 3] = [5, 10, 20];

pub struct BinanceAdapter {
    pub symbol: String, // as configured, e.g. "BTCUSDT"
    pub stream: StreamKind,
    pub depth: usize,
    pub base_url: String,
}

impl BinanceAdapter {
    pub fn new(symbol: &str, stream: StreamKind, depth: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            stream,
            depth,
            base_url: BINANCE_WS_BASE.into(),
        }
    }

    fn depth_levels(&self) -> usize {
        DEPTH_LEVELS
            .iter()
            .copied()
            .find(|l| *l >= self.depth)
            .unwrap_or(DEPTH_LEVELS[DEPTH_LEVELS.len() - 1])
    }

    fn stream_name(&self) -> String {
        match self.stream {
            StreamKind::Trades => "trade".to_string(),
            StreamKind::Book => format!("depth{}@100ms", self.depth_levels()),
            StreamKind::Ticker => "ticker".to_string(),
        }
    }

    fn norm_side(side: &[WsLevel]) -> Result<Vec<PriceLevel>, ParseError> {
        side.iter()
            .map(|lvl| Ok(PriceLevel::new(decimal_from_str("price", &lvl.0)?, decimal_from_str("qty", &lvl.1)?)))
            .collect()
    }

    fn parse_trade(raw: &str) -> Result<Events, ParseError> {
        let t: WsTrade = serde_json::from_str(raw)?;
        Ok(smallvec![Event::Trade(TradeRecord {
            ts_ms: t.trade_time,
            price: decimal_from_str("p", &t.price)?,
            size: decimal_from_str("q", &t.qty)?,
        })])
    }

    fn parse_depth(raw: &str) -> Result<Events, ParseError> {
        let d: WsDepth = serde_json::from_str(raw)?;
        Ok(smallvec![
            Event::Snapshot { side: Side::Bid, levels: Self::norm_side(&d.bids)? },
            Event::Snapshot { side: Side::Ask, levels: Self::norm_side(&d.asks)? },
        ])
    }

    fn parse_ticker(raw: &str) -> Result<Events, ParseError> {
        let t: WsTicker = serde_json::from_str(raw)?;
        let ts_ms = if t.event_time > 0 { t.event_time } else { now_ms() };
        Ok(smallvec![Event::Ticker(Ticker {
            ts_ms,
            price: decimal_from_str("c", &t.last_price)?,
            high: decimal_from_str("h", &t.high)?,
            low: decimal_from_str("l", &t.low)?,
            volume: decimal_from_str("v", &t.volume)?,
        })])
    }
}

impl FeedAdapter for BinanceAdapter {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn stream(&self) -> StreamKind {
        self.stream
    }

    fn endpoint(&self) -> String {
        format!("{}/{}@{}", self.base_url, self.symbol.to_lowercase(), self.stream_name())
    }

    fn reconciliation(&self) -> Reconciliation {
        Reconciliation::FullReplace
    }

    fn parse(&mut self, raw: &str) -> Result<Events, ParseError> {
        trace!(stream = %self.stream, len = raw.len(), "Parsing binance message");
        match self.stream {
            StreamKind::Trades => Self::parse_trade(raw),
            StreamKind::Book => Self::parse_depth(raw),
            StreamKind::Ticker => Self::parse_ticker(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_endpoints() {
        let a = BinanceAdapter::new("BTCUSDT", StreamKind::Trades, 5);
        assert_eq!(a.endpoint(), "wss://stream.binance.com:9443/ws/btcusdt@trade");
        let a = BinanceAdapter::new("BTCUSDT", StreamKind::Book, 7);
        assert_eq!(a.endpoint(), "wss://stream.binance.com:9443/ws/btcusdt@depth10@100ms");
        let a = BinanceAdapter::new("ethusdt", StreamKind::Book, 50);
        assert_eq!(a.endpoint(), "wss://stream.binance.com:9443/ws/ethusdt@depth20@100ms");
        let mut a = BinanceAdapter::new("BTCUSDT", StreamKind::Ticker, 5);
        assert_eq!(a.endpoint(), "wss://stream.binance.com:9443/ws/btcusdt@ticker");
        assert!(a.on_open().is_none());
    }

    #[test]
    fn test_parse_trade() {
        let mut a = BinanceAdapter::new("BTCUSDT", StreamKind::Trades, 5);
        let raw = r#"{"e":"trade","E":1672515782136,"s":"BTCUSDT","t":12345,"p":"16500.10","q":"0.002","T":1672515782134,"m":true,"M":true}"#;
        let events = a.parse(raw).unwrap();
        assert_eq!(
            events.as_slice(),
            &[Event::Trade(TradeRecord { ts_ms: 1672515782134, price: dec!(16500.10), size: dec!(0.002) })]
        );
    }

    #[test]
    fn test_parse_depth_is_two_snapshots() {
        let mut a = BinanceAdapter::new("BTCUSDT", StreamKind::Book, 5);
        let raw = r#"{"lastUpdateId":160,"bids":[["0.0024","10"],["0.0023","0"]],"asks":[["0.0026","100"]]}"#;
        let events = a.parse(raw).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            Event::Snapshot {
                side: Side::Bid,
                levels: vec![PriceLevel::new(dec!(0.0024), dec!(10)), PriceLevel::new(dec!(0.0023), dec!(0))],
            }
        );
        assert_eq!(events[1], Event::Snapshot { side: Side::Ask, levels: vec![PriceLevel::new(dec!(0.0026), dec!(100))] });

        // Short keys are accepted too
        let raw = r#"{"b":[["1.0","2.0"]],"a":[]}"#;
        assert_eq!(a.parse(raw).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_ticker() {
        let mut a = BinanceAdapter::new("BTCUSDT", StreamKind::Ticker, 5);
        let raw = r#"{"e":"24hrTicker","E":123456789,"s":"BTCUSDT","p":"0.0015","c":"0.0025","h":"0.0030","l":"0.0010","v":"10000","q":"18"}"#;
        let events = a.parse(raw).unwrap();
        assert_eq!(
            events[0],
            Event::Ticker(Ticker { ts_ms: 123456789, price: dec!(0.0025), high: dec!(0.0030), low: dec!(0.0010), volume: dec!(10000) })
        );
    }

    #[test]
    fn test_malformed_messages() {
        let mut a = BinanceAdapter::new("BTCUSDT", StreamKind::Trades, 5);
        assert!(matches!(a.parse("not json"), Err(ParseError::Json(_))));
        assert!(matches!(a.parse(r#"{"p":"1"}"#), Err(ParseError::Json(_))));
        assert!(matches!(
            a.parse(r#"{"p":"x","q":"1","T":1}"#),
            Err(ParseError::BadNumber { field: "p", .. })
        ));
        assert_eq!(a.reconciliation(), Reconciliation::FullReplace);
    }
}
