// Bitfinex v2 public adapter: every channel is multiplexed over one socket
// endpoint and identified by the chanId handed back in the subscribe ack.

use serde_json::{json, Map, Value};
use smallvec::smallvec;
use tracing::{debug, info, trace};

use super::{Events, FeedAdapter, ParseError, StreamKind};
use crate::engine::types::{now_ms, Event, PriceLevel, Reconciliation, Side, Ticker, TradeRecord, Venue};
use crate::market_data::normaliser::{decimal_from_value, shape, u64_from_value};

pub const BITFINEX_WS_URL: &str = "wss://api-pub.bitfinex.com/ws/2";

// Book lengths the venue accepts on subscribe
const BOOK_LENGTHS: [usize; 4] = [1, 25, 100, 250];

pub struct BitfinexAdapter {
    pub symbol: String, // e.g. "tBTCUSD"
    pub stream: StreamKind,
    pub depth: usize,
    pub ws_url: String,
    chan_id: Option<u64>,
}

impl BitfinexAdapter {
    pub fn new(symbol: &str, stream: StreamKind, depth: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            stream,
            depth,
            ws_url: BITFINEX_WS_URL.into(),
            chan_id: None,
        }
    }

    pub fn chan_id(&self) -> Option<u64> {
        self.chan_id
    }

    fn channel_name(&self) -> &'static str {
        match self.stream {
            StreamKind::Trades => "trades",
            StreamKind::Book => "book",
            StreamKind::Ticker => "ticker",
        }
    }

    fn book_len(&self) -> usize {
        BOOK_LENGTHS
            .iter()
            .copied()
            .find(|l| *l >= self.depth)
            .unwrap_or(BOOK_LENGTHS[BOOK_LENGTHS.len() - 1])
    }

    fn on_event(&mut self, obj: &Map<String, Value>) -> Result<Events, ParseError> {
        let event = obj
            .get("event")
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingField("event"))?;
        match event {
            "subscribed" => {
                let channel = obj.get("channel").and_then(Value::as_str).unwrap_or_default();
                if channel != self.channel_name() {
                    debug!(channel, "Ignoring ack for another channel");
                    return Ok(Events::new());
                }
                let chan_id = u64_from_value("chanId", obj.get("chanId").ok_or(ParseError::MissingField("chanId"))?)?;
                self.chan_id = Some(chan_id);
                info!(symbol = %self.symbol, channel, chan_id, "Subscribed to bitfinex channel");
                Ok(Events::new())
            }
            "error" => Err(ParseError::Venue {
                code: obj.get("code").and_then(Value::as_i64),
                msg: obj.get("msg").and_then(Value::as_str).unwrap_or("unknown").to_string(),
            }),
            other => {
                debug!(event = other, "Bitfinex control message");
                Ok(Events::new())
            }
        }
    }

    fn on_frame(&mut self, frame: &[Value]) -> Result<Events, ParseError> {
        let chan_id = u64_from_value("chanId", frame.first().ok_or(ParseError::MissingField("chanId"))?)?;
        if self.chan_id != Some(chan_id) {
            trace!(chan_id, expected = ?self.chan_id, "Frame for another channel");
            return Ok(Events::new());
        }
        let payload = frame.get(1).ok_or(ParseError::MissingField("payload"))?;
        if payload.as_str() == Some("hb") {
            return Ok(smallvec![Event::Heartbeat]);
        }
        match self.stream {
            StreamKind::Book => Self::parse_book(payload),
            StreamKind::Trades => Self::parse_trades(payload, frame.get(2)),
            StreamKind::Ticker => Self::parse_ticker(payload),
        }
    }

    fn as_array<'a>(v: &'a Value, expected: &'static str) -> Result<&'a Vec<Value>, ParseError> {
        v.as_array().ok_or(ParseError::WrongShape { expected, found: shape(v) })
    }

    // (price, count, amount) -> upsert or delete on the side given by the sign of amount.
    // TODO: check against a recorded session whether amount == +-1 with count > 0 ever means delete.
    fn triple_to_event(entry: &Value) -> Result<Option<Event>, ParseError> {
        let t = Self::as_array(entry, "[price, count, amount]")?;
        if t.len() < 3 {
            return Err(ParseError::WrongShape { expected: "[price, count, amount]", found: "short array" });
        }
        let price = decimal_from_value("price", &t[0])?;
        let count = u64_from_value("count", &t[1])?;
        let amount = decimal_from_value("amount", &t[2])?;
        let Some(side) = Side::from_amount(amount) else {
            trace!(%price, count, "Zero amount level, nothing to apply");
            return Ok(None);
        };
        if count > 0 {
            Ok(Some(Event::Upsert { side, price, size: amount.abs() }))
        } else {
            Ok(Some(Event::Delete { side, price }))
        }
    }

    fn parse_book(payload: &Value) -> Result<Events, ParseError> {
        let items = Self::as_array(payload, "book payload")?;
        if items.first().map_or(true, Value::is_array) {
            let mut bids = Vec::new();
            let mut asks = Vec::new();
            for entry in items {
                match Self::triple_to_event(entry)? {
                    Some(Event::Upsert { side: Side::Bid, price, size }) => bids.push(PriceLevel::new(price, size)),
                    Some(Event::Upsert { side: Side::Ask, price, size }) => asks.push(PriceLevel::new(price, size)),
                    _ => {}
                }
            }
            Ok(smallvec![
                Event::Snapshot { side: Side::Bid, levels: bids },
                Event::Snapshot { side: Side::Ask, levels: asks },
            ])
        } else {
            Ok(Self::triple_to_event(payload)?.into_iter().collect())
        }
    }

    fn parse_trades(payload: &Value, body: Option<&Value>) -> Result<Events, ParseError> {
        match payload {
            // Executed trade: [ID, MTS, AMOUNT, PRICE]
            Value::String(kind) if kind == "te" => {
                let t = Self::as_array(body.ok_or(ParseError::MissingField("trade"))?, "trade")?;
                if t.len() < 4 {
                    return Err(ParseError::WrongShape { expected: "[id, mts, amount, price]", found: "short array" });
                }
                Ok(smallvec![Event::Trade(TradeRecord {
                    ts_ms: u64_from_value("mts", &t[1])?,
                    price: decimal_from_value("price", &t[3])?,
                    size: decimal_from_value("amount", &t[2])?.abs(),
                })])
            }
            // "tu" repeats a "te" with the trade id filled in
            Value::String(_) => Ok(Events::new()),
            // Initial snapshot arrives newest-first; the window only takes live trades
            Value::Array(items) => {
                debug!(trades = items.len(), "Skipping trades snapshot");
                Ok(Events::new())
            }
            other => Err(ParseError::WrongShape { expected: "trade update", found: shape(other) }),
        }
    }

    // [BID, BID_SIZE, ASK, ASK_SIZE, DAILY_CHANGE, DAILY_CHANGE_RELATIVE, LAST_PRICE, VOLUME, HIGH, LOW]
    fn parse_ticker(payload: &Value) -> Result<Events, ParseError> {
        let t = Self::as_array(payload, "ticker")?;
        if t.len() < 10 {
            return Err(ParseError::WrongShape { expected: "10-field ticker", found: "short array" });
        }
        Ok(smallvec![Event::Ticker(Ticker {
            ts_ms: now_ms(),
            price: decimal_from_value("last_price", &t[6])?,
            high: decimal_from_value("high", &t[8])?,
            low: decimal_from_value("low", &t[9])?,
            volume: decimal_from_value("volume", &t[7])?,
        })])
    }
}

impl FeedAdapter for BitfinexAdapter {
    fn venue(&self) -> Venue {
        Venue::Bitfinex
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn stream(&self) -> StreamKind {
        self.stream
    }

    fn endpoint(&self) -> String {
        self.ws_url.clone()
    }

    fn reconciliation(&self) -> Reconciliation {
        Reconciliation::Incremental
    }

    fn on_open(&mut self) -> Option<String> {
        let msg = match self.stream {
            StreamKind::Book => json!({
                "event": "subscribe",
                "channel": "book",
                "symbol": self.symbol,
                "prec": "P0",
                "freq": "F0",
                "len": self.book_len().to_string(),
            }),
            _ => json!({
                "event": "subscribe",
                "channel": self.channel_name(),
                "symbol": self.symbol,
            }),
        };
        Some(msg.to_string())
    }

    fn on_close(&mut self) {
        self.chan_id = None;
    }

    fn parse(&mut self, raw: &str) -> Result<Events, ParseError> {
        let msg: Value = serde_json::from_str(raw)?;
        match &msg {
            Value::Object(obj) => self.on_event(obj),
            Value::Array(frame) => self.on_frame(frame),
            other => Err(ParseError::WrongShape { expected: "object or array", found: shape(other) }),
        }
    }
}
