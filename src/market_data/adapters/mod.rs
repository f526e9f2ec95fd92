// Shared trait + errors for venue feed adapters

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::engine::types::{Event, Reconciliation, Venue};

pub mod binance;
pub mod binance_types;
pub mod bitfinex;

/// Events decoded from one inbound message. A two-sided depth snapshot is
/// the widest case, so two slots avoid allocating on the hot path.
pub type Events = SmallVec<[Event; 2]>;

/// Which logical stream an adapter (and its socket) carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Trades,
    Book,
    Ticker,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Trades => "trades",
            StreamKind::Book => "book",
            StreamKind::Ticker => "ticker",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message the adapter could not turn into events. Never fatal: the
/// pipeline drops the message and keeps reading.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("expected {expected}, found {found}")]
    WrongShape { expected: &'static str, found: &'static str },
    #[error("bad number in `{field}`: {value}")]
    BadNumber { field: &'static str, value: String },
    #[error("venue error {code:?}: {msg}")]
    Venue { code: Option<i64>, msg: String },
}

/// Failures that end a pipeline's receive loop.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("transport error: {0}")]
    Transport(String),
}

/// Venue protocol: lifecycle hooks plus raw-message decoding.
///
/// Adapters never touch a socket; the transport hands them text frames and
/// the pipeline applies the resulting events.
pub trait FeedAdapter: Send {
    fn venue(&self) -> Venue;
    fn symbol(&self) -> &str;
    fn stream(&self) -> StreamKind;
    fn endpoint(&self) -> String;

    /// Book reconciliation model this adapter's events follow.
    fn reconciliation(&self) -> Reconciliation;

    /// Control message to send once connected, if the venue needs one.
    fn on_open(&mut self) -> Option<String> {
        None
    }

    /// Forget per-connection state (e.g. channel ids).
    fn on_close(&mut self) {}

    fn parse(&mut self, raw: &str) -> Result<Events, ParseError>;
}

pub fn build_adapter(venue: Venue, symbol: &str, stream: StreamKind, depth: usize) -> Box<dyn FeedAdapter> {
    match venue {
        Venue::Binance => Box::new(binance::BinanceAdapter::new(symbol, stream, depth)),
        Venue::Bitfinex => Box::new(bitfinex::BitfinexAdapter::new(symbol, stream, depth)),
    }
}
