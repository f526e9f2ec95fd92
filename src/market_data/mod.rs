// Market data module entrypoint
pub mod adapters;   // venue-specific wire protocols (Binance, Bitfinex)
pub mod normaliser; // wire strings/numbers -> Decimal
pub mod transport;  // websocket connector yielding raw frames
pub mod pipeline;   // one ingest unit: adapter -> engine/window -> sink
pub mod dispatcher; // owns and supervises all pipelines
