// One (venue, symbol, stream) ingest unit: adapter -> engine/window -> sink.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use hdrhistogram::Histogram;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::engine::book::OrderBookEngine;
use crate::engine::stats;
use crate::engine::types::{now_ms, BookSnapshot, Event, PriceLevel, Venue};
use crate::engine::window::{TradeWindow, WindowStats};
use crate::market_data::adapters::{Events, FeedAdapter, FeedError, StreamKind};
use crate::market_data::transport::RawStream;
use crate::persist::{rows, Category, Sink};
use crate::telemetry;

/// Identifies one pipeline; unique within a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub venue: Venue,
    pub symbol: String,
    pub stream: StreamKind,
}

impl PipelineSpec {
    pub fn new(venue: Venue, symbol: &str, stream: StreamKind) -> Self {
        Self { venue, symbol: symbol.to_string(), stream }
    }
}

impl fmt::Display for PipelineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.venue, self.symbol, self.stream)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Visible book depth (N) published and written per snapshot.
    pub depth: usize,
    pub window: Duration,
    /// Wall-clock prune of the trade window while the feed is quiet.
    pub idle_prune: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self { depth: 5, window: Duration::from_secs(120), idle_prune: Some(Duration::from_secs(1)) }
    }
}

/// Why a pipeline's receive loop ended.
#[derive(Debug)]
pub enum PipelineExit {
    Stopped,
    Closed,
    Failed(FeedError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub messages: u64,
    pub parse_errors: u64,
    pub book_snapshots: u64,
    pub trades: u64,
    pub tickers: u64,
    pub heartbeats: u64,
    pub sink_errors: u64,
    pub p50_us: u64,
    pub p99_us: u64,
}

/// Read side of a pipeline. Cloning is cheap; reading never blocks ingestion.
#[derive(Debug, Clone)]
pub struct PipelineView {
    pub book: watch::Receiver<Option<Arc<BookSnapshot>>>,
    pub trades: watch::Receiver<WindowStats>,
}

impl PipelineView {
    pub fn latest_book(&self) -> Option<Arc<BookSnapshot>> {
        self.book.borrow().clone()
    }

    pub fn trade_stats(&self) -> WindowStats {
        *self.trades.borrow()
    }

    /// Top-of-book figures from the latest published snapshot, with the
    /// imbalance taken over the first `levels` levels per side.
    pub fn book_summary(&self, levels: usize) -> Option<BookSummary> {
        let snap = self.latest_book()?;
        Some(BookSummary {
            ts_ms: snap.ts_ms,
            best_bid: snap.best_bid().map(|l| l.price),
            best_ask: snap.best_ask().map(|l| l.price),
            spread: stats::spread(snap.best_bid(), snap.best_ask()),
            imbalance: stats::liquidity_imbalance(top_k(&snap.bids, levels), top_k(&snap.asks, levels)),
        })
    }
}

fn top_k(side: &[PriceLevel], k: usize) -> &[PriceLevel] {
    &side[..k.min(side.len())]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookSummary {
    pub ts_ms: u64,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub imbalance: Decimal,
}

pub struct Pipeline {
    spec: PipelineSpec,
    adapter: Box<dyn FeedAdapter>,
    engine: OrderBookEngine,
    window: TradeWindow,
    sink: Arc<dyn Sink>,
    settings: PipelineSettings,
    book_tx: watch::Sender<Option<Arc<BookSnapshot>>>,
    stats_tx: watch::Sender<WindowStats>,
    book_headers: Vec<String>,
    trade_headers: Vec<String>,
    ticker_headers: Vec<String>,
    latency: Option<Histogram<u64>>,
    report: PipelineReport,
}

impl Pipeline {
    pub fn new(adapter: Box<dyn FeedAdapter>, settings: PipelineSettings, sink: Arc<dyn Sink>) -> (Self, PipelineView) {
        let spec = PipelineSpec::new(adapter.venue(), adapter.symbol(), adapter.stream());
        let engine = OrderBookEngine::new(spec.venue, &spec.symbol, adapter.reconciliation(), settings.depth);
        let window = TradeWindow::new(spec.venue, &spec.symbol, settings.window);
        let (book_tx, book_rx) = watch::channel(None);
        let (stats_tx, stats_rx) = watch::channel(WindowStats::default());
        let pipeline = Self {
            spec,
            adapter,
            engine,
            window,
            sink,
            settings,
            book_tx,
            stats_tx,
            book_headers: rows::orderbook_headers(settings.depth),
            trade_headers: rows::trade_headers(),
            ticker_headers: rows::ticker_headers(),
            latency: Histogram::new(3).ok(),
            report: PipelineReport::default(),
        };
        (pipeline, PipelineView { book: book_rx, trades: stats_rx })
    }

    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    pub fn engine(&self) -> &OrderBookEngine {
        &self.engine
    }

    pub fn window(&self) -> &TradeWindow {
        &self.window
    }

    pub fn report(&self) -> &PipelineReport {
        &self.report
    }

    /// Endpoint and optional subscribe message for the next connection.
    pub fn open(&mut self) -> (String, Option<String>) {
        (self.adapter.endpoint(), self.adapter.on_open())
    }

    fn log_row(&mut self, category: Category, row: Vec<String>) {
        let headers = match category {
            Category::Trades => &self.trade_headers,
            Category::Orderbook => &self.book_headers,
            Category::Tickers => &self.ticker_headers,
        };
        if let Err(e) = self.sink.log(category, self.spec.venue, &self.spec.symbol, &row, headers) {
            self.report.sink_errors += 1;
            metrics::counter!(telemetry::SINK_ERRORS_TOTAL, "venue" => self.spec.venue.as_str(), "stream" => self.spec.stream.as_str()).increment(1);
            warn!(pipeline = %self.spec, %category, error = %e, "Sink write failed, continuing");
        }
    }

    /// Decode one raw frame and apply everything it carries.
    pub fn handle_message(&mut self, raw: &str) {
        let started = Instant::now();
        self.report.messages += 1;
        metrics::counter!(telemetry::MESSAGES_TOTAL, "venue" => self.spec.venue.as_str(), "stream" => self.spec.stream.as_str()).increment(1);

        let events = match self.adapter.parse(raw) {
            Ok(events) => events,
            Err(e) => {
                self.report.parse_errors += 1;
                metrics::counter!(telemetry::PARSE_ERRORS_TOTAL, "venue" => self.spec.venue.as_str(), "stream" => self.spec.stream.as_str()).increment(1);
                warn!(pipeline = %self.spec, error = %e, "Dropping malformed message");
                return;
            }
        };

        let mut book_events = Events::new();
        let mut traded = false;
        for event in events {
            if event.is_book() {
                book_events.push(event);
                continue;
            }
            match event {
                Event::Trade(trade) => {
                    self.window.append(trade);
                    self.report.trades += 1;
                    traded = true;
                    self.log_row(Category::Trades, rows::trade_row(&trade));
                }
                Event::Ticker(ticker) => {
                    self.report.tickers += 1;
                    self.log_row(Category::Tickers, rows::ticker_row(&ticker));
                }
                Event::Heartbeat => {
                    self.report.heartbeats += 1;
                    trace!(pipeline = %self.spec, "Heartbeat");
                }
                Event::Snapshot { .. } | Event::Upsert { .. } | Event::Delete { .. } => {}
            }
        }

        if traded {
            self.stats_tx.send_replace(self.window.stats());
        }
        if !book_events.is_empty() {
            if let Some(snap) = self.engine.apply_message(&book_events, now_ms()) {
                self.report.book_snapshots += 1;
                metrics::counter!(telemetry::BOOK_SNAPSHOTS_TOTAL, "venue" => self.spec.venue.as_str(), "stream" => self.spec.stream.as_str()).increment(1);
                self.log_row(Category::Orderbook, rows::orderbook_row(&snap, self.settings.depth));
                self.book_tx.send_replace(Some(snap));
            }
        }

        if let Some(h) = self.latency.as_mut() {
            h.saturating_record(u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX));
        }
    }

    fn idle_prune(&mut self) {
        if self.window.prune(now_ms()) > 0 {
            self.stats_tx.send_replace(self.window.stats());
        }
    }

    fn finish(&mut self) -> PipelineReport {
        self.adapter.on_close();
        if let Some(h) = &self.latency {
            self.report.p50_us = h.value_at_quantile(0.5) / 1_000;
            self.report.p99_us = h.value_at_quantile(0.99) / 1_000;
        }
        self.report.clone()
    }

    /// Receive loop. Checks `stop` between messages; ends on close, transport
    /// error or stop, never on a bad message.
    #[instrument(skip_all, fields(pipeline = %self.spec))]
    pub async fn run(mut self, mut source: RawStream, mut stop: watch::Receiver<bool>) -> (PipelineExit, PipelineReport) {
        info!("Pipeline started");
        let prune_every = self.settings.idle_prune.unwrap_or(Duration::from_secs(1));
        let prune_enabled = self.settings.idle_prune.is_some();
        let mut prune_tick = tokio::time::interval_at(tokio::time::Instant::now() + prune_every, prune_every);

        let exit = loop {
            if *stop.borrow() {
                break PipelineExit::Stopped;
            }
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break PipelineExit::Stopped;
                    }
                }
                msg = source.next() => match msg {
                    Some(Ok(raw)) => self.handle_message(&raw),
                    Some(Err(e)) => {
                        error!(error = %e, "Transport failed, ending pipeline");
                        break PipelineExit::Failed(e);
                    }
                    None => {
                        warn!("Feed closed");
                        break PipelineExit::Closed;
                    }
                },
                _ = prune_tick.tick(), if prune_enabled => self.idle_prune(),
            }
        };

        let report = self.finish();
        info!(
            ?exit,
            messages = report.messages,
            parse_errors = report.parse_errors,
            book_snapshots = report.book_snapshots,
            trades = report.trades,
            sink_errors = report.sink_errors,
            p50_us = report.p50_us,
            p99_us = report.p99_us,
            "Pipeline finished"
        );
        debug!(trades_in_window = self.window.len(), book_state = ?self.engine.state(), "Final state");
        (exit, report)
    }
}
