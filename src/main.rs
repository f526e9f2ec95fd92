use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bookfeed_rs::config::AppConfig;
use bookfeed_rs::market_data::dispatcher::Dispatcher;
use bookfeed_rs::market_data::pipeline::{PipelineExit, PipelineSpec, PipelineView};
use bookfeed_rs::market_data::transport::WsConnector;
use bookfeed_rs::persist::csv_sink::CsvSink;
use bookfeed_rs::telemetry;
use clap::Parser;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "bookfeed", about = "Record venue trades, books and tickers to CSV")]
struct Args {
    /// TOML config file; missing file falls back to defaults and env
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Overrides `data_dir`
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Overrides `log_filter`
    #[arg(long)]
    log_filter: Option<String>,
}

fn log_status(views: &[(PipelineSpec, PipelineView)], imbalance_levels: usize) {
    for (spec, view) in views {
        let trades = view.trade_stats();
        match view.book_summary(imbalance_levels) {
            Some(book) => info!(
                pipeline = %spec,
                best_bid = ?book.best_bid,
                best_ask = ?book.best_ask,
                spread = ?book.spread,
                imbalance = %book.imbalance,
                "Book status"
            ),
            None if trades.trades > 0 => info!(
                pipeline = %spec,
                trades = trades.trades,
                last_price = ?trades.last_price,
                vwap = %trades.vwap,
                volume = %trades.volume,
                "Trade window status"
            ),
            None => {}
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env
    let args = Args::parse();

    let mut cfg = AppConfig::load(Some(&args.config)).context("loading configuration")?;
    if let Some(dir) = args.data_dir {
        cfg.data_dir = dir;
    }
    if let Some(filter) = args.log_filter {
        cfg.log_filter = filter;
    }

    telemetry::init_tracing(&cfg.log_filter);
    telemetry::init_metrics(cfg.metrics_port)?;

    let sink = CsvSink::new(cfg.data_dir.clone())
        .with_context(|| format!("creating data dir {}", cfg.data_dir.display()))?;
    info!(data_dir = %cfg.data_dir.display(), pipelines = cfg.pipelines.len(), depth = cfg.depth, "Starting bookfeed");

    let mut dispatcher = Dispatcher::new(Arc::new(WsConnector), Arc::new(sink), cfg.pipeline_settings());
    let views: Vec<_> = cfg
        .pipelines
        .iter()
        .map(|spec| (spec.clone(), dispatcher.spawn(spec)))
        .collect();

    let status_task = cfg.status_interval().map(|every| {
        let levels = cfg.imbalance_levels;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            loop {
                tick.tick().await;
                log_status(&views, levels);
            }
        })
    });

    let outcomes = dispatcher
        .run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupt received"),
                Err(e) => warn!(error = %e, "Failed to listen for interrupt, shutting down"),
            }
        })
        .await;
    if let Some(task) = status_task {
        task.abort();
    }

    for outcome in outcomes {
        let failed = matches!(outcome.exit, PipelineExit::Failed(_));
        info!(
            pipeline = %outcome.spec,
            exit = ?outcome.exit,
            failed,
            messages = outcome.report.messages,
            parse_errors = outcome.report.parse_errors,
            sink_errors = outcome.report.sink_errors,
            "Pipeline report"
        );
    }
    Ok(())
}
