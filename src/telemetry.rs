use tracing_subscriber::EnvFilter;

pub const MESSAGES_TOTAL: &str = "bookfeed_messages_total";
pub const PARSE_ERRORS_TOTAL: &str = "bookfeed_parse_errors_total";
pub const BOOK_SNAPSHOTS_TOTAL: &str = "bookfeed_book_snapshots_total";
pub const SINK_ERRORS_TOTAL: &str = "bookfeed_sink_errors_total";

/// `RUST_LOG` wins over the configured filter when set.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    // try_init so a second call (tests, embedding) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .try_init();
}

#[cfg(feature = "metrics-exporter")]
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()?;

    tracing::info!(port, "Prometheus exporter listening on /metrics");
    metrics::gauge!("bookfeed_up").set(1.0);
    Ok(())
}

#[cfg(not(feature = "metrics-exporter"))]
pub fn init_metrics(_port: u16) -> anyhow::Result<()> {
    Ok(())
}
