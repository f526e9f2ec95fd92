//! Layered configuration: built-in defaults, then an optional TOML file,
//! then `BOOKFEED__*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::market_data::pipeline::{PipelineSettings, PipelineSpec};

pub const ENV_PREFIX: &str = "BOOKFEED";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory the CSV sink writes into.
    pub data_dir: PathBuf,
    /// Visible book depth per side (N).
    pub depth: usize,
    /// Rolling trade window length.
    pub window_secs: u64,
    /// Levels per side used for the liquidity imbalance summary (K).
    pub imbalance_levels: usize,
    /// Wall-clock prune of idle trade windows; 0 disables it.
    pub prune_interval_ms: u64,
    /// Period of the summary log line per pipeline; 0 disables it.
    pub status_interval_secs: u64,
    pub log_filter: String,
    pub metrics_port: u16,
    pub pipelines: Vec<PipelineSpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            depth: 5,
            window_secs: 120,
            imbalance_levels: 5,
            prune_interval_ms: 1_000,
            status_interval_secs: 30,
            log_filter: "info".to_string(),
            metrics_port: 9000,
            pipelines: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let cfg: AppConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipelines.is_empty() {
            return Err(ConfigError::Invalid("no pipelines configured".into()));
        }
        if self.depth == 0 {
            return Err(ConfigError::Invalid("depth must be at least 1".into()));
        }
        if self.imbalance_levels == 0 || self.imbalance_levels > self.depth {
            return Err(ConfigError::Invalid(format!(
                "imbalance_levels must be between 1 and depth ({}), got {}",
                self.depth, self.imbalance_levels
            )));
        }
        if self.window_secs == 0 {
            return Err(ConfigError::Invalid("window_secs must be at least 1".into()));
        }
        if let Some(p) = self.pipelines.iter().find(|p| p.symbol.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("pipeline for {} has an empty symbol", p.venue)));
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            depth: self.depth,
            window: Duration::from_secs(self.window_secs),
            idle_prune: (self.prune_interval_ms > 0).then(|| Duration::from_millis(self.prune_interval_ms)),
        }
    }

    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_secs > 0).then(|| Duration::from_secs(self.status_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Venue;
    use crate::market_data::adapters::StreamKind;
    use std::io::Write;

    #[test]
    fn test_loads_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
data_dir = "/tmp/feeds"
depth = 10

[[pipelines]]
venue = "binance"
symbol = "BTCUSDT"
stream = "book"

[[pipelines]]
venue = "bitfinex"
symbol = "tBTCUSD"
stream = "trades"
"#
        )
        .unwrap();

        let cfg = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.depth, 10);
        assert_eq!(cfg.window_secs, 120);
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/feeds"));
        assert_eq!(
            cfg.pipelines,
            vec![
                PipelineSpec::new(Venue::Binance, "BTCUSDT", StreamKind::Book),
                PipelineSpec::new(Venue::Bitfinex, "tBTCUSD", StreamKind::Trades),
            ]
        );
        let settings = cfg.pipeline_settings();
        assert_eq!(settings.window, Duration::from_secs(120));
        assert_eq!(settings.idle_prune, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_validation() {
        let mut cfg = AppConfig::default();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
        cfg.pipelines.push(PipelineSpec::new(Venue::Binance, "BTCUSDT", StreamKind::Ticker));
        assert!(cfg.validate().is_ok());
        cfg.depth = 0;
        assert!(cfg.validate().is_err());
        cfg.depth = 5;
        cfg.imbalance_levels = 0;
        assert!(cfg.validate().is_err());
        cfg.imbalance_levels = 6;
        assert!(cfg.validate().is_err());
        cfg.imbalance_levels = 5;
        assert!(cfg.validate().is_ok());
        cfg.pipelines.push(PipelineSpec::new(Venue::Bitfinex, " ", StreamKind::Book));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_prune_interval_disables_idle_prune() {
        let cfg = AppConfig { prune_interval_ms: 0, ..AppConfig::default() };
        assert_eq!(cfg.pipeline_settings().idle_prune, None);
    }
}
