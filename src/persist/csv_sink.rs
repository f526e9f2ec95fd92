use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::engine::types::Venue;
use crate::persist::types::{Category, SinkError, SinkResult};
use crate::persist::Sink;

type SharedWriter = Arc<Mutex<csv::Writer<File>>>;

/// One append-only CSV file per `(category, venue, symbol)` under `dir`.
///
/// The registry lock is only held while looking up (or opening) a file;
/// the row itself is written under that file's own lock, so pipelines
/// writing to different files never wait on each other.
pub struct CsvSink {
    dir: PathBuf,
    files: Mutex<AHashMap<PathBuf, SharedWriter>>,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> SinkResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "CSV sink ready");
        Ok(Self { dir, files: Mutex::new(AHashMap::new()) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, category: Category, venue: Venue, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}_{}_{}.csv", category, venue, symbol))
    }

    fn writer_for(&self, path: PathBuf, headers: &[String]) -> SinkResult<SharedWriter> {
        let mut files = self.files.lock();
        if let Some(w) = files.get(&path) {
            return Ok(Arc::clone(w));
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(headers)?;
            writer.flush()?;
            debug!(path = %path.display(), "Created CSV target with header");
        }

        let shared = Arc::new(Mutex::new(writer));
        files.insert(path, Arc::clone(&shared));
        Ok(shared)
    }
}

impl Sink for CsvSink {
    fn log(
        &self,
        category: Category,
        venue: Venue,
        symbol: &str,
        row: &[String],
        headers: &[String],
    ) -> SinkResult<()> {
        if !headers.is_empty() && row.len() != headers.len() {
            return Err(SinkError::RowWidth { row: row.len(), header: headers.len() });
        }
        let path = self.path_for(category, venue, symbol);
        let writer = self.writer_for(path, headers)?;
        let mut writer = writer.lock();
        writer.write_record(row)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_header_then_rows_in_order() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::new(dir.path()).unwrap();
        let headers = strings(&["timestamp", "price", "volume"]);

        sink.log(Category::Trades, Venue::Binance, "symX", &strings(&["t1", "10", "1"]), &headers).unwrap();
        sink.log(Category::Trades, Venue::Binance, "symX", &strings(&["t2", "20", "1"]), &headers).unwrap();

        let path = dir.path().join("trades_binance_symX.csv");
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["timestamp,price,volume", "t1,10,1", "t2,20,1"]);
    }

    #[test]
    fn test_existing_file_gets_no_second_header() {
        let dir = TempDir::new().unwrap();
        let headers = strings(&["timestamp", "price", "volume"]);
        {
            let sink = CsvSink::new(dir.path()).unwrap();
            sink.log(Category::Trades, Venue::Bitfinex, "tBTCUSD", &strings(&["a", "1", "1"]), &headers).unwrap();
        }
        let sink = CsvSink::new(dir.path()).unwrap();
        sink.log(Category::Trades, Venue::Bitfinex, "tBTCUSD", &strings(&["b", "2", "2"]), &headers).unwrap();

        let content = std::fs::read_to_string(sink.path_for(Category::Trades, Venue::Bitfinex, "tBTCUSD")).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert_eq!(content.matches("timestamp").count(), 1);
    }

    #[test]
    fn test_targets_are_separate_files() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::new(dir.path()).unwrap();
        let headers = strings(&["timestamp", "price", "volume"]);
        sink.log(Category::Trades, Venue::Binance, "BTCUSDT", &strings(&["a", "1", "1"]), &headers).unwrap();
        sink.log(Category::Trades, Venue::Bitfinex, "BTCUSDT", &strings(&["b", "1", "1"]), &headers).unwrap();
        assert!(dir.path().join("trades_binance_BTCUSDT.csv").exists());
        assert!(dir.path().join("trades_bitfinex_BTCUSDT.csv").exists());
    }

    #[test]
    fn test_row_width_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::new(dir.path()).unwrap();
        let err = sink
            .log(Category::Tickers, Venue::Binance, "BTCUSDT", &strings(&["a"]), &strings(&["timestamp", "price"]))
            .unwrap_err();
        assert!(matches!(err, SinkError::RowWidth { row: 1, header: 2 }));
    }

    #[test]
    fn test_concurrent_writers_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(CsvSink::new(dir.path()).unwrap());
        let headers = strings(&["timestamp", "price", "volume"]);

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let sink = Arc::clone(&sink);
                let headers = headers.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let row = vec![format!("w{worker}"), i.to_string(), "1".to_string()];
                        sink.log(Category::Trades, Venue::Binance, "BTCUSDT", &row, &headers).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let content = std::fs::read_to_string(dir.path().join("trades_binance_BTCUSDT.csv")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 201);
        assert_eq!(lines[0], "timestamp,price,volume");
        assert!(lines[1..].iter().all(|l| l.split(',').count() == 3 && l.starts_with('w')));
    }
}
