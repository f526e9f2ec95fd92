use ahash::AHashMap;
use parking_lot::Mutex;

use crate::engine::types::Venue;
use crate::persist::types::{Category, SinkResult};
use crate::persist::Sink;

// (category, venue, symbol)
pub type TargetKey = (Category, Venue, String);

/// In-process sink that keeps rows per target; handy for embedding and tests.
#[derive(Default)]
pub struct MemorySink {
    targets: Mutex<AHashMap<TargetKey, Vec<Vec<String>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header (first entry) followed by every row, in write order.
    pub fn lines(&self, category: Category, venue: Venue, symbol: &str) -> Vec<Vec<String>> {
        self.targets
            .lock()
            .get(&(category, venue, symbol.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn row_count(&self, category: Category, venue: Venue, symbol: &str) -> usize {
        self.lines(category, venue, symbol).len().saturating_sub(1)
    }
}

impl Sink for MemorySink {
    fn log(
        &self,
        category: Category,
        venue: Venue,
        symbol: &str,
        row: &[String],
        headers: &[String],
    ) -> SinkResult<()> {
        let mut targets = self.targets.lock();
        let lines = targets
            .entry((category, venue, symbol.to_string()))
            .or_insert_with(|| vec![headers.to_vec()]);
        lines.push(row.to_vec());
        Ok(())
    }
}
