// Canonical book/trade state, independent of any venue
pub mod types;  // events, levels, snapshots
pub mod book;   // OrderBookEngine: sorted sides + deduplicated top-N
pub mod window; // rolling trade window
pub mod stats;  // vwap / imbalance / spread
